//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account records (key: account_id)
//! - `balances` - Balance rows (key: account_id || currency code)
//! - `transactions` - Transaction records (key: transaction_id)
//! - `indices` - Secondary indices for fast lookups
//!
//! # Indices
//!
//! All indices live in one column family, namespaced by a short tag:
//! account number -> account, reference number -> transaction, owner ->
//! accounts, debit/credit account -> transactions, status -> transactions.
//! Number and reference entries are never deleted, which is what makes
//! identifiers single-use for the lifetime of the store.
//!
//! A posting (balance writes + the transaction record + index moves) is
//! committed through a single `WriteBatch`, so it is all-or-nothing.

use crate::{
    config::Config,
    error::{Error, Result},
    types::{
        Account, AccountId, AccountRole, Balance, BalanceKey, CustomerId, Transaction,
        TransactionId, TransactionStatus,
    },
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_BALANCES: &str = "balances";
const CF_TRANSACTIONS: &str = "transactions";
const CF_INDICES: &str = "indices";

/// Index namespaces within `CF_INDICES`
const IDX_NUMBER: &[u8] = b"num|";
const IDX_REFERENCE: &[u8] = b"ref|";
const IDX_OWNER: &[u8] = b"own|";
const IDX_DEBIT: &[u8] = b"dr|";
const IDX_CREDIT: &[u8] = b"cr|";
const IDX_STATUS: &[u8] = b"st|";

/// One atomic posting: the transaction record in its new state plus every
/// balance row it rewrote.
///
/// `previous_status` is `None` for a record being inserted for the first
/// time (reference and role indices are written alongside it) and
/// `Some(status)` for a status change (the status index entry is moved).
pub struct Posting<'a> {
    /// Transaction record to persist
    pub transaction: &'a Transaction,

    /// Balance rows in their post-transaction state
    pub balances: &'a [Balance],

    /// Status the record held before this commit, if it already existed
    pub previous_status: Option<TransactionStatus>,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for write-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        // Column family descriptors
        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_BALANCES, Self::cf_options_balances()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db })
    }

    // Column family options

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_balances() -> Options {
        let mut opts = Options::default();
        // Balances are read on every posting, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Scan every (key, value) pair under an index prefix
    fn scan_prefix(&self, cf: &ColumnFamily, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }

        Ok(entries)
    }

    fn uuid_from_slice(bytes: &[u8]) -> Result<Uuid> {
        let raw: [u8; 16] = bytes
            .try_into()
            .map_err(|_| Error::Storage("Malformed UUID in index".to_string()))?;
        Ok(Uuid::from_bytes(raw))
    }

    // Account operations

    /// Insert a new account with its number and owner index entries (atomic)
    pub fn insert_account(&self, account: &Account) -> Result<()> {
        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_accounts, account.id.as_bytes(), bincode::serialize(account)?);
        batch.put_cf(
            cf_indices,
            Self::index_key_number(&account.number),
            account.id.as_bytes(),
        );
        batch.put_cf(
            cf_indices,
            Self::index_key_owner(account.owner, account.id),
            b"",
        );
        self.db.write(batch)?;

        tracing::debug!(account_id = %account.id, number = %account.number, "Account inserted");

        Ok(())
    }

    /// Update an existing account record
    pub fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        self.db
            .put_cf(cf, account.id.as_bytes(), bincode::serialize(account)?)?;
        Ok(())
    }

    /// Get account by ID
    pub fn get_account(&self, account_id: AccountId) -> Result<Account> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let value = self
            .db
            .get_cf(cf, account_id.as_bytes())?
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Look up the account ID registered for a number, if any.
    ///
    /// Entries outlive their account: a deleted account leaves its number
    /// mapped to a dead ID so the number is never reissued.
    pub fn find_account_id_by_number(&self, number: &str) -> Result<Option<AccountId>> {
        let cf = self.cf_handle(CF_INDICES)?;
        match self.db.get_cf(cf, Self::index_key_number(number))? {
            Some(value) => Ok(Some(AccountId::from(Self::uuid_from_slice(&value)?))),
            None => Ok(None),
        }
    }

    /// Remove an account record and its owner index entry, keeping the
    /// number index entry as a tombstone (atomic)
    pub fn delete_account(&self, account: &Account) -> Result<()> {
        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(cf_accounts, account.id.as_bytes());
        batch.delete_cf(cf_indices, Self::index_key_owner(account.owner, account.id));
        self.db.write(batch)?;

        tracing::info!(account_id = %account.id, number = %account.number, "Account deleted");

        Ok(())
    }

    /// Account IDs owned by one customer
    pub fn list_account_ids_by_owner(&self, owner: CustomerId) -> Result<Vec<AccountId>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = Self::index_prefix_owner(owner);

        let mut ids = Vec::new();
        for (key, _) in self.scan_prefix(cf, &prefix)? {
            let id_bytes = &key[prefix.len()..];
            ids.push(AccountId::from(Self::uuid_from_slice(id_bytes)?));
        }
        Ok(ids)
    }

    /// Whether any transaction references the account on either side
    pub fn account_has_transactions(&self, account_id: AccountId) -> Result<bool> {
        let cf = self.cf_handle(CF_INDICES)?;
        let debit = self.scan_prefix(cf, &Self::index_prefix_role(IDX_DEBIT, account_id))?;
        if !debit.is_empty() {
            return Ok(true);
        }
        let credit = self.scan_prefix(cf, &Self::index_prefix_role(IDX_CREDIT, account_id))?;
        Ok(!credit.is_empty())
    }

    // Balance operations

    /// Get the balance row for one (account, currency) pair
    pub fn get_balance(&self, key: &BalanceKey) -> Result<Option<Balance>> {
        let cf = self.cf_handle(CF_BALANCES)?;
        match self.db.get_cf(cf, Self::balance_storage_key(key))? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Write one balance row outside a posting (creation, administrative
    /// correction); callers must hold the guard for the key
    pub fn put_balance(&self, balance: &Balance) -> Result<()> {
        let cf = self.cf_handle(CF_BALANCES)?;
        self.db.put_cf(
            cf,
            Self::balance_storage_key(&balance.key()),
            bincode::serialize(balance)?,
        )?;
        Ok(())
    }

    /// All balance rows of one account
    pub fn list_balances_by_account(&self, account_id: AccountId) -> Result<Vec<Balance>> {
        let cf = self.cf_handle(CF_BALANCES)?;
        let prefix = account_id.as_bytes().to_vec();

        let mut balances = Vec::new();
        for (_, value) in self.scan_prefix(cf, &prefix)? {
            balances.push(bincode::deserialize(&value)?);
        }
        Ok(balances)
    }

    // Transaction operations

    /// Get transaction by ID
    pub fn get_transaction(&self, transaction_id: TransactionId) -> Result<Transaction> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = self
            .db
            .get_cf(cf, transaction_id.as_bytes())?
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Look up the transaction recorded for a reference number, if any
    pub fn find_transaction_id_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<TransactionId>> {
        let cf = self.cf_handle(CF_INDICES)?;
        match self.db.get_cf(cf, Self::index_key_reference(reference))? {
            Some(value) => Ok(Some(TransactionId::from(Self::uuid_from_slice(&value)?))),
            None => Ok(None),
        }
    }

    /// Transactions where the account plays the given role (via index)
    pub fn list_transactions_by_account(
        &self,
        account_id: AccountId,
        role: AccountRole,
    ) -> Result<Vec<Transaction>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let tag = match role {
            AccountRole::Debit => IDX_DEBIT,
            AccountRole::Credit => IDX_CREDIT,
        };
        let prefix = Self::index_prefix_role(tag, account_id);

        let mut transactions = Vec::new();
        for (key, _) in self.scan_prefix(cf, &prefix)? {
            let id_bytes = &key[prefix.len()..];
            let id = TransactionId::from(Self::uuid_from_slice(id_bytes)?);
            transactions.push(self.get_transaction(id)?);
        }
        Ok(transactions)
    }

    /// Transactions currently in the given status (via index)
    pub fn list_transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = Self::index_prefix_status(status);

        let mut transactions = Vec::new();
        for (key, _) in self.scan_prefix(cf, &prefix)? {
            let id_bytes = &key[prefix.len()..];
            let id = TransactionId::from(Self::uuid_from_slice(id_bytes)?);
            transactions.push(self.get_transaction(id)?);
        }
        Ok(transactions)
    }

    // Posting commit (atomic)

    /// Apply a posting in one atomic write: balance rows, the transaction
    /// record, and index maintenance all commit together or not at all.
    pub fn commit_posting(&self, posting: &Posting<'_>) -> Result<()> {
        let cf_balances = self.cf_handle(CF_BALANCES)?;
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let transaction = posting.transaction;
        let mut batch = WriteBatch::default();

        // 1. Balance rows
        for balance in posting.balances {
            batch.put_cf(
                cf_balances,
                Self::balance_storage_key(&balance.key()),
                bincode::serialize(balance)?,
            );
        }

        // 2. Transaction record
        batch.put_cf(
            cf_transactions,
            transaction.id.as_bytes(),
            bincode::serialize(transaction)?,
        );

        // 3. Indices
        match posting.previous_status {
            None => {
                // First insert: reference, role and status entries
                batch.put_cf(
                    cf_indices,
                    Self::index_key_reference(&transaction.reference),
                    transaction.id.as_bytes(),
                );
                if let Some(debit) = transaction.debit_account {
                    batch.put_cf(
                        cf_indices,
                        Self::index_key_role(IDX_DEBIT, debit, transaction.id),
                        b"",
                    );
                }
                if let Some(credit) = transaction.credit_account {
                    batch.put_cf(
                        cf_indices,
                        Self::index_key_role(IDX_CREDIT, credit, transaction.id),
                        b"",
                    );
                }
                batch.put_cf(
                    cf_indices,
                    Self::index_key_status(transaction.status, transaction.id),
                    b"",
                );
            }
            Some(previous) => {
                // Status change: move the status entry
                batch.delete_cf(cf_indices, Self::index_key_status(previous, transaction.id));
                batch.put_cf(
                    cf_indices,
                    Self::index_key_status(transaction.status, transaction.id),
                    b"",
                );
            }
        }

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(
            transaction_id = %transaction.id,
            reference = %transaction.reference,
            status = ?transaction.status,
            balances = posting.balances.len(),
            "Posting committed"
        );

        Ok(())
    }

    // Key helpers

    fn balance_storage_key(key: &BalanceKey) -> Vec<u8> {
        let mut storage_key = key.account.as_bytes().to_vec();
        storage_key.extend_from_slice(key.currency.code().as_bytes());
        storage_key
    }

    fn index_key_number(number: &str) -> Vec<u8> {
        let mut key = IDX_NUMBER.to_vec();
        key.extend_from_slice(number.as_bytes());
        key
    }

    fn index_key_reference(reference: &str) -> Vec<u8> {
        let mut key = IDX_REFERENCE.to_vec();
        key.extend_from_slice(reference.as_bytes());
        key
    }

    fn index_prefix_owner(owner: CustomerId) -> Vec<u8> {
        let mut key = IDX_OWNER.to_vec();
        key.extend_from_slice(owner.as_bytes());
        key
    }

    fn index_key_owner(owner: CustomerId, account: AccountId) -> Vec<u8> {
        let mut key = Self::index_prefix_owner(owner);
        key.extend_from_slice(account.as_bytes());
        key
    }

    fn index_prefix_role(tag: &[u8], account: AccountId) -> Vec<u8> {
        let mut key = tag.to_vec();
        key.extend_from_slice(account.as_bytes());
        key
    }

    fn index_key_role(tag: &[u8], account: AccountId, transaction: TransactionId) -> Vec<u8> {
        let mut key = Self::index_prefix_role(tag, account);
        key.extend_from_slice(transaction.as_bytes());
        key
    }

    fn index_prefix_status(status: TransactionStatus) -> Vec<u8> {
        let mut key = IDX_STATUS.to_vec();
        key.push(status as u8);
        key
    }

    fn index_key_status(status: TransactionStatus, transaction: TransactionId) -> Vec<u8> {
        let mut key = Self::index_prefix_status(status);
        key.extend_from_slice(transaction.as_bytes());
        key
    }

    // Statistics

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        let accounts = self.approximate_count(self.cf_handle(CF_ACCOUNTS)?)?;
        let balances = self.approximate_count(self.cf_handle(CF_BALANCES)?)?;
        let transactions = self.approximate_count(self.cf_handle(CF_TRANSACTIONS)?)?;

        Ok(StorageStats {
            total_accounts: accounts,
            total_balances: balances,
            total_transactions: transactions,
        })
    }

    fn approximate_count(&self, cf: &ColumnFamily) -> Result<u64> {
        // RocksDB property for approximate count
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Number of account records (approximate)
    pub total_accounts: u64,
    /// Number of balance rows (approximate)
    pub total_balances: u64,
    /// Number of transaction records (approximate)
    pub total_transactions: u64,
}
