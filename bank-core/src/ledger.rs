//! Main ledger orchestration layer
//!
//! This module ties together storage, the balance guard, the registries
//! and the transaction engine into a high-level API for a request-handling
//! layer.
//!
//! # Example
//!
//! ```no_run
//! use bank_core::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> bank_core::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     // Open accounts, post transactions...
//!     // let account = ledger.create_account(...)?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    accounts::{AccountRegistry, CustomerDirectory, InMemoryCustomerDirectory},
    balances::BalanceStore,
    config::Config,
    engine::TransactionEngine,
    error::Result,
    guard::BalanceGuard,
    metrics::Metrics,
    registry::NumberRegistry,
    storage::{Storage, StorageStats},
    types::{
        Account, AccountId, AccountRole, AccountStatus, AccountType, Balance, Currency,
        CustomerId, OverdraftPolicy, Transaction, TransactionId, TransactionRequest,
        TransactionStatus,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::Duration;

/// Main ledger interface
pub struct Ledger {
    /// Direct storage access (for stats)
    storage: Arc<Storage>,

    /// Account registry
    accounts: AccountRegistry,

    /// Balance store
    balances: BalanceStore,

    /// Transaction engine
    engine: TransactionEngine,

    /// Metrics collector
    metrics: Metrics,
}

impl Ledger {
    /// Open ledger with configuration.
    ///
    /// The default customer directory is an empty in-memory one; wire a
    /// real identity service with [`Ledger::with_customer_directory`].
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with_directory(config, Arc::new(InMemoryCustomerDirectory::new())).await
    }

    /// Open ledger with a customer directory
    pub async fn open_with_directory(
        config: Config,
        customers: Arc<dyn CustomerDirectory>,
    ) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let guard = Arc::new(BalanceGuard::new(Duration::from_millis(
            config.guard.acquire_timeout_ms,
        )));
        let metrics = Metrics::new()
            .map_err(|e| crate::Error::Config(format!("Failed to create metrics: {}", e)))?;

        let accounts = AccountRegistry::new(storage.clone(), NumberRegistry::new(), customers);
        let balances = BalanceStore::new(storage.clone(), guard.clone());
        let engine = TransactionEngine::new(
            storage.clone(),
            guard,
            accounts.clone(),
            NumberRegistry::new(),
            config.posting.clone(),
            metrics.clone(),
        );

        Ok(Self {
            storage,
            accounts,
            balances,
            engine,
            metrics,
        })
    }

    /// Replace the customer directory
    pub fn with_customer_directory(mut self, customers: Arc<dyn CustomerDirectory>) -> Self {
        self.accounts.set_customer_directory(customers);
        self
    }

    // Accounts

    /// Open an account for a customer
    pub fn create_account(
        &self,
        number: &str,
        kind: AccountType,
        owner: CustomerId,
        overdraft: OverdraftPolicy,
    ) -> Result<Account> {
        self.accounts.create_account(number, kind, owner, overdraft)
    }

    /// Get account by ID
    pub fn get_account(&self, account_id: AccountId) -> Result<Account> {
        self.accounts.resolve(account_id)
    }

    /// Get account by number
    pub fn get_account_by_number(&self, number: &str) -> Result<Account> {
        self.accounts.resolve_by_number(number)
    }

    /// All accounts owned by one customer
    pub fn list_accounts_by_owner(&self, owner: CustomerId) -> Result<Vec<Account>> {
        self.accounts.list_by_owner(owner)
    }

    /// Whether the account belongs to the customer
    pub fn is_owned_by(&self, account_id: AccountId, customer: CustomerId) -> Result<bool> {
        self.accounts.is_owned_by(account_id, customer)
    }

    /// Change the lifecycle status of an account
    pub fn set_account_status(
        &self,
        account_id: AccountId,
        status: AccountStatus,
    ) -> Result<Account> {
        self.accounts.set_status(account_id, status)
    }

    /// Change the kind of an account
    pub fn set_account_type(&self, account_id: AccountId, kind: AccountType) -> Result<Account> {
        self.accounts.set_type(account_id, kind)
    }

    /// Delete an account that nothing references anymore
    pub fn delete_account(&self, account_id: AccountId) -> Result<()> {
        self.accounts.delete_account(account_id)
    }

    // Transactions

    /// Validate, post and record a transaction
    pub async fn create_transaction(&self, request: &TransactionRequest) -> Result<Transaction> {
        self.engine.create(request).await
    }

    /// Drive the transaction status state machine
    pub async fn update_transaction_status(
        &self,
        transaction_id: TransactionId,
        status: TransactionStatus,
        posted_at: Option<DateTime<Utc>>,
    ) -> Result<Transaction> {
        self.engine.update_status(transaction_id, status, posted_at).await
    }

    /// Get transaction by ID
    pub fn get_transaction(&self, transaction_id: TransactionId) -> Result<Transaction> {
        self.engine.get(transaction_id)
    }

    /// Get transaction by reference number
    pub fn get_transaction_by_reference(&self, reference: &str) -> Result<Transaction> {
        self.engine.get_by_reference(reference)
    }

    /// Transactions where the account plays the given role
    pub fn list_transactions_by_account(
        &self,
        account_id: AccountId,
        role: AccountRole,
    ) -> Result<Vec<Transaction>> {
        self.engine.list_by_account(account_id, role)
    }

    /// Transactions currently in the given status
    pub fn list_transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>> {
        self.engine.list_by_status(status)
    }

    // Balances

    /// Get the balance row for one (account, currency) pair
    pub fn get_balance(&self, account: AccountId, currency: Currency) -> Result<Balance> {
        self.balances.get(account, currency)
    }

    /// All balance rows of one account
    pub fn list_balances_by_account(&self, account: AccountId) -> Result<Vec<Balance>> {
        self.balances.list_by_account(account)
    }

    /// Explicitly create a balance row for a currency
    pub async fn create_balance(
        &self,
        account: AccountId,
        currency: Currency,
        initial: Decimal,
    ) -> Result<Balance> {
        self.balances.create(account, currency, initial).await
    }

    /// Administrative correction of a balance amount, outside normal
    /// transaction processing
    pub async fn adjust_balance(
        &self,
        account: AccountId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Balance> {
        self.balances.adjust(account, currency, amount).await
    }

    // Observability

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.stats()
    }

    /// Metrics collector for this ledger
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Close the ledger (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.storage);
        tracing::info!("Ledger closed");
        Ok(())
    }
}
