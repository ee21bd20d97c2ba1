//! Transaction engine
//!
//! Owner of the transaction lifecycle and the only writer of balance
//! amounts. A posting runs in three phases: validation (nothing persisted),
//! the funds check and balance computation under the balance guard, and a
//! single atomic commit of the new balance rows together with the
//! transaction record. A transaction therefore mutates balances if and only
//! if it reaches `Completed`, and a rejected request leaves the balance
//! store byte-for-byte unchanged.
//!
//! Business-rule rejections (insufficient funds, ownership mismatch) are
//! themselves recorded: the transaction persists as `Failed` with no
//! balance writes, consuming its reference number. Malformed or
//! unresolvable requests persist nothing.

use crate::{
    accounts::AccountRegistry,
    balances::{apply_credit, apply_debit},
    config::PostingConfig,
    error::{Error, Result},
    guard::BalanceGuard,
    metrics::Metrics,
    registry::NumberRegistry,
    storage::{Posting, Storage},
    types::{
        normalize_amount, Account, AccountId, AccountRole, Balance, BalanceKey, Transaction,
        TransactionId, TransactionRequest, TransactionStatus, TransactionType,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Transaction engine
#[derive(Clone)]
pub struct TransactionEngine {
    storage: Arc<Storage>,
    guard: Arc<BalanceGuard>,
    accounts: AccountRegistry,
    references: NumberRegistry,
    policy: PostingConfig,
    metrics: Metrics,
}

impl TransactionEngine {
    /// Create an engine over the given collaborators
    pub fn new(
        storage: Arc<Storage>,
        guard: Arc<BalanceGuard>,
        accounts: AccountRegistry,
        references: NumberRegistry,
        policy: PostingConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            guard,
            accounts,
            references,
            policy,
            metrics,
        }
    }

    /// Validate, post and record a transaction.
    ///
    /// On success the returned record is `Completed` with `posted_at`
    /// stamped, and the balance mutations it describes are already durable
    /// in the same atomic unit.
    pub async fn create(&self, request: &TransactionRequest) -> Result<Transaction> {
        let amount = normalize_amount(request.amount);
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidRequest("amount must be positive".to_string()));
        }
        if request.reference.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "reference number must not be empty".to_string(),
            ));
        }
        if request.debit_account.is_none() && request.credit_account.is_none() {
            return Err(Error::InvalidRequest(
                "at least one of debit/credit account is required".to_string(),
            ));
        }

        // Reference numbers are single-use. Check past commits, then park
        // the reference so a concurrent duplicate cannot slip between the
        // check and our own commit.
        if let Some(existing) = self
            .storage
            .find_transaction_id_by_reference(&request.reference)?
        {
            return self.replay_or_conflict(existing, &request.reference);
        }
        let _reservation = self.references.reserve(&request.reference).ok_or_else(|| {
            Error::Conflict(format!(
                "reference number {} already in use",
                request.reference
            ))
        })?;
        if let Some(existing) = self
            .storage
            .find_transaction_id_by_reference(&request.reference)?
        {
            return self.replay_or_conflict(existing, &request.reference);
        }

        let transaction = Transaction::from_request(request);
        self.post(transaction, None, None).await
    }

    fn replay_or_conflict(
        &self,
        existing: TransactionId,
        reference: &str,
    ) -> Result<Transaction> {
        if self.policy.idempotent_replay {
            self.storage.get_transaction(existing)
        } else {
            Err(Error::Conflict(format!(
                "reference number {} already in use",
                reference
            )))
        }
    }

    /// Post a transaction: funds check and balance mutation under the
    /// guard, committed atomically with the record.
    async fn post(
        &self,
        mut transaction: Transaction,
        previous_status: Option<TransactionStatus>,
        posted_at: Option<DateTime<Utc>>,
    ) -> Result<Transaction> {
        let started = Instant::now();

        let debit_account = self.resolve_for_posting(transaction.debit_account)?;
        let credit_account = self.resolve_for_posting(transaction.credit_account)?;

        // Transfers between two ledger accounts may be restricted to one
        // owner; external transfers are exempted by policy.
        if transaction.kind == TransactionType::Transfer
            && self.policy.require_same_owner_transfers
        {
            if let (Some(debit), Some(credit)) = (&debit_account, &credit_account) {
                if debit.owner != credit.owner {
                    let err = Error::OwnershipMismatch(format!(
                        "accounts {} and {} belong to different customers",
                        debit.id, credit.id
                    ));
                    return self.fail_and_record(transaction, previous_status, err);
                }
            }
        }

        let keys = transaction.balance_keys();
        let locks = match self.guard.acquire_many(&keys).await {
            Ok(locks) => locks,
            Err(err) => {
                self.metrics.guard_timeouts.inc();
                return Err(err);
            }
        };

        // Funds check: withdrawals and transfers must be covered by what
        // the debit account holds in the transaction currency, summed over
        // its rows, plus any overdraft headroom.
        if transaction.kind.requires_funds_check() {
            if let Some(debit) = &debit_account {
                let held: Decimal = self
                    .storage
                    .list_balances_by_account(debit.id)?
                    .iter()
                    .filter(|balance| balance.currency == transaction.currency)
                    .map(|balance| balance.amount)
                    .sum();
                let available = held - debit.overdraft.floor();
                if available < transaction.amount {
                    drop(locks);
                    let err = Error::InsufficientFunds {
                        requested: transaction.amount,
                        available,
                    };
                    return self.fail_and_record(transaction, previous_status, err);
                }
            }
        }

        // Compute the post-transaction rows. A self-transfer touches one
        // row twice, so mutations chain through the map instead of reading
        // the store twice.
        let mut rows: BTreeMap<BalanceKey, Balance> = BTreeMap::new();

        if let Some(debit) = &debit_account {
            let key = BalanceKey::new(debit.id, transaction.currency);
            let mut row = self.working_row(&rows, &key)?;
            if let Err(err) = apply_debit(&mut row, transaction.amount, &debit.overdraft) {
                drop(locks);
                return self.fail_and_record(transaction, previous_status, err);
            }
            rows.insert(key, row);
        }
        if let Some(credit) = &credit_account {
            let key = BalanceKey::new(credit.id, transaction.currency);
            let mut row = self.working_row(&rows, &key)?;
            apply_credit(&mut row, transaction.amount);
            rows.insert(key, row);
        }

        transaction.status = TransactionStatus::Completed;
        transaction.posted_at = Some(posted_at.unwrap_or_else(Utc::now));

        let balances: Vec<Balance> = rows.into_values().collect();
        self.storage.commit_posting(&Posting {
            transaction: &transaction,
            balances: &balances,
            previous_status,
        })?;
        drop(locks);

        self.metrics.postings_completed.inc();
        self.metrics
            .posting_duration
            .observe(started.elapsed().as_secs_f64());

        tracing::info!(
            transaction_id = %transaction.id,
            reference = %transaction.reference,
            kind = ?transaction.kind,
            amount = %transaction.amount,
            currency = %transaction.currency,
            "Transaction posted"
        );

        Ok(transaction)
    }

    /// Resolve an optional account and require it to accept postings
    fn resolve_for_posting(&self, account_id: Option<AccountId>) -> Result<Option<Account>> {
        let Some(account_id) = account_id else {
            return Ok(None);
        };
        let account = self.accounts.resolve(account_id)?;
        if !account.status.allows_postings() {
            return Err(Error::AccountInactive(account_id.to_string()));
        }
        Ok(Some(account))
    }

    fn working_row(
        &self,
        rows: &BTreeMap<BalanceKey, Balance>,
        key: &BalanceKey,
    ) -> Result<Balance> {
        if let Some(row) = rows.get(key) {
            return Ok(row.clone());
        }
        Ok(self
            .storage
            .get_balance(key)?
            .unwrap_or_else(|| Balance::opening(key.account, key.currency)))
    }

    /// Record a business-rule rejection as a `Failed` transaction with no
    /// balance effect, then surface the error
    fn fail_and_record(
        &self,
        mut transaction: Transaction,
        previous_status: Option<TransactionStatus>,
        err: Error,
    ) -> Result<Transaction> {
        transaction.status = TransactionStatus::Failed;
        transaction.failure_reason = Some(err.to_string());

        self.storage.commit_posting(&Posting {
            transaction: &transaction,
            balances: &[],
            previous_status,
        })?;

        self.metrics.postings_failed.inc();
        if matches!(err, Error::InsufficientFunds { .. }) {
            self.metrics.insufficient_funds.inc();
        }

        tracing::warn!(
            transaction_id = %transaction.id,
            reference = %transaction.reference,
            reason = %err,
            "Transaction failed"
        );

        Err(err)
    }

    /// Drive the status state machine.
    ///
    /// `Pending -> Completed` posts the transaction (stamping `posted_at`
    /// with the supplied time or now); `Pending -> Failed` records the
    /// rejection; `Completed -> Reversed` applies the inverse balance
    /// adjustment. Anything else is an invalid transition.
    pub async fn update_status(
        &self,
        transaction_id: TransactionId,
        status: TransactionStatus,
        posted_at: Option<DateTime<Utc>>,
    ) -> Result<Transaction> {
        let transaction = self.storage.get_transaction(transaction_id)?;
        if !transaction.status.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                from: transaction.status,
                to: status,
            });
        }

        match status {
            TransactionStatus::Completed => {
                let previous = transaction.status;
                self.post(transaction, Some(previous), posted_at).await
            }
            TransactionStatus::Failed => {
                let previous = transaction.status;
                let mut failed = transaction;
                failed.status = TransactionStatus::Failed;
                self.storage.commit_posting(&Posting {
                    transaction: &failed,
                    balances: &[],
                    previous_status: Some(previous),
                })?;
                self.metrics.postings_failed.inc();
                Ok(failed)
            }
            TransactionStatus::Reversed => self.reverse(transaction).await,
            // Unreachable: no status transitions back to Pending
            TransactionStatus::Pending => Err(Error::InvalidTransition {
                from: transaction.status,
                to: status,
            }),
        }
    }

    /// Apply the compensating adjustment for a completed transaction.
    ///
    /// The original record keeps its amount and accounts; only its status
    /// moves to `Reversed`. The claw-back debits the original credit
    /// account under its own overdraft floor, so a reversal can itself fail
    /// with insufficient funds, leaving everything unchanged.
    async fn reverse(&self, mut transaction: Transaction) -> Result<Transaction> {
        let debit_account = transaction
            .debit_account
            .map(|id| self.accounts.resolve(id))
            .transpose()?;
        let credit_account = transaction
            .credit_account
            .map(|id| self.accounts.resolve(id))
            .transpose()?;

        let keys = transaction.balance_keys();
        let locks = match self.guard.acquire_many(&keys).await {
            Ok(locks) => locks,
            Err(err) => {
                self.metrics.guard_timeouts.inc();
                return Err(err);
            }
        };

        let mut rows: BTreeMap<BalanceKey, Balance> = BTreeMap::new();

        if let Some(credit) = &credit_account {
            let key = BalanceKey::new(credit.id, transaction.currency);
            let mut row = self.working_row(&rows, &key)?;
            apply_debit(&mut row, transaction.amount, &credit.overdraft)?;
            rows.insert(key, row);
        }
        if let Some(debit) = &debit_account {
            let key = BalanceKey::new(debit.id, transaction.currency);
            let mut row = self.working_row(&rows, &key)?;
            apply_credit(&mut row, transaction.amount);
            rows.insert(key, row);
        }

        let previous = transaction.status;
        transaction.status = TransactionStatus::Reversed;

        let balances: Vec<Balance> = rows.into_values().collect();
        self.storage.commit_posting(&Posting {
            transaction: &transaction,
            balances: &balances,
            previous_status: Some(previous),
        })?;
        drop(locks);

        self.metrics.postings_reversed.inc();

        tracing::info!(
            transaction_id = %transaction.id,
            reference = %transaction.reference,
            "Transaction reversed"
        );

        Ok(transaction)
    }

    // Read projections

    /// Get transaction by ID
    pub fn get(&self, transaction_id: TransactionId) -> Result<Transaction> {
        self.storage.get_transaction(transaction_id)
    }

    /// Get transaction by reference number
    pub fn get_by_reference(&self, reference: &str) -> Result<Transaction> {
        let transaction_id = self
            .storage
            .find_transaction_id_by_reference(reference)?
            .ok_or_else(|| Error::TransactionNotFound(reference.to_string()))?;
        self.storage.get_transaction(transaction_id)
    }

    /// Transactions where the account plays the given role
    pub fn list_by_account(
        &self,
        account_id: AccountId,
        role: AccountRole,
    ) -> Result<Vec<Transaction>> {
        // Distinguish "unknown account" from "no transactions"
        self.accounts.resolve(account_id)?;
        self.storage.list_transactions_by_account(account_id, role)
    }

    /// Transactions currently in the given status
    pub fn list_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>> {
        self.storage.list_transactions_by_status(status)
    }
}
