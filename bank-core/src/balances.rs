//! Balance store
//!
//! One row per (account, currency), created on first deposit or by explicit
//! creation. Rows are mutated only under the balance guard: the store
//! acquires it for the single-row operations here, and the transaction
//! engine acquires it across every row a posting touches.
//!
//! `apply_credit` / `apply_debit` are the only places that change a row's
//! amount; the debit side enforces the account's overdraft floor and
//! refuses the mutation outright when it would be breached.

use crate::{
    error::{Error, Result},
    guard::BalanceGuard,
    storage::Storage,
    types::{normalize_amount, AccountId, Balance, BalanceKey, Currency, OverdraftPolicy},
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Add to a row's amount
pub fn apply_credit(balance: &mut Balance, amount: Decimal) {
    balance.amount += amount;
}

/// Subtract from a row's amount, refusing to breach the overdraft floor.
///
/// Computes the would-be result first and leaves the row untouched on
/// failure. The reported available amount is what the account could spend:
/// the current amount minus the floor.
pub fn apply_debit(
    balance: &mut Balance,
    amount: Decimal,
    policy: &OverdraftPolicy,
) -> Result<()> {
    let available = balance.amount - policy.floor();
    if available < amount {
        return Err(Error::InsufficientFunds {
            requested: amount,
            available,
        });
    }
    balance.amount -= amount;
    Ok(())
}

/// Balance store
#[derive(Clone)]
pub struct BalanceStore {
    storage: Arc<Storage>,
    guard: Arc<BalanceGuard>,
}

impl BalanceStore {
    /// Create a store over the given storage and guard
    pub fn new(storage: Arc<Storage>, guard: Arc<BalanceGuard>) -> Self {
        Self { storage, guard }
    }

    /// Get the balance row for one (account, currency) pair
    pub fn get(&self, account: AccountId, currency: Currency) -> Result<Balance> {
        self.storage
            .get_balance(&BalanceKey::new(account, currency))?
            .ok_or_else(|| Error::BalanceNotFound(format!("{}/{}", account, currency)))
    }

    /// All balance rows of one account
    pub fn list_by_account(&self, account: AccountId) -> Result<Vec<Balance>> {
        self.storage.list_balances_by_account(account)
    }

    /// Total held by one account in one currency.
    ///
    /// There is at most one row per (account, currency), but the amount is
    /// computed as a sum over whatever rows exist for robustness.
    pub fn total(&self, account: AccountId, currency: Currency) -> Result<Decimal> {
        let balances = self.storage.list_balances_by_account(account)?;
        Ok(balances
            .iter()
            .filter(|balance| balance.currency == currency)
            .map(|balance| balance.amount)
            .sum())
    }

    /// Explicitly create a balance row for a currency.
    ///
    /// Fails with a conflict when the (account, currency) row already
    /// exists; the account must exist.
    pub async fn create(
        &self,
        account: AccountId,
        currency: Currency,
        initial: Decimal,
    ) -> Result<Balance> {
        // Surface a missing account as such, not as a dangling balance
        self.storage.get_account(account)?;

        let key = BalanceKey::new(account, currency);
        let _lock = self.guard.acquire(key).await?;

        if self.storage.get_balance(&key)?.is_some() {
            return Err(Error::Conflict(format!("balance {} already exists", key)));
        }

        let mut balance = Balance::opening(account, currency);
        balance.amount = normalize_amount(initial);
        self.storage.put_balance(&balance)?;

        tracing::info!(%key, amount = %balance.amount, "Balance created");

        Ok(balance)
    }

    /// Administrative correction: overwrite a row's amount.
    ///
    /// This bypasses the overdraft floor on purpose; it exists for manual
    /// corrections outside normal transaction processing and is the only
    /// mutation path that does not go through a transaction record.
    pub async fn adjust(
        &self,
        account: AccountId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Balance> {
        let key = BalanceKey::new(account, currency);
        let _lock = self.guard.acquire(key).await?;

        let mut balance = self
            .storage
            .get_balance(&key)?
            .ok_or_else(|| Error::BalanceNotFound(key.to_string()))?;
        let previous = balance.amount;
        balance.amount = normalize_amount(amount);
        self.storage.put_balance(&balance)?;

        tracing::warn!(%key, %previous, amount = %balance.amount, "Balance adjusted administratively");

        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::{Account, AccountStatus, AccountType, CustomerId, OverdraftPolicy};
    use chrono::Utc;
    use tempfile::TempDir;
    use tokio::time::Duration;

    fn test_store() -> (BalanceStore, Arc<Storage>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Arc::new(Storage::open(&config).unwrap());
        let guard = Arc::new(BalanceGuard::new(Duration::from_millis(500)));
        (BalanceStore::new(storage.clone(), guard), storage, temp_dir)
    }

    fn seeded_account(storage: &Storage) -> AccountId {
        let account = Account {
            id: AccountId::new(),
            number: format!("ACC-{}", AccountId::new()),
            kind: AccountType::Checking,
            status: AccountStatus::Active,
            owner: CustomerId::new(),
            overdraft: OverdraftPolicy::default(),
            created_at: Utc::now(),
        };
        storage.insert_account(&account).unwrap();
        account.id
    }

    #[test]
    fn test_apply_debit_respects_floor() {
        let mut balance = Balance::opening(AccountId::new(), Currency::USD);
        balance.amount = Decimal::new(10_0000, 4); // 10.0000

        let err = apply_debit(&mut balance, Decimal::new(50_0000, 4), &OverdraftPolicy::default())
            .unwrap_err();
        match err {
            Error::InsufficientFunds { requested, available } => {
                assert_eq!(requested, Decimal::new(50_0000, 4));
                assert_eq!(available, Decimal::new(10_0000, 4));
            }
            other => panic!("expected InsufficientFunds, got {other}"),
        }
        // No partial effect
        assert_eq!(balance.amount, Decimal::new(10_0000, 4));

        apply_debit(&mut balance, Decimal::new(10_0000, 4), &OverdraftPolicy::default()).unwrap();
        assert_eq!(balance.amount, Decimal::ZERO);
    }

    #[test]
    fn test_apply_debit_with_overdraft() {
        let mut balance = Balance::opening(AccountId::new(), Currency::USD);
        balance.amount = Decimal::new(10_0000, 4);

        let policy = OverdraftPolicy {
            allow_overdraft: true,
            overdraft_limit: Decimal::new(100_0000, 4),
        };

        apply_debit(&mut balance, Decimal::new(60_0000, 4), &policy).unwrap();
        assert_eq!(balance.amount, Decimal::new(-50_0000, 4));

        // The floor still binds
        let err = apply_debit(&mut balance, Decimal::new(60_0000, 4), &policy).unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (store, storage, _temp) = test_store();
        let account = seeded_account(&storage);

        let balance = store
            .create(account, Currency::USD, Decimal::new(100_0000, 4))
            .await
            .unwrap();
        assert_eq!(balance.amount, Decimal::new(100_0000, 4));

        let retrieved = store.get(account, Currency::USD).unwrap();
        assert_eq!(retrieved, balance);

        assert!(matches!(
            store.get(account, Currency::EUR).unwrap_err(),
            Error::BalanceNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_create_twice_is_a_conflict() {
        let (store, storage, _temp) = test_store();
        let account = seeded_account(&storage);

        store
            .create(account, Currency::USD, Decimal::ZERO)
            .await
            .unwrap();
        let err = store
            .create(account, Currency::USD, Decimal::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_for_missing_account_fails() {
        let (store, _storage, _temp) = test_store();

        let err = store
            .create(AccountId::new(), Currency::USD, Decimal::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_adjust_overwrites_amount() {
        let (store, storage, _temp) = test_store();
        let account = seeded_account(&storage);

        store
            .create(account, Currency::USD, Decimal::new(100_0000, 4))
            .await
            .unwrap();
        let adjusted = store
            .adjust(account, Currency::USD, Decimal::new(42_5000, 4))
            .await
            .unwrap();
        assert_eq!(adjusted.amount, Decimal::new(42_5000, 4));

        assert!(matches!(
            store.adjust(account, Currency::EUR, Decimal::ZERO).await.unwrap_err(),
            Error::BalanceNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_total_sums_one_currency() {
        let (store, storage, _temp) = test_store();
        let account = seeded_account(&storage);

        store
            .create(account, Currency::USD, Decimal::new(100_0000, 4))
            .await
            .unwrap();
        store
            .create(account, Currency::EUR, Decimal::new(77_0000, 4))
            .await
            .unwrap();

        assert_eq!(store.total(account, Currency::USD).unwrap(), Decimal::new(100_0000, 4));
        assert_eq!(store.total(account, Currency::EUR).unwrap(), Decimal::new(77_0000, 4));
        assert_eq!(store.total(account, Currency::GBP).unwrap(), Decimal::ZERO);
    }
}
