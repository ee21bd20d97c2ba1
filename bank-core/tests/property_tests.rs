//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Money conservation: transfers never create or destroy funds
//! - All-or-nothing: rejected requests leave balances untouched
//! - Single-use references: a recorded reference number is never reusable
//! - No overdraft under concurrency: racing debits cannot breach the floor

use bank_core::{
    AccountRole, AccountType, Config, Currency, CustomerId, Error, InMemoryCustomerDirectory,
    Ledger, OverdraftPolicy, TransactionRequest, TransactionStatus, TransactionType,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use tempfile::TempDir;

/// Strategy for generating valid amounts (positive, two decimal places)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000_00i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for generating currencies
fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::GBP),
        Just(Currency::JPY),
        Just(Currency::AUD),
        Just(Currency::CAD),
        Just(Currency::CNY),
        Just(Currency::NZD),
    ]
}

/// Create a test ledger with one registered customer
async fn create_test_ledger(temp_dir: &TempDir) -> (Ledger, CustomerId) {
    let mut config = Config::default();
    config.data_dir = temp_dir.path().join("ledger");

    let customers = Arc::new(InMemoryCustomerDirectory::new());
    let owner = CustomerId::new();
    customers.register(owner);

    let ledger = Ledger::open_with_directory(config, customers).await.unwrap();
    (ledger, owner)
}

fn deposit_request(account: bank_core::AccountId, reference: &str, amount: Decimal, currency: Currency) -> TransactionRequest {
    TransactionRequest {
        reference: reference.to_string(),
        debit_account: None,
        credit_account: Some(account),
        amount,
        currency,
        kind: TransactionType::Deposit,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(25))]

    /// Property: deposits of any positive amount are accepted and the
    /// balance row reflects exactly the deposited amount
    #[test]
    fn prop_positive_deposits_accepted(amount in amount_strategy(), currency in currency_strategy()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let temp_dir = TempDir::new().unwrap();
            let (ledger, owner) = create_test_ledger(&temp_dir).await;

            let account = ledger
                .create_account("ACC-1", AccountType::Checking, owner, OverdraftPolicy::default())
                .unwrap();

            let transaction = ledger
                .create_transaction(&deposit_request(account.id, "DEP-1", amount, currency))
                .await
                .unwrap();
            prop_assert_eq!(transaction.status, TransactionStatus::Completed);
            prop_assert!(transaction.posted_at.is_some());

            let balance = ledger.get_balance(account.id, currency).unwrap();
            prop_assert_eq!(balance.amount, amount);
            Ok(())
        })?;
    }

    /// Property: for any sequence of funded transfers between two accounts,
    /// the sum of both balances equals the seeded total afterwards
    #[test]
    fn prop_transfers_conserve_money(amounts in prop::collection::vec(amount_strategy(), 1..8)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let temp_dir = TempDir::new().unwrap();
            let (ledger, owner) = create_test_ledger(&temp_dir).await;

            let from = ledger
                .create_account("ACC-1", AccountType::Checking, owner, OverdraftPolicy::default())
                .unwrap();
            let to = ledger
                .create_account("ACC-2", AccountType::Savings, owner, OverdraftPolicy::default())
                .unwrap();

            let total: Decimal = amounts.iter().copied().sum();
            ledger
                .create_transaction(&deposit_request(from.id, "SEED-1", total, Currency::USD))
                .await
                .unwrap();

            for (index, amount) in amounts.iter().enumerate() {
                let transaction = ledger
                    .create_transaction(&TransactionRequest {
                        reference: format!("TRF-{}", index),
                        debit_account: Some(from.id),
                        credit_account: Some(to.id),
                        amount: *amount,
                        currency: Currency::USD,
                        kind: TransactionType::Transfer,
                    })
                    .await
                    .unwrap();
                prop_assert_eq!(transaction.status, TransactionStatus::Completed);
            }

            let remaining = ledger.get_balance(from.id, Currency::USD).unwrap().amount;
            let received = ledger.get_balance(to.id, Currency::USD).unwrap().amount;
            prop_assert_eq!(remaining + received, total);
            prop_assert_eq!(received, total);
            Ok(())
        })?;
    }

    /// Property: a withdrawal above the available balance always fails with
    /// `InsufficientFunds` carrying the exact amounts, and changes nothing
    #[test]
    fn prop_overdrawn_withdrawal_rejected(
        held_cents in 0i64..100_000_00i64,
        extra_cents in 1i64..100_000_00i64,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let temp_dir = TempDir::new().unwrap();
            let (ledger, owner) = create_test_ledger(&temp_dir).await;

            let account = ledger
                .create_account("ACC-1", AccountType::Checking, owner, OverdraftPolicy::default())
                .unwrap();

            let held = Decimal::new(held_cents, 2);
            if held > Decimal::ZERO {
                ledger
                    .create_transaction(&deposit_request(account.id, "SEED-1", held, Currency::USD))
                    .await
                    .unwrap();
            }

            let requested = held + Decimal::new(extra_cents, 2);
            let err = ledger
                .create_transaction(&TransactionRequest {
                    reference: "WD-1".to_string(),
                    debit_account: Some(account.id),
                    credit_account: None,
                    amount: requested,
                    currency: Currency::USD,
                    kind: TransactionType::Withdrawal,
                })
                .await
                .unwrap_err();

            match err {
                Error::InsufficientFunds { requested: reported_requested, available } => {
                    prop_assert_eq!(reported_requested, requested);
                    prop_assert_eq!(available, held);
                }
                other => prop_assert!(false, "expected InsufficientFunds, got {}", other),
            }

            // All-or-nothing: the balance store is unchanged
            if held > Decimal::ZERO {
                prop_assert_eq!(ledger.get_balance(account.id, Currency::USD).unwrap().amount, held);
            } else {
                prop_assert!(ledger.get_balance(account.id, Currency::USD).is_err());
            }

            // The failed record consumed its reference number
            let failed = ledger.get_transaction_by_reference("WD-1").unwrap();
            prop_assert_eq!(failed.status, TransactionStatus::Failed);
            let reuse = ledger
                .create_transaction(&deposit_request(account.id, "WD-1", Decimal::ONE, Currency::USD))
                .await;
            prop_assert!(matches!(reuse, Err(Error::Conflict(_))));
            Ok(())
        })?;
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    /// Worked example: 100.00 USD on A, transfer 30.00 to B
    #[tokio::test]
    async fn test_transfer_example() {
        let temp_dir = TempDir::new().unwrap();
        let (ledger, owner) = create_test_ledger(&temp_dir).await;

        let a = ledger
            .create_account("A-1", AccountType::Checking, owner, OverdraftPolicy::default())
            .unwrap();
        let b = ledger
            .create_account("B-1", AccountType::Checking, owner, OverdraftPolicy::default())
            .unwrap();

        ledger
            .create_transaction(&deposit_request(a.id, "SEED-1", Decimal::new(100_00, 2), Currency::USD))
            .await
            .unwrap();

        let transfer = ledger
            .create_transaction(&TransactionRequest {
                reference: "TRF-1".to_string(),
                debit_account: Some(a.id),
                credit_account: Some(b.id),
                amount: Decimal::new(30_00, 2),
                currency: Currency::USD,
                kind: TransactionType::Transfer,
            })
            .await
            .unwrap();

        assert_eq!(transfer.status, TransactionStatus::Completed);
        assert_eq!(
            ledger.get_balance(a.id, Currency::USD).unwrap().amount,
            Decimal::new(70_00, 2)
        );
        assert_eq!(
            ledger.get_balance(b.id, Currency::USD).unwrap().amount,
            Decimal::new(30_00, 2)
        );
    }

    /// Worked example: 10.00 USD on A, withdrawal of 50.00 fails
    #[tokio::test]
    async fn test_insufficient_funds_example() {
        let temp_dir = TempDir::new().unwrap();
        let (ledger, owner) = create_test_ledger(&temp_dir).await;

        let a = ledger
            .create_account("A-1", AccountType::Checking, owner, OverdraftPolicy::default())
            .unwrap();
        ledger
            .create_transaction(&deposit_request(a.id, "SEED-1", Decimal::new(10_00, 2), Currency::USD))
            .await
            .unwrap();

        let err = ledger
            .create_transaction(&TransactionRequest {
                reference: "WD-1".to_string(),
                debit_account: Some(a.id),
                credit_account: None,
                amount: Decimal::new(50_00, 2),
                currency: Currency::USD,
                kind: TransactionType::Withdrawal,
            })
            .await
            .unwrap_err();

        match err {
            Error::InsufficientFunds { requested, available } => {
                assert_eq!(requested, Decimal::new(50_00, 2));
                assert_eq!(available, Decimal::new(10_00, 2));
            }
            other => panic!("expected InsufficientFunds, got {other}"),
        }
        assert_eq!(
            ledger.get_balance(a.id, Currency::USD).unwrap().amount,
            Decimal::new(10_00, 2)
        );
    }

    /// Racing debits against funds for exactly one: one winner, no overdraft
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_debits_single_winner() {
        let temp_dir = TempDir::new().unwrap();
        let (ledger, owner) = create_test_ledger(&temp_dir).await;
        let ledger = Arc::new(ledger);

        let account = ledger
            .create_account("ACC-1", AccountType::Checking, owner, OverdraftPolicy::default())
            .unwrap();
        ledger
            .create_transaction(&deposit_request(
                account.id,
                "SEED-1",
                Decimal::new(100_00, 2),
                Currency::USD,
            ))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for worker in 0..8 {
            let ledger = ledger.clone();
            let account_id = account.id;
            tasks.push(tokio::spawn(async move {
                ledger
                    .create_transaction(&TransactionRequest {
                        reference: format!("WD-{}", worker),
                        debit_account: Some(account_id),
                        credit_account: None,
                        amount: Decimal::new(100_00, 2),
                        currency: Currency::USD,
                        kind: TransactionType::Withdrawal,
                    })
                    .await
            }));
        }

        let mut successes = 0;
        let mut rejections = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(transaction) => {
                    assert_eq!(transaction.status, TransactionStatus::Completed);
                    successes += 1;
                }
                Err(Error::InsufficientFunds { .. }) => rejections += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(rejections, 7);
        assert_eq!(
            ledger.get_balance(account.id, Currency::USD).unwrap().amount,
            Decimal::ZERO
        );
    }

    /// Unrelated balances post in parallel without contention failures
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_disjoint_accounts_post_concurrently() {
        let temp_dir = TempDir::new().unwrap();
        let (ledger, owner) = create_test_ledger(&temp_dir).await;
        let ledger = Arc::new(ledger);

        let mut accounts = Vec::new();
        for index in 0..8 {
            let account = ledger
                .create_account(
                    &format!("ACC-{}", index),
                    AccountType::Checking,
                    owner,
                    OverdraftPolicy::default(),
                )
                .unwrap();
            accounts.push(account.id);
        }

        let mut tasks = Vec::new();
        for (index, account_id) in accounts.iter().copied().enumerate() {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                for round in 0..10 {
                    ledger
                        .create_transaction(&TransactionRequest {
                            reference: format!("DEP-{}-{}", index, round),
                            debit_account: None,
                            credit_account: Some(account_id),
                            amount: Decimal::new(1_00, 2),
                            currency: Currency::USD,
                            kind: TransactionType::Deposit,
                        })
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for account_id in accounts {
            assert_eq!(
                ledger.get_balance(account_id, Currency::USD).unwrap().amount,
                Decimal::new(10_00, 2)
            );
        }
    }

    /// Duplicate submissions with the same reference: exactly one record
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_duplicate_references() {
        let temp_dir = TempDir::new().unwrap();
        let (ledger, owner) = create_test_ledger(&temp_dir).await;
        let ledger = Arc::new(ledger);

        let account = ledger
            .create_account("ACC-1", AccountType::Checking, owner, OverdraftPolicy::default())
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            let account_id = account.id;
            tasks.push(tokio::spawn(async move {
                ledger
                    .create_transaction(&deposit_request(
                        account_id,
                        "DEP-1",
                        Decimal::new(10_00, 2),
                        Currency::USD,
                    ))
                    .await
            }));
        }

        let mut successes = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => successes += 1,
                Err(Error::Conflict(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        // Exactly one posting happened
        assert_eq!(
            ledger.get_balance(account.id, Currency::USD).unwrap().amount,
            Decimal::new(10_00, 2)
        );
    }

    /// Terminal statuses reject every further transition
    #[tokio::test]
    async fn test_terminal_states_are_immutable() {
        let temp_dir = TempDir::new().unwrap();
        let (ledger, owner) = create_test_ledger(&temp_dir).await;

        let account = ledger
            .create_account("ACC-1", AccountType::Checking, owner, OverdraftPolicy::default())
            .unwrap();

        // A completed deposit, then reverse it: Reversed is fully terminal
        let deposit = ledger
            .create_transaction(&deposit_request(
                account.id,
                "DEP-1",
                Decimal::new(10_00, 2),
                Currency::USD,
            ))
            .await
            .unwrap();
        let reversed = ledger
            .update_transaction_status(deposit.id, TransactionStatus::Reversed, None)
            .await
            .unwrap();
        assert_eq!(reversed.status, TransactionStatus::Reversed);
        assert_eq!(
            ledger.get_balance(account.id, Currency::USD).unwrap().amount,
            Decimal::ZERO
        );

        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Completed,
            TransactionStatus::Failed,
            TransactionStatus::Reversed,
        ] {
            let err = ledger
                .update_transaction_status(deposit.id, status, None)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidTransition { .. }));
        }

        // A failed withdrawal is terminal too
        let err = ledger
            .create_transaction(&TransactionRequest {
                reference: "WD-1".to_string(),
                debit_account: Some(account.id),
                credit_account: None,
                amount: Decimal::new(50_00, 2),
                currency: Currency::USD,
                kind: TransactionType::Withdrawal,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));

        let failed = ledger.get_transaction_by_reference("WD-1").unwrap();
        for status in [TransactionStatus::Completed, TransactionStatus::Reversed] {
            let err = ledger
                .update_transaction_status(failed.id, status, None)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidTransition { .. }));
        }
    }

    /// Listing projections reflect roles and statuses after a mixed history
    #[tokio::test]
    async fn test_projections_after_mixed_history() {
        let temp_dir = TempDir::new().unwrap();
        let (ledger, owner) = create_test_ledger(&temp_dir).await;

        let a = ledger
            .create_account("A-1", AccountType::Checking, owner, OverdraftPolicy::default())
            .unwrap();
        let b = ledger
            .create_account("B-1", AccountType::Savings, owner, OverdraftPolicy::default())
            .unwrap();

        ledger
            .create_transaction(&deposit_request(a.id, "DEP-1", Decimal::new(100_00, 2), Currency::USD))
            .await
            .unwrap();
        ledger
            .create_transaction(&TransactionRequest {
                reference: "TRF-1".to_string(),
                debit_account: Some(a.id),
                credit_account: Some(b.id),
                amount: Decimal::new(40_00, 2),
                currency: Currency::USD,
                kind: TransactionType::Transfer,
            })
            .await
            .unwrap();
        let _ = ledger
            .create_transaction(&TransactionRequest {
                reference: "WD-1".to_string(),
                debit_account: Some(a.id),
                credit_account: None,
                amount: Decimal::new(500_00, 2),
                currency: Currency::USD,
                kind: TransactionType::Withdrawal,
            })
            .await
            .unwrap_err();

        assert_eq!(
            ledger
                .list_transactions_by_account(a.id, AccountRole::Debit)
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            ledger
                .list_transactions_by_account(a.id, AccountRole::Credit)
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            ledger
                .list_transactions_by_status(TransactionStatus::Completed)
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            ledger
                .list_transactions_by_status(TransactionStatus::Failed)
                .unwrap()
                .len(),
            1
        );
    }
}
