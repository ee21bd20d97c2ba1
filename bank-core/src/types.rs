//! Core types for the banking ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Monetary amounts are stored with four decimal places.
pub const AMOUNT_SCALE: u32 = 4;

/// Normalize a monetary amount to the ledger scale.
///
/// Amounts arriving with more precision are rounded (banker's rounding)
/// before any validation or arithmetic, so every stored amount has at most
/// [`AMOUNT_SCALE`] decimal places.
pub fn normalize_amount(amount: Decimal) -> Decimal {
    amount.round_dp(AMOUNT_SCALE)
}

/// Identifier of a customer (account owner)
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CustomerId(Uuid);

/// Identifier of an account
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(Uuid);

/// Identifier of a transaction
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

/// Identifier of a balance row
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BalanceId(Uuid);

macro_rules! impl_uuid_id {
    ($t:ty) => {
        impl $t {
            /// Create a new identifier (UUIDv7, time-ordered)
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Raw bytes, used for storage keys
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

impl_uuid_id!(CustomerId);
impl_uuid_id!(AccountId);
impl_uuid_id!(TransactionId);
impl_uuid_id!(BalanceId);

/// ISO 4217 currency code
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[non_exhaustive]
pub enum Currency {
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
    /// Japanese Yen
    JPY,
    /// Australian Dollar
    AUD,
    /// Canadian Dollar
    CAD,
    /// Chinese Yuan
    CNY,
    /// New Zealand Dollar
    NZD,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::AUD => "AUD",
            Currency::CAD => "CAD",
            Currency::CNY => "CNY",
            Currency::NZD => "NZD",
        }
    }

    /// Parse from an ISO 4217 code
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "JPY" => Some(Currency::JPY),
            "AUD" => Some(Currency::AUD),
            "CAD" => Some(Currency::CAD),
            "CNY" => Some(Currency::CNY),
            "NZD" => Some(Currency::NZD),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Kind of account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AccountType {
    /// Everyday transactional account
    Checking = 1,
    /// Interest-bearing savings account
    Savings = 2,
    /// Revolving credit account
    Credit = 3,
    /// Fixed-term deposit account
    TermDeposit = 4,
}

/// Lifecycle status of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AccountStatus {
    /// Account can send and receive postings
    Active = 1,
    /// Postings are rejected until the account is unfrozen
    Frozen = 2,
    /// Account is closed; postings are rejected permanently
    Closed = 3,
}

impl AccountStatus {
    /// Whether postings against this account are allowed
    pub fn allows_postings(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

/// Per-account overdraft policy.
///
/// The default denies overdraft: a debit may not take the balance below
/// zero. When overdraft is allowed the floor is `-overdraft_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdraftPolicy {
    /// Whether the balance may go negative
    pub allow_overdraft: bool,
    /// How far below zero the balance may go (positive number)
    pub overdraft_limit: Decimal,
}

impl OverdraftPolicy {
    /// Lowest amount a debit may leave on the balance
    pub fn floor(&self) -> Decimal {
        if self.allow_overdraft {
            -self.overdraft_limit
        } else {
            Decimal::ZERO
        }
    }
}

impl Default for OverdraftPolicy {
    fn default() -> Self {
        Self {
            allow_overdraft: false,
            overdraft_limit: Decimal::ZERO,
        }
    }
}

/// A monetary account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account ID
    pub id: AccountId,

    /// Human-facing account number; unique forever, never reissued
    pub number: String,

    /// Kind of account
    pub kind: AccountType,

    /// Lifecycle status
    pub status: AccountStatus,

    /// Owning customer; immutable after creation
    pub owner: CustomerId,

    /// Overdraft policy applied to debits against this account
    pub overdraft: OverdraftPolicy,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Key of a balance row: one row per (account, currency)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    /// Account holding the balance
    pub account: AccountId,
    /// Currency of the balance
    pub currency: Currency,
}

impl BalanceKey {
    /// Build a key
    pub fn new(account: AccountId, currency: Currency) -> Self {
        Self { account, currency }
    }
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.currency)
    }
}

/// Funds held by one account in one currency.
///
/// This is the only mutable financial state in the system. Rows are created
/// on first deposit (or by explicit creation) and mutated exclusively by the
/// transaction engine under the balance guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Unique balance ID
    pub id: BalanceId,

    /// Account holding the balance
    pub account: AccountId,

    /// Currency of the balance
    pub currency: Currency,

    /// Current amount (exact decimal, four decimal places)
    pub amount: Decimal,
}

impl Balance {
    /// Fresh zero balance for an account/currency pair
    pub fn opening(account: AccountId, currency: Currency) -> Self {
        Self {
            id: BalanceId::new(),
            account,
            currency,
            amount: Decimal::ZERO,
        }
    }

    /// Key of this row
    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.account, self.currency)
    }
}

/// Kind of transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionType {
    /// External funds arriving on the credit account
    Deposit = 1,
    /// Funds leaving the debit account to an external destination
    Withdrawal = 2,
    /// Funds moving between two ledger accounts
    Transfer = 3,
    /// Payment leaving the debit account
    Payment = 4,
    /// Fee charged to the debit account
    Fee = 5,
    /// Interest credited to the credit account
    Interest = 6,
}

impl TransactionType {
    /// Whether this kind requires available funds on the debit account
    pub fn requires_funds_check(&self) -> bool {
        matches!(self, TransactionType::Withdrawal | TransactionType::Transfer)
    }
}

/// Status of a transaction (state machine)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Initial state; no balance effect yet
    Pending = 1,
    /// Posted; balances reflect the transaction
    Completed = 2,
    /// Rejected before any balance effect
    Failed = 3,
    /// Compensated after completion; balances restored
    Reversed = 4,
}

impl TransactionStatus {
    /// Whether the status permits a transition to `next`.
    ///
    /// `Completed` is otherwise final but permits the one compensating
    /// transition to `Reversed`.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Completed)
                | (TransactionStatus::Pending, TransactionStatus::Failed)
                | (TransactionStatus::Completed, TransactionStatus::Reversed)
        )
    }

    /// Whether the transaction has finished its lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed
                | TransactionStatus::Failed
                | TransactionStatus::Reversed
        )
    }
}

/// Which side of a transaction an account sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountRole {
    /// Account the funds leave
    Debit,
    /// Account the funds arrive on
    Credit,
}

/// A request to create and post a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Caller-supplied reference number; globally unique, used to detect
    /// duplicate submission
    pub reference: String,

    /// Account the funds leave; `None` means an external source
    pub debit_account: Option<AccountId>,

    /// Account the funds arrive on; `None` means an external destination
    pub credit_account: Option<AccountId>,

    /// Amount to move; must be positive
    pub amount: Decimal,

    /// Currency of the amount
    pub currency: Currency,

    /// Kind of transaction
    pub kind: TransactionType,
}

/// A recorded transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID
    pub id: TransactionId,

    /// Reference number; globally unique, never reused
    pub reference: String,

    /// Account the funds leave; `None` means an external source
    pub debit_account: Option<AccountId>,

    /// Account the funds arrive on; `None` means an external destination
    pub credit_account: Option<AccountId>,

    /// Amount moved (exact decimal, four decimal places)
    pub amount: Decimal,

    /// Currency of the amount
    pub currency: Currency,

    /// Kind of transaction
    pub kind: TransactionType,

    /// Current status
    pub status: TransactionStatus,

    /// Creation timestamp; immutable
    pub created_at: DateTime<Utc>,

    /// When the posting settled; set on completion
    pub posted_at: Option<DateTime<Utc>>,

    /// Why the transaction failed, for failed records
    pub failure_reason: Option<String>,
}

impl Transaction {
    /// Build a pending transaction from a request
    pub fn from_request(request: &TransactionRequest) -> Self {
        Self {
            id: TransactionId::new(),
            reference: request.reference.clone(),
            debit_account: request.debit_account,
            credit_account: request.credit_account,
            amount: normalize_amount(request.amount),
            currency: request.currency,
            kind: request.kind,
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
            posted_at: None,
            failure_reason: None,
        }
    }

    /// Balance keys this transaction touches when posting
    pub fn balance_keys(&self) -> Vec<BalanceKey> {
        let mut keys = Vec::with_capacity(2);
        if let Some(debit) = self.debit_account {
            keys.push(BalanceKey::new(debit, self.currency));
        }
        if let Some(credit) = self.credit_account {
            keys.push(BalanceKey::new(credit, self.currency));
        }
        keys
    }
}
