//! Error types for the banking ledger

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::TransactionStatus;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Not-found, conflict and funds failures are distinct variants so callers
/// can tell a bad reference from a business-rule violation. Every mutating
/// operation guarantees that on any error the stores are left exactly as
/// they were before the call.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Customer not found
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Balance not found
    #[error("Balance not found: {0}")]
    BalanceNotFound(String),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Duplicate account number or reference number
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Requested amount exceeds what the debit account can spend
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Amount the request tried to move
        requested: Decimal,
        /// Amount the account could spend at the time of the check
        available: Decimal,
    },

    /// Transfer endpoints belong to different customers
    #[error("Ownership mismatch: {0}")]
    OwnershipMismatch(String),

    /// Illegal status change
    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Status the transaction was in
        from: TransactionStatus,
        /// Status the caller asked for
        to: TransactionStatus,
    },

    /// Account exists but is frozen or closed
    #[error("Account inactive: {0}")]
    AccountInactive(String),

    /// Balance guard could not be acquired within the configured timeout;
    /// safe to retry, nothing was mutated
    #[error("Busy: {0}")]
    Busy(String),

    /// Request is malformed (non-positive amount, empty reference,
    /// no accounts)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a caller may safely retry the operation with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Busy(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
