//! Meridian Core Banking Ledger
//!
//! Accounts, per-currency balances and the transactions that move value
//! between them, with the consistency rules enforced under concurrent
//! access.
//!
//! # Architecture
//!
//! - **Account registry**: account identity, numbering, status; read-only
//!   from the posting path
//! - **Balance store**: one mutable row per (account, currency), the only
//!   mutable financial state
//! - **Transaction engine**: validates requests, runs the funds check and
//!   the balance mutation as one atomic unit, drives the status machine
//! - **Balance guard**: per-(account, currency) exclusive critical
//!   sections with bounded-wait acquisition
//!
//! # Invariants
//!
//! - Balances change if and only if a transaction reaches `Completed`
//! - A rejected request leaves the balance store byte-for-byte unchanged
//! - Account numbers and reference numbers are single-use forever
//! - Transfers conserve money: debit and credit commit together or not at all
//! - Concurrent postings against one balance serialize; distinct balances
//!   proceed in parallel

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod accounts;
pub mod balances;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod metrics;
pub mod registry;
pub mod storage;
pub mod types;

// Re-exports
pub use accounts::{AccountRegistry, CustomerDirectory, InMemoryCustomerDirectory};
pub use balances::BalanceStore;
pub use config::Config;
pub use engine::TransactionEngine;
pub use error::{Error, Result};
pub use guard::BalanceGuard;
pub use ledger::Ledger;
pub use metrics::Metrics;
pub use storage::Storage;
pub use types::{
    Account, AccountId, AccountRole, AccountStatus, AccountType, Balance, BalanceId, BalanceKey,
    Currency, CustomerId, OverdraftPolicy, Transaction, TransactionId, TransactionRequest,
    TransactionStatus, TransactionType,
};
