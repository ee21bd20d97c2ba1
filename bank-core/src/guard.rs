//! Per-balance mutual exclusion
//!
//! Every mutation of a balance row runs inside an exclusive critical
//! section keyed by (account, currency). Holders of different keys never
//! block each other; holders of the same key are serialized, which is what
//! makes the funds-check-then-mutate sequence of a posting atomic with
//! respect to concurrent postings against the same balance.
//!
//! Acquisition is bounded: an operation that cannot take its locks within
//! the configured timeout fails with [`Error::Busy`] instead of waiting
//! forever. Nothing has been mutated at that point, so the caller may
//! retry with backoff.
//!
//! Multi-key acquisitions (transfers touch two balances) always lock in
//! ascending key order, so two concurrent transfers between the same pair
//! of accounts cannot deadlock.

use crate::{
    error::{Error, Result},
    types::BalanceKey,
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Duration;

/// Lock arena keyed by (account, currency).
///
/// The arena only ever grows: one mutex per balance key that has been
/// touched. Entries are a few dozen bytes, bounded by the number of
/// distinct account-currency pairs.
pub struct BalanceGuard {
    locks: DashMap<BalanceKey, Arc<Mutex<()>>>,
    acquire_timeout: Duration,
}

/// Proof of exclusivity for one balance key, released on drop
pub struct BalanceLock {
    key: BalanceKey,
    _permit: OwnedMutexGuard<()>,
}

impl BalanceLock {
    /// Key this lock covers
    pub fn key(&self) -> BalanceKey {
        self.key
    }
}

impl std::fmt::Debug for BalanceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceLock").field("key", &self.key).finish()
    }
}

impl BalanceGuard {
    /// Create a guard with the given acquisition timeout
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            acquire_timeout,
        }
    }

    fn slot(&self, key: BalanceKey) -> Arc<Mutex<()>> {
        self.locks.entry(key).or_default().clone()
    }

    /// Acquire exclusive access to one balance key
    pub async fn acquire(&self, key: BalanceKey) -> Result<BalanceLock> {
        let slot = self.slot(key);
        match tokio::time::timeout(self.acquire_timeout, slot.lock_owned()).await {
            Ok(permit) => Ok(BalanceLock {
                key,
                _permit: permit,
            }),
            Err(_) => {
                tracing::warn!(%key, "Balance lock acquisition timed out");
                Err(Error::Busy(format!("balance {} is contended", key)))
            }
        }
    }

    /// Acquire exclusive access to several balance keys.
    ///
    /// Keys are deduplicated and locked in ascending order. On timeout every
    /// lock taken so far is released before the error returns.
    pub async fn acquire_many(&self, keys: &[BalanceKey]) -> Result<Vec<BalanceLock>> {
        let mut sorted: Vec<BalanceKey> = keys.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut locks = Vec::with_capacity(sorted.len());
        for key in sorted {
            locks.push(self.acquire(key).await?);
        }
        Ok(locks)
    }
}
