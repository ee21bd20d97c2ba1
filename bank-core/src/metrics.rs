//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `bank_postings_completed_total` - Transactions posted successfully
//! - `bank_postings_failed_total` - Transactions rejected by validation or funds checks
//! - `bank_postings_reversed_total` - Completed transactions reversed
//! - `bank_insufficient_funds_total` - Rejections caused by the funds check
//! - `bank_guard_timeouts_total` - Balance lock acquisitions that timed out
//! - `bank_posting_duration_seconds` - Histogram of posting latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transactions posted successfully
    pub postings_completed: IntCounter,

    /// Transactions rejected before any balance effect
    pub postings_failed: IntCounter,

    /// Completed transactions reversed
    pub postings_reversed: IntCounter,

    /// Funds-check rejections
    pub insufficient_funds: IntCounter,

    /// Balance lock acquisition timeouts
    pub guard_timeouts: IntCounter,

    /// Posting latency histogram
    pub posting_duration: Histogram,

    /// Prometheus registry
    registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let postings_completed = IntCounter::new(
            "bank_postings_completed_total",
            "Transactions posted successfully",
        )?;
        registry.register(Box::new(postings_completed.clone()))?;

        let postings_failed = IntCounter::new(
            "bank_postings_failed_total",
            "Transactions rejected by validation or funds checks",
        )?;
        registry.register(Box::new(postings_failed.clone()))?;

        let postings_reversed = IntCounter::new(
            "bank_postings_reversed_total",
            "Completed transactions reversed",
        )?;
        registry.register(Box::new(postings_reversed.clone()))?;

        let insufficient_funds = IntCounter::new(
            "bank_insufficient_funds_total",
            "Rejections caused by the funds check",
        )?;
        registry.register(Box::new(insufficient_funds.clone()))?;

        let guard_timeouts = IntCounter::new(
            "bank_guard_timeouts_total",
            "Balance lock acquisitions that timed out",
        )?;
        registry.register(Box::new(guard_timeouts.clone()))?;

        let posting_duration = Histogram::with_opts(
            HistogramOpts::new(
                "bank_posting_duration_seconds",
                "Histogram of posting latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(posting_duration.clone()))?;

        Ok(Self {
            postings_completed,
            postings_failed,
            postings_reversed,
            insufficient_funds,
            guard_timeouts,
            posting_duration,
            registry,
        })
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.postings_completed.get(), 0);
        assert_eq!(metrics.postings_failed.get(), 0);

        // Each collector owns its registry, so a second instance is fine
        let again = Metrics::new().unwrap();
        assert_eq!(again.guard_timeouts.get(), 0);
    }

    #[test]
    fn test_counters_increment() {
        let metrics = Metrics::new().unwrap();
        metrics.postings_completed.inc();
        metrics.postings_completed.inc();
        metrics.insufficient_funds.inc();
        assert_eq!(metrics.postings_completed.get(), 2);
        assert_eq!(metrics.insufficient_funds.get(), 1);
    }

    #[test]
    fn test_registry_gathers_families() {
        let metrics = Metrics::new().unwrap();
        metrics.posting_duration.observe(0.003);
        let families = metrics.registry().gather();
        assert!(families
            .iter()
            .any(|family| family.get_name() == "bank_posting_duration_seconds"));
    }
}
