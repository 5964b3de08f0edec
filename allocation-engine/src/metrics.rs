//! Metrics collection for observability
//!
//! Prometheus metrics for the allocation engine, registered on a registry
//! owned by each engine instance.
//!
//! # Metrics
//!
//! - `allocation_transactions_total{operation}` - Committed transactions
//! - `allocation_rejections_total{operation,kind}` - Rejected transactions
//! - `allocation_lock_contention_total` - Lock waits that timed out
//! - `allocation_donors_released_total` - Reservations dropped by fulfil/cancel
//! - `allocation_transaction_duration_seconds{operation}` - Transaction latency

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed transactions by operation
    pub transactions_total: IntCounterVec,

    /// Rejected transactions by operation and error kind
    pub rejections_total: IntCounterVec,

    /// Lock waits that timed out
    pub lock_contention_total: IntCounter,

    /// Reservations dropped as a side effect of fulfil/cancel
    pub donors_released_total: IntCounter,

    /// Transaction latency
    pub transaction_duration: HistogramVec,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_total = IntCounterVec::new(
            Opts::new("allocation_transactions_total", "Committed allocation transactions"),
            &["operation"],
        )?;
        registry.register(Box::new(transactions_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new("allocation_rejections_total", "Rejected allocation transactions"),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let lock_contention_total = IntCounter::new(
            "allocation_lock_contention_total",
            "Entity lock waits that timed out",
        )?;
        registry.register(Box::new(lock_contention_total.clone()))?;

        let donors_released_total = IntCounter::new(
            "allocation_donors_released_total",
            "Reservations released by fulfilment or request cancellation",
        )?;
        registry.register(Box::new(donors_released_total.clone()))?;

        let transaction_duration = HistogramVec::new(
            HistogramOpts::new(
                "allocation_transaction_duration_seconds",
                "Histogram of transaction latencies",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.250, 1.0]),
            &["operation"],
        )?;
        registry.register(Box::new(transaction_duration.clone()))?;

        Ok(Self {
            transactions_total,
            rejections_total,
            lock_contention_total,
            donors_released_total,
            transaction_duration,
            registry,
        })
    }

    /// Record a committed transaction
    pub fn record_success(&self, operation: &str, seconds: f64) {
        self.transactions_total.with_label_values(&[operation]).inc();
        self.transaction_duration
            .with_label_values(&[operation])
            .observe(seconds);
    }

    /// Record a rejected transaction
    pub fn record_failure(&self, operation: &str, error: &crate::Error) {
        self.rejections_total
            .with_label_values(&[operation, error.kind()])
            .inc();
        if error.is_retryable() {
            self.lock_contention_total.inc();
        }
    }

    /// Committed count for one operation
    pub fn committed(&self, operation: &str) -> u64 {
        self.transactions_total.with_label_values(&[operation]).get()
    }

    /// Text exposition format
    pub fn gather_text(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
