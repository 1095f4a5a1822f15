//! Prometheus metrics for the posting engine.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Document postings by outcome.
pub static POSTINGS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_postings_total",
        "Total number of document postings",
        &["kind", "status"] // ok, error - not organization to avoid cardinality explosion
    )
    .expect("Failed to register postings_total")
});

/// Document reversals by outcome.
pub static REVERSALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_reversals_total",
        "Total number of document reversals",
        &["kind", "status"]
    )
    .expect("Failed to register reversals_total")
});

/// Approval transitions by action.
pub static APPROVAL_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_approval_transitions_total",
        "Total number of approval state transitions",
        &["action"]
    )
    .expect("Failed to register approval_transitions_total")
});

/// Running-balance recomputation runs by outcome.
pub static REBALANCE_RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_rebalance_runs_total",
        "Total number of running-balance recomputation runs",
        &["status"]
    )
    .expect("Failed to register rebalance_runs_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Store operation duration histogram.
pub static STORE_OP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "ledger_store_op_duration_seconds",
        "Store operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register store_op_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&POSTINGS_TOTAL);
    Lazy::force(&REVERSALS_TOTAL);
    Lazy::force(&APPROVAL_TRANSITIONS_TOTAL);
    Lazy::force(&REBALANCE_RUNS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&STORE_OP_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
