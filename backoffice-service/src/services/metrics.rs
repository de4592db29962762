//! Prometheus metrics for backoffice-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "backoffice_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Workflow saves by resulting status and audit action.
pub static WORKFLOW_TRANSITIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "backoffice_workflow_transitions_total",
        "Expense records saved, by resulting status",
        &["status", "action"]
    )
    .expect("Failed to register workflow_transitions")
});

/// Document numbers allocated, by counter prefix.
pub static DOCUMENTS_ISSUED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "backoffice_documents_issued_total",
        "Document numbers allocated",
        &["prefix"]
    )
    .expect("Failed to register documents_issued")
});

/// Balance mirror writes: upsert or removal per origin.
pub static BALANCE_SYNC: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "backoffice_balance_sync_total",
        "Balance mirror synchronisations",
        &["origin", "outcome"]
    )
    .expect("Failed to register balance_sync")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "backoffice_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&WORKFLOW_TRANSITIONS);
    Lazy::force(&DOCUMENTS_ISSUED);
    Lazy::force(&BALANCE_SYNC);
    Lazy::force(&ERRORS_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
