//! Prometheus metrics for the invoicing engine.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, HistogramVec,
    IntCounter, TextEncoder,
};

/// Invoice counter by status.
pub static INVOICES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_invoices_total",
        "Total number of invoices by status",
        &["status"] // draft, proforma, sent, paid
    )
    .expect("Failed to register invoices_total")
});

/// Rejected payment attempts that would have broken the number sequence.
pub static SEQUENCE_CONFLICTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "invoicing_sequence_conflicts_total",
        "Total number of payment attempts rejected by the chronology check"
    )
    .expect("Failed to register sequence_conflicts_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "invoicing_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&INVOICES_TOTAL);
    Lazy::force(&SEQUENCE_CONFLICTS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
