use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

lazy_static! {
    pub static ref STATEMENT_DURATION: HistogramVec = register_histogram_vec!(
        "cql_statement_duration_seconds",
        "CQL statement execution duration in seconds",
        &["kind", "status"]
    )
    .unwrap();
    pub static ref STATEMENT_COUNTER: IntCounterVec = register_int_counter_vec!(
        "cql_statements_total",
        "Total number of executed CQL statements",
        &["kind", "status"]
    )
    .unwrap();
    pub static ref LWT_CONFLICTS: IntCounterVec = register_int_counter_vec!(
        "cql_lwt_conflicts_total",
        "Conditional statements that did not apply",
        &["operation"]
    )
    .unwrap();
}

pub fn record_statement(kind: &str, success: bool, duration: f64) {
    let status = if success { "success" } else { "failure" };
    STATEMENT_DURATION
        .with_label_values(&[kind, status])
        .observe(duration);
    STATEMENT_COUNTER.with_label_values(&[kind, status]).inc();
}

pub fn record_lwt_conflict(operation: &str) {
    LWT_CONFLICTS.with_label_values(&[operation]).inc();
}
