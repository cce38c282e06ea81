//! Prometheus metrics for the retention sweeper
//!
//! Tracks sweep cycles, deleted rows per table, and cycle duration

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::time::Duration;

/// Total number of sweep cycles run (success/error)
static SWEEP_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "retention_sweep_runs_total",
        "Total number of retention sweep cycles (success/error)",
        &["status"]
    )
    .expect("failed to register retention_sweep_runs_total")
});

static SWEEP_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "retention_sweep_duration_seconds",
        "Duration of retention sweep cycles",
        vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    )
    .expect("failed to register retention_sweep_duration_seconds")
});

/// Number of expired posts found in the last cycle
static SWEEP_CANDIDATES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "retention_sweep_candidates",
        "Number of expired posts found in the last sweep cycle"
    )
    .expect("failed to register retention_sweep_candidates")
});

/// Rows removed per table
static SWEEP_DELETED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "retention_sweep_deleted_total",
        "Rows removed by retention sweeps",
        &["table"]
    )
    .expect("failed to register retention_sweep_deleted_total")
});

static SWEEP_FAILED_POSTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "retention_sweep_failed_posts_total",
        "Expired posts whose cascade delete failed"
    )
    .expect("failed to register retention_sweep_failed_posts_total")
});

pub fn record_sweep_run(status: &str) {
    SWEEP_RUNS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_sweep_duration(duration: Duration) {
    SWEEP_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn set_sweep_candidates(count: usize) {
    SWEEP_CANDIDATES.set(count as i64);
}

pub fn record_rows_deleted(table: &str, count: u64) {
    SWEEP_DELETED_TOTAL
        .with_label_values(&[table])
        .inc_by(count);
}

pub fn record_failed_post() {
    SWEEP_FAILED_POSTS_TOTAL.inc();
}
