//! Prometheus metrics for likes, counters, and supervised transactions

use crate::error::EngagementResult;
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

/// Like/unlike outcomes by target kind
static LEDGER_OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "engagement_ledger_operations_total",
        "Like and unlike requests by target kind and outcome",
        &["target", "operation", "outcome"]
    )
    .expect("failed to register engagement_ledger_operations_total")
});

/// Transaction attempts started by the consistency supervisor
static TX_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "engagement_tx_attempts_total",
        "Transaction attempts per logical operation",
        &["operation"]
    )
    .expect("failed to register engagement_tx_attempts_total")
});

/// Operations abandoned after repeated write conflicts
static TX_CONFLICTS_EXHAUSTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "engagement_tx_conflicts_exhausted_total",
        "Operations that ran out of conflict retries",
        &["operation"]
    )
    .expect("failed to register engagement_tx_conflicts_exhausted_total")
});

/// Decrements that would have driven a counter negative
static COUNTER_CLAMPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "engagement_counter_clamps_total",
        "Counter updates floored at zero",
        &["counter"]
    )
    .expect("failed to register engagement_counter_clamps_total")
});

/// Record the outcome of a like or unlike
pub fn record_ledger_outcome<T>(target: &str, operation: &str, result: &EngagementResult<T>) {
    let outcome = match result {
        Ok(_) => "applied",
        Err(err) => err.label(),
    };

    LEDGER_OPERATIONS_TOTAL
        .with_label_values(&[target, operation, outcome])
        .inc();
}

pub fn record_tx_attempt(operation: &str) {
    TX_ATTEMPTS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn record_conflicts_exhausted(operation: &str) {
    TX_CONFLICTS_EXHAUSTED_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn record_counter_clamp(counter: &str) {
    COUNTER_CLAMPS_TOTAL.with_label_values(&[counter]).inc();
}
