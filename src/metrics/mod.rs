//! Prometheus metrics for the reminder engine.
//!
//! - Dispatch metrics (attempted, sent, failed, exhausted, per channel)
//! - Rate limiting rejections
//! - Run metrics (duration, skipped runs)

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "reminder";

lazy_static! {
    /// Total dispatch attempts, by channel
    pub static ref DISPATCH_ATTEMPTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatch_attempted_total", METRIC_PREFIX),
        "Total reminder dispatch attempts",
        &["channel"]
    ).unwrap();

    /// Successful sends, by channel
    pub static ref DISPATCH_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatch_sent_total", METRIC_PREFIX),
        "Total reminders handed to a transport successfully",
        &["channel"]
    ).unwrap();

    /// Transient failures scheduled for retry, by channel
    pub static ref DISPATCH_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatch_failed_total", METRIC_PREFIX),
        "Total transient dispatch failures",
        &["channel"]
    ).unwrap();

    /// Keys that gave up (max attempts or permanent failure), by channel
    pub static ref DISPATCH_EXHAUSTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatch_exhausted_total", METRIC_PREFIX),
        "Total delivery keys exhausted",
        &["channel"]
    ).unwrap();

    /// Sends refused by the per-channel hourly cap
    pub static ref RATE_LIMITED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_rate_limited_total", METRIC_PREFIX),
        "Total sends refused by the hourly channel cap",
        &["channel"]
    ).unwrap();

    /// Push endpoints revoked after permanent transport failure
    pub static ref ENDPOINTS_REVOKED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_endpoints_revoked_total", METRIC_PREFIX),
        "Push endpoints removed after permanent failure"
    ).unwrap();

    /// Orchestrator runs skipped because the run lock was held
    pub static ref RUNS_SKIPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_runs_skipped_total", METRIC_PREFIX),
        "Runs skipped because another run held the lock"
    ).unwrap();

    /// Run duration
    pub static ref RUN_DURATION_SECONDS: Histogram = register_histogram!(
        format!("{}_run_duration_seconds", METRIC_PREFIX),
        "Orchestrator run duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 120.0, 240.0]
    ).unwrap();
}

/// Helper for recording dispatch outcomes.
pub struct DispatchMetrics;

impl DispatchMetrics {
    pub fn record_attempted(channel: &str) {
        DISPATCH_ATTEMPTED_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn record_sent(channel: &str) {
        DISPATCH_SENT_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn record_failed(channel: &str) {
        DISPATCH_FAILED_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn record_exhausted(channel: &str) {
        DISPATCH_EXHAUSTED_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn record_rate_limited(channel: &str) {
        RATE_LIMITED_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn record_endpoint_revoked() {
        ENDPOINTS_REVOKED_TOTAL.inc();
    }
}

/// Helper for recording run-level metrics.
pub struct RunMetrics;

impl RunMetrics {
    pub fn record_skipped() {
        RUNS_SKIPPED_TOTAL.inc();
    }

    pub fn record_duration_secs(secs: f64) {
        RUN_DURATION_SECONDS.observe(secs);
    }
}
