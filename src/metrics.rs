//! Prometheus metrics for compliance cycles
//!
//! Exposed by the HTTP server on `/metrics`.

use crate::archive::ArchiveStats;
use crate::model::TraceStatus;
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, register_histogram, Counter,
    CounterVec, Encoder, GaugeVec, Histogram, TextEncoder,
};

lazy_static! {
    /// Counter: completed compliance cycles by final status
    pub static ref CYCLES: CounterVec = register_counter_vec!(
        "charterguard_cycles_total",
        "Total compliance cycles by status",
        &["status"]
    )
    .expect("Failed to create cycles metric");

    /// Counter: requests blocked by a guard rule
    pub static ref GUARD_BLOCKS: CounterVec = register_counter_vec!(
        "charterguard_guard_blocks_total",
        "Requests blocked by the guard, by rule id",
        &["rule_id"]
    )
    .expect("Failed to create guard_blocks metric");

    /// Counter: reviser invocations
    pub static ref REVISION_ATTEMPTS: Counter = register_counter!(
        "charterguard_revision_attempts_total",
        "Total revision attempts"
    )
    .expect("Failed to create revision_attempts metric");

    /// Gauge: artifacts in the published archive snapshot
    pub static ref ARCHIVE_ARTIFACTS: GaugeVec = register_gauge_vec!(
        "charterguard_archive_rules",
        "Artifacts in the current archive snapshot, by kind",
        &["kind"]
    )
    .expect("Failed to create archive_rules metric");

    /// Histogram: wall time of a compliance cycle (seconds)
    pub static ref CYCLE_DURATION: Histogram = register_histogram!(
        "charterguard_cycle_duration_seconds",
        "Duration of compliance cycles",
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("Failed to create cycle_duration metric");
}

/// Record a finished compliance cycle
pub fn record_cycle(status: TraceStatus, duration_secs: f64) {
    CYCLES.with_label_values(&[status.as_str()]).inc();
    CYCLE_DURATION.observe(duration_secs);
}

/// Increment the guard block counter
pub fn record_guard_block(rule_id: &str) {
    GUARD_BLOCKS.with_label_values(&[rule_id]).inc();
}

pub fn record_revision_attempt() {
    REVISION_ATTEMPTS.inc();
}

/// Publish the artifact counts of a new snapshot
pub fn record_archive(stats: &ArchiveStats) {
    ARCHIVE_ARTIFACTS
        .with_label_values(&["rule"])
        .set(stats.rules as f64);
    ARCHIVE_ARTIFACTS
        .with_label_values(&["guard_rule"])
        .set(stats.guard_rules as f64);
    ARCHIVE_ARTIFACTS
        .with_label_values(&["reference"])
        .set(stats.references as f64);
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
