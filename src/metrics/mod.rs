//! Prometheus metrics for the coordinator and workers
//!
//! This module provides metrics tracking for:
//! - Coordinator: commands served, positions merged, queue and batch sizes, round-trip median
//! - Worker: lines analyzed, failed sessions
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops. The
//! coordinator writes [`render`] output to a text file on every persist so a
//! node exporter textfile collector can pick it up.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all coordinator metrics
struct CoordinatorMetrics {
    commands: CounterVec,
    command_errors: Counter,
    positions_merged: Counter,
    variations_sent: Counter,
    queue_size: Gauge,
    var_to_send: Gauge,
    start_count: Gauge,
    round_trip_median: Gauge,
}

/// Container for all worker metrics
struct WorkerMetrics {
    lines_analyzed: CounterVec,
    session_failures: Counter,
    syncs: Counter,
}

/// Global storage for coordinator metrics
static COORDINATOR_METRICS: OnceLock<CoordinatorMetrics> = OnceLock::new();

/// Global storage for worker metrics
static WORKER_METRICS: OnceLock<WorkerMetrics> = OnceLock::new();

/// Outcome of the one-time registration
static METRICS_INIT: OnceLock<Result<(), String>> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup. Concurrent
/// and repeated calls wait for and return the first outcome. If metric
/// registration fails, subsequent metric operations become no-ops.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    METRICS_INIT
        .get_or_init(|| register_all().map_err(|e| e.to_string()))
        .clone()
        .map_err(prometheus::Error::Msg)
}

fn register_all() -> Result<(), prometheus::Error> {
    let coordinator = CoordinatorMetrics {
        commands: register_counter_vec!(
            "bookfleet_coordinator_commands_total",
            "Commands served by token",
            &["command"]
        )?,
        command_errors: register_counter!(
            "bookfleet_coordinator_command_errors_total",
            "Connections abandoned because of an error"
        )?,
        positions_merged: register_counter!(
            "bookfleet_coordinator_positions_merged_total",
            "Net positions added to the master book by worker syncs"
        )?,
        variations_sent: register_counter!(
            "bookfleet_coordinator_variations_sent_total",
            "Variations handed out to workers"
        )?,
        queue_size: register_gauge!(
            "bookfleet_coordinator_queue_size",
            "Variations waiting in the queue"
        )?,
        var_to_send: register_gauge!(
            "bookfleet_coordinator_var_to_send",
            "Current batch size"
        )?,
        start_count: register_gauge!(
            "bookfleet_coordinator_start_count",
            "Current start count"
        )?,
        round_trip_median: register_gauge!(
            "bookfleet_coordinator_round_trip_median_seconds",
            "Median of the recent round-trip window"
        )?,
    };

    let worker = WorkerMetrics {
        lines_analyzed: register_counter_vec!(
            "bookfleet_worker_lines_analyzed_total",
            "Lines analyzed by search mode",
            &["mode"]
        )?,
        session_failures: register_counter!(
            "bookfleet_worker_session_failures_total",
            "Exchanges abandoned before completion"
        )?,
        syncs: register_counter!(
            "bookfleet_worker_syncs_total",
            "Successful result uploads"
        )?,
    };

    COORDINATOR_METRICS.set(coordinator).ok();
    WORKER_METRICS.set(worker).ok();
    Ok(())
}

// ============================================================================
// Coordinator
// ============================================================================

pub fn record_command(command: &str) {
    if let Some(m) = COORDINATOR_METRICS.get() {
        m.commands.with_label_values(&[command]).inc();
    }
}

pub fn record_command_error() {
    if let Some(m) = COORDINATOR_METRICS.get() {
        m.command_errors.inc();
    }
}

pub fn record_positions_merged(delta: i64) {
    if let Some(m) = COORDINATOR_METRICS.get() {
        if delta > 0 {
            m.positions_merged.inc_by(delta as f64);
        }
    }
}

pub fn record_variations_sent(count: usize) {
    if let Some(m) = COORDINATOR_METRICS.get() {
        m.variations_sent.inc_by(count as f64);
    }
}

/// Update queue and batch-size gauges
pub fn update_queue(queue_size: usize, var_to_send: usize, start_count: usize) {
    if let Some(m) = COORDINATOR_METRICS.get() {
        m.queue_size.set(queue_size as f64);
        m.var_to_send.set(var_to_send as f64);
        m.start_count.set(start_count as f64);
    }
}

pub fn update_round_trip_median(seconds: f64) {
    if let Some(m) = COORDINATOR_METRICS.get() {
        m.round_trip_median.set(seconds);
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Count an analyzed line; `mode` is `solve` or `search`
pub fn record_line_analyzed(mode: &str) {
    if let Some(m) = WORKER_METRICS.get() {
        m.lines_analyzed.with_label_values(&[mode]).inc();
    }
}

pub fn record_session_failure() {
    if let Some(m) = WORKER_METRICS.get() {
        m.session_failures.inc();
    }
}

pub fn record_sync() {
    if let Some(m) = WORKER_METRICS.get() {
        m.syncs.inc();
    }
}

// ============================================================================
// Export
// ============================================================================

/// Render all registered metrics in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
