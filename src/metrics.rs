// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics through the `metrics` facade for:
//! - Events produced and applied
//! - Per-slave apply failures and latency
//! - Queue depth and schema cache size
//! - Checkpoint writes
//! - Engine and worker state
//!
//! No recorder is installed here; the embedding process chooses one.
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replicator_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use binlog_replicator::metrics;
//! use std::time::Duration;
//!
//! // In the worker after an event lands on every slave
//! metrics::record_event_applied("insert", 3, Duration::from_millis(4));
//!
//! // In the checkpoint manager per slave
//! metrics::record_checkpoint_write("replica-a:3306", true);
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a change event handed to the queue.
pub fn record_event_produced(operation: &str) {
    counter!("replicator_events_produced_total", "op" => operation.to_string()).increment(1);
}

/// Record an event applied to every slave it had to reach.
pub fn record_event_applied(operation: &str, rows: usize, duration: Duration) {
    counter!("replicator_events_applied_total", "op" => operation.to_string()).increment(1);
    counter!("replicator_rows_applied_total", "op" => operation.to_string()).increment(rows as u64);
    histogram!("replicator_apply_duration_seconds", "op" => operation.to_string())
        .record(duration.as_secs_f64());
}

/// Record an event skipped because its database has no slaves.
pub fn record_event_unreplicated(database: &str) {
    counter!("replicator_events_unreplicated_total", "database" => database.to_string()).increment(1);
}

/// Record a failed attempt to apply an event to one slave.
pub fn record_apply_failure(slave: &str, reason: &str) {
    counter!(
        "replicator_apply_failures_total",
        "slave" => slave.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a retry of the in-flight event.
pub fn record_event_retry() {
    counter!("replicator_event_retries_total").increment(1);
}

/// Gauge for consecutive attempts on the current in-flight event.
pub fn set_inflight_attempts(attempts: u32) {
    gauge!("replicator_inflight_attempts").set(attempts as f64);
}

/// Gauge for events waiting in the hand-off queue.
pub fn set_queue_depth(depth: usize) {
    gauge!("replicator_queue_depth").set(depth as f64);
}

/// Gauge for cached table schemas.
pub fn set_schema_cache_size(size: usize) {
    gauge!("replicator_schema_cache_size").set(size as f64);
}

/// Record a checkpoint write to one slave.
pub fn record_checkpoint_write(slave: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "replicator_checkpoint_writes_total",
        "slave" => slave.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record a checkpoint cycle abandoned before any slave was written.
pub fn record_checkpoint_skipped(reason: &str) {
    counter!("replicator_checkpoint_skipped_total", "reason" => reason.to_string()).increment(1);
}

/// Gauge for the offset of the last recorded checkpoint.
pub fn set_checkpoint_position(position: u64) {
    gauge!("replicator_checkpoint_position").set(position as f64);
}

/// Gauge for total events processed this session.
pub fn set_processed_events(count: u64) {
    gauge!("replicator_processed_events").set(count as f64);
}

/// Gauge for engine state.
pub fn set_engine_state(state: &str) {
    let value = match state {
        "Created" => 0.0,
        "Connecting" => 1.0,
        "Running" => 2.0,
        "ShuttingDown" => 3.0,
        "Stopped" => 4.0,
        "Failed" => 5.0,
        _ => -1.0,
    };
    gauge!("replicator_engine_state").set(value);
}

/// Gauge for worker state.
pub fn set_worker_state(state: &str) {
    let value = match state {
        "Idle" => 0.0,
        "Draining" => 1.0,
        "Applying" => 2.0,
        "Checkpointing" => 3.0,
        "ShuttingDown" => 4.0,
        _ => -1.0,
    };
    gauge!("replicator_worker_state").set(value);
}
