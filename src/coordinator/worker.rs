// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication worker: applies queued change events to slaves.
//!
//! A single task owns the queue's receiving end and an in-flight slot:
//!
//! 1. If the slot is empty, take the next event (FIFO).
//! 2. Apply it to every slave of its database, in registration order.
//! 3. On success, count it, maybe checkpoint, and empty the slot.
//! 4. On failure, keep it in the slot and go again. No backoff, no skipping.
//!
//! The next event is never looked at until the current one has landed on
//! every slave, which keeps per-table commit order on all of them at the
//! price of head-of-line blocking behind an unreachable slave.
//!
//! # Graceful Shutdown
//!
//! Once the shutdown flag is seen, the worker stops waiting for new events
//! but keeps going until both the in-flight slot and the queue are empty.
//! It also stops when every sender is gone and the queue is drained, which
//! is what happens after the binlog source exits.

use super::types::WorkerState;
use crate::checkpoint::CheckpointManager;
use crate::config::ConnectionDescriptor;
use crate::database::Database;
use crate::error::{ReplicationError, Result};
use crate::event::{ChangeEvent, Operation};
use crate::metrics;
use crate::queue::QueueReceiver;
use crate::registry::DestinationRegistry;
use crate::schema::SchemaCache;
use crate::statement::PreparedWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

/// Result of one apply attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Failed,
}

/// What the worker does next after settling the in-flight slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Nothing was in flight.
    Idle,
    /// The event succeeded and left the slot.
    Advance(ChangeEvent),
    /// The event failed and stays in the slot.
    Retry { attempts: u32 },
}

/// The in-flight slot: at most one event, retried until it succeeds.
#[derive(Debug, Default)]
pub struct InFlight {
    slot: Option<ChangeEvent>,
    attempts: u32,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    /// Put a freshly dequeued event in the slot.
    ///
    /// Only valid while empty; an occupied slot is left untouched and the
    /// offered event is handed back.
    pub fn load(&mut self, event: ChangeEvent) -> Option<ChangeEvent> {
        if self.slot.is_some() {
            return Some(event);
        }
        self.slot = Some(event);
        self.attempts = 0;
        None
    }

    pub fn event(&self) -> Option<&ChangeEvent> {
        self.slot.as_ref()
    }

    /// Failed attempts on the current event.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Apply the outcome of an attempt.
    pub fn settle(&mut self, outcome: Outcome) -> Transition {
        match (self.slot.take(), outcome) {
            (None, _) => Transition::Idle,
            (Some(event), Outcome::Applied) => {
                self.attempts = 0;
                Transition::Advance(event)
            }
            (Some(event), Outcome::Failed) => {
                self.slot = Some(event);
                self.attempts = self.attempts.saturating_add(1);
                Transition::Retry {
                    attempts: self.attempts,
                }
            }
        }
    }
}

/// Whether the `count`th applied event triggers a checkpoint.
///
/// A period of zero disables checkpoints.
pub fn should_checkpoint(count: u64, period: u64) -> bool {
    period > 0 && count > 0 && count % period == 0
}

/// Metric label for an apply failure.
fn failure_reason(error: &ReplicationError) -> &str {
    match error {
        ReplicationError::Database { operation, .. } => operation.as_str(),
        ReplicationError::Bind { .. } => "bind",
        ReplicationError::UnknownTable(_) => "unknown_table",
        _ => "other",
    }
}

/// Applies change events to slaves, one at a time.
pub struct ReplicationWorker<D: Database> {
    db: Arc<D>,
    registry: Arc<DestinationRegistry>,
    schemas: Arc<SchemaCache>,
    checkpoints: Arc<CheckpointManager<D>>,
    sample_period: u64,
    processed: Arc<AtomicU64>,
    state_tx: watch::Sender<WorkerState>,
}

impl<D: Database> ReplicationWorker<D> {
    pub fn new(
        db: Arc<D>,
        registry: Arc<DestinationRegistry>,
        schemas: Arc<SchemaCache>,
        checkpoints: Arc<CheckpointManager<D>>,
        sample_period: u64,
        processed: Arc<AtomicU64>,
        state_tx: watch::Sender<WorkerState>,
    ) -> Self {
        Self {
            db,
            registry,
            schemas,
            checkpoints,
            sample_period,
            processed,
            state_tx,
        }
    }

    fn set_state(&self, state: WorkerState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            metrics::set_worker_state(&state.to_string());
        }
    }

    /// Run until shut down and drained, or until the queue is closed and
    /// drained.
    pub async fn run(self, mut queue: QueueReceiver, mut shutdown: watch::Receiver<bool>) {
        let span = info_span!("replication_worker");

        async move {
            info!(sample_period = self.sample_period, "Starting replication worker");

            let mut in_flight = InFlight::new();
            let mut stopping = *shutdown.borrow();
            if stopping {
                self.set_state(WorkerState::ShuttingDown);
            }

            loop {
                if in_flight.is_empty() {
                    let next = if stopping {
                        queue.try_take()
                    } else {
                        tokio::select! {
                            biased;

                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    stopping = true;
                                    self.set_state(WorkerState::ShuttingDown);
                                    info!(queued = queue.len(), "Shutdown requested, draining queue");
                                }
                                continue;
                            }

                            event = queue.take() => event,
                        }
                    };

                    match next {
                        Some(event) => {
                            in_flight.load(event);
                        }
                        None => break,
                    }
                }

                self.set_state(WorkerState::Applying);
                let started = Instant::now();
                let result = match in_flight.event() {
                    Some(event) => self.apply(event).await,
                    None => continue,
                };

                let outcome = match &result {
                    Ok(()) => Outcome::Applied,
                    Err(_) => Outcome::Failed,
                };

                match in_flight.settle(outcome) {
                    Transition::Advance(event) => {
                        metrics::set_inflight_attempts(0);
                        self.on_applied(&event, started.elapsed()).await;
                        self.set_state(if stopping {
                            WorkerState::ShuttingDown
                        } else {
                            WorkerState::Idle
                        });
                    }
                    Transition::Retry { attempts } => {
                        if let Err(e) = &result {
                            // First failure, then every thousandth, to keep
                            // a dead slave from flooding the log.
                            if attempts == 1 || attempts % 1000 == 0 {
                                warn!(attempts, error = %e, "Event failed, retrying");
                            } else {
                                debug!(attempts, error = %e, "Event failed, retrying");
                            }
                        }
                        metrics::record_event_retry();
                        metrics::set_inflight_attempts(attempts);
                        self.set_state(WorkerState::Draining);
                        tokio::task::yield_now().await;
                    }
                    Transition::Idle => {}
                }
            }

            self.set_state(WorkerState::ShuttingDown);
            info!(
                processed = self.processed.load(Ordering::SeqCst),
                "Replication worker stopped"
            );
        }
        .instrument(span)
        .await
    }

    /// Apply one event to every slave of its database.
    ///
    /// Every slave is attempted even after one fails; the first error is
    /// returned.
    pub async fn apply(&self, event: &ChangeEvent) -> Result<()> {
        let schema = self
            .schemas
            .resolve(event.table_id)
            .ok_or(ReplicationError::UnknownTable(event.table_id))?;

        let slaves = self.registry.slaves_for(&schema.database);
        if slaves.is_empty() {
            debug!(table = %schema.qualified_name(), "Database not replicated, skipping");
            metrics::record_event_unreplicated(&schema.database);
            return Ok(());
        }
        if event.rows.is_empty() {
            return Ok(());
        }

        let write = PreparedWrite::for_event(&schema, event)?;
        let mut first_error = None;
        let mut failed = 0usize;

        for slave in slaves {
            if let Err(e) = self.apply_to_slave(slave, &write, event.operation).await {
                metrics::record_apply_failure(&slave.endpoint(), failure_reason(&e));
                debug!(slave = %slave, table = %schema.qualified_name(), error = %e, "Apply failed");
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => {
                debug!(failed, total = slaves.len(), "Event failed on some slaves");
                Err(e)
            }
        }
    }

    async fn apply_to_slave(
        &self,
        slave: &ConnectionDescriptor,
        write: &PreparedWrite,
        operation: Operation,
    ) -> Result<()> {
        let counts = self.db.execute_batch(slave, &write.sql, &write.param_sets).await?;

        if counts.len() != write.param_sets.len() {
            return Err(ReplicationError::database_msg(
                slave.endpoint(),
                "affected_rows",
                format!("{} results for {} rows", counts.len(), write.param_sets.len()),
            ));
        }
        if let Some((row, affected)) = counts
            .iter()
            .enumerate()
            .find(|(_, affected)| !operation.accepts_affected(**affected))
        {
            return Err(ReplicationError::database_msg(
                slave.endpoint(),
                "affected_rows",
                format!("{} of row {} affected {} rows", operation, row, affected),
            ));
        }
        Ok(())
    }

    async fn on_applied(&self, event: &ChangeEvent, elapsed: Duration) {
        let count = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_event_applied(event.operation.as_str(), event.rows.len(), elapsed);
        metrics::set_processed_events(count);
        debug!(
            op = %event.operation,
            table_id = event.table_id,
            rows = event.rows.len(),
            count,
            "Replicated event"
        );

        if should_checkpoint(count, self.sample_period) {
            self.set_state(WorkerState::Checkpointing);
            self.checkpoints.record_checkpoint(event.source_log_offset).await;
        }
    }
}
