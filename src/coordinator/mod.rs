// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication engine coordinator.
//!
//! The session object that ties together:
//! - The binlog source, via [`crate::source::BinlogSource`]
//! - The producer and its schema cache, via [`crate::producer::Producer`]
//! - The bounded hand-off queue, via [`crate::queue`]
//! - The replication worker, via [`ReplicationWorker`]
//! - Checkpoint recovery, via [`crate::checkpoint::CheckpointManager`]
//!
//! # Architecture
//!
//! ```text
//!  BinlogSource ──send──→ Producer ──put──→ queue ──take──→ ReplicationWorker ──→ slaves
//!     (task)                 │                                    (task)      ──→ checkpoints
//!                            └──DESCRIBE──→ master
//! ```
//!
//! Everything shared between the two tasks (schema cache, registry,
//! processed counter) is created here and handed down by `Arc`. Nothing is
//! global; dropping the engine drops the session.
//!
//! # Lifecycle
//!
//! 1. `start()` resolves the start position from slave checkpoints
//! 2. Spawns the worker, then the source feeding the producer
//! 3. `shutdown()` stops the source (bounded wait) and joins the worker
//!    once it has drained the queue

mod types;
mod worker;

pub use types::{EngineState, WorkerState};
pub use worker::{should_checkpoint, InFlight, Outcome, ReplicationWorker, Transition};

use crate::checkpoint::{CheckpointManager, LogPosition};
use crate::config::ReplicatorConfig;
use crate::database::Database;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::producer::{EventSink, Producer};
use crate::queue;
use crate::registry::DestinationRegistry;
use crate::schema::SchemaCache;
use crate::source::BinlogSource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// The replication engine.
///
/// Generic over the database driver and the binlog source so both can be
/// swapped in tests.
pub struct ReplicationEngine<D: Database, S: BinlogSource> {
    config: ReplicatorConfig,

    /// Which slaves receive which database
    registry: Arc<DestinationRegistry>,

    db: Arc<D>,
    source: Arc<S>,

    /// Table id → schema, filled by the producer, read by the worker
    schemas: Arc<SchemaCache>,

    checkpoints: Arc<CheckpointManager<D>>,

    /// Events applied this session
    processed: Arc<AtomicU64>,

    /// Engine state (broadcast to watchers). Shared with the source task,
    /// which flips it to `Failed`.
    state_tx: Arc<watch::Sender<EngineState>>,
    state_rx: watch::Receiver<EngineState>,

    /// Worker state; the sender moves into the worker on start
    worker_state_tx: Option<watch::Sender<WorkerState>>,
    worker_state_rx: watch::Receiver<WorkerState>,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    start_position: Option<LogPosition>,

    /// Parsed `source_stop_timeout`
    source_stop_timeout: Duration,

    source_handle: Option<JoinHandle<Result<()>>>,
    worker_handle: Option<JoinHandle<()>>,
}

impl<D: Database, S: BinlogSource> ReplicationEngine<D, S> {
    /// Create an engine in the `Created` state.
    ///
    /// Fails if the configuration references unknown slaves or carries an
    /// unparseable stop timeout.
    pub fn new(config: ReplicatorConfig, db: Arc<D>, source: Arc<S>) -> Result<Self> {
        let source_stop_timeout = config.settings.source_stop_timeout_duration()?;
        let registry = Arc::new(config.destination_registry()?);
        let schemas = Arc::new(SchemaCache::with_key_columns(&config.key_columns));
        let checkpoints = Arc::new(CheckpointManager::new(
            Arc::clone(&db),
            config.master.clone(),
            &registry,
            config.settings.checkpoint_table.clone(),
        ));

        let (state_tx, state_rx) = watch::channel(EngineState::Created);
        let (worker_state_tx, worker_state_rx) = watch::channel(WorkerState::Idle);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            registry,
            db,
            source,
            schemas,
            checkpoints,
            processed: Arc::new(AtomicU64::new(0)),
            state_tx: Arc::new(state_tx),
            state_rx,
            worker_state_tx: Some(worker_state_tx),
            worker_state_rx,
            shutdown_tx,
            shutdown_rx,
            start_position: None,
            source_stop_timeout,
            source_handle: None,
            worker_handle: None,
        })
    }

    /// Get current engine state.
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    /// Check if engine is running.
    pub fn is_running(&self) -> bool {
        matches!(self.state(), EngineState::Running)
    }

    pub fn worker_state(&self) -> WorkerState {
        *self.worker_state_rx.borrow()
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        &self.schemas
    }

    pub fn registry(&self) -> &Arc<DestinationRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ReplicatorConfig {
        &self.config
    }

    /// Events applied to all their slaves this session.
    pub fn processed_events(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// Where the source was started, once `start()` succeeded.
    pub fn start_position(&self) -> Option<&LogPosition> {
        self.start_position.as_ref()
    }

    fn set_state(&self, state: EngineState) {
        let _ = self.state_tx.send(state);
        metrics::set_engine_state(&state.to_string());
    }

    /// Start replicating.
    ///
    /// 1. Resolves the start position (creating checkpoint tables)
    /// 2. Spawns the replication worker
    /// 3. Spawns the binlog source, feeding the producer, and waits until
    ///    the source's `run` has been called
    pub async fn start(&mut self) -> Result<()> {
        if self.state() != EngineState::Created {
            return Err(ReplicationError::InvalidState {
                expected: "Created".to_string(),
                actual: self.state().to_string(),
            });
        }

        info!(
            master = %self.config.master,
            master_id = self.config.master.server_id,
            databases = self.registry.databases().count(),
            slaves = self.checkpoints.slaves().len(),
            "Starting replication engine"
        );
        self.set_state(EngineState::Connecting);

        let start = match self.checkpoints.resolve_start_position().await {
            Ok(start) => start,
            Err(e) => {
                error!(error = %e, "Cannot resolve start position");
                self.set_state(EngineState::Failed);
                return Err(e);
            }
        };

        let worker_state_tx = self
            .worker_state_tx
            .take()
            .ok_or_else(|| ReplicationError::Internal("worker already started".to_string()))?;

        let (queue_tx, queue_rx) = queue::bounded(self.config.settings.queue_capacity);

        let worker = ReplicationWorker::new(
            Arc::clone(&self.db),
            Arc::clone(&self.registry),
            Arc::clone(&self.schemas),
            Arc::clone(&self.checkpoints),
            self.config.settings.checkpoint_sample_period,
            Arc::clone(&self.processed),
            worker_state_tx,
        );
        self.worker_handle = Some(tokio::spawn(worker.run(queue_rx, self.shutdown_rx.clone())));
        debug!("Spawned replication worker");

        let sink: Arc<dyn EventSink> = Arc::new(Producer::new(
            Arc::clone(&self.db),
            self.config.master.clone(),
            Arc::clone(&self.schemas),
            queue_tx,
        ));
        self.source_handle = Some(self.spawn_source(start.clone(), sink).await);
        self.start_position = Some(start.clone());

        // A source that already failed keeps the engine in Failed
        let running = self.state_tx.send_if_modified(|state| {
            if *state == EngineState::Connecting {
                *state = EngineState::Running;
                true
            } else {
                false
            }
        });
        if running {
            metrics::set_engine_state("Running");
            info!(position = %start, "Replication engine running");
        } else {
            warn!(state = %self.state(), "Binlog source stopped during startup");
        }
        Ok(())
    }

    /// Spawn the binlog source task.
    ///
    /// Returns once the task has called `source.run`. When the source
    /// returns, the producer (and with it the queue sender) is dropped, so
    /// the worker drains and exits on its own.
    async fn spawn_source(&self, start: LogPosition, sink: Arc<dyn EventSink>) -> JoinHandle<Result<()>> {
        let source = Arc::clone(&self.source);
        let state_tx = Arc::clone(&self.state_tx);
        let shutdown_rx = self.shutdown_rx.clone();
        let span = info_span!("binlog_source", master = %self.config.master);
        let (started_tx, started_rx) = oneshot::channel();

        let handle = tokio::spawn(
            async move {
                let run = source.run(start, sink, shutdown_rx);
                if started_tx.send(()).is_err() {
                    debug!("Engine stopped waiting for the source to start");
                }
                let result = run.await;
                match &result {
                    Ok(()) => debug!("Binlog source finished"),
                    Err(e) => {
                        error!(error = %e, fatal = e.is_fatal(), "Binlog source failed, replication halted");
                        let failed = state_tx.send_if_modified(|state| {
                            if matches!(*state, EngineState::Connecting | EngineState::Running) {
                                *state = EngineState::Failed;
                                true
                            } else {
                                false
                            }
                        });
                        if failed {
                            metrics::set_engine_state("Failed");
                        }
                    }
                }
                result
            }
            .instrument(span),
        );

        if started_rx.await.is_err() {
            debug!("Binlog source task ended before calling run");
        }
        handle
    }

    /// Shut down gracefully. Idempotent.
    ///
    /// Shutdown sequence:
    /// 1. Raise the shutdown flag (once)
    /// 2. Wait for the source to stop, up to `source_stop_timeout`
    /// 3. Wait for the worker to finish the in-flight event and drain the queue
    ///
    /// Ends in `Stopped`, or stays `Failed` if the source had failed.
    pub async fn shutdown(&mut self) {
        let initial = self.state();
        if initial == EngineState::Stopped {
            return;
        }

        info!(state = %initial, "Shutting down replication engine");
        if initial != EngineState::Failed {
            self.set_state(EngineState::ShuttingDown);
        }

        let raised = self.shutdown_tx.send_if_modified(|flag| {
            let was = *flag;
            *flag = true;
            !was
        });
        if raised {
            debug!("Shutdown flag raised");
        }

        if let Some(mut handle) = self.source_handle.take() {
            let timeout = self.source_stop_timeout;
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(Ok(()))) => debug!("Binlog source stopped"),
                Ok(Ok(Err(e))) => debug!(error = %e, "Binlog source had already failed"),
                Ok(Err(e)) => warn!(error = %e, "Binlog source task panicked"),
                Err(_) => {
                    warn!(timeout = ?timeout, "Binlog source did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        if let Some(handle) = self.worker_handle.take() {
            info!("Waiting for replication worker to drain");
            if let Err(e) = handle.await {
                warn!(error = %e, "Replication worker panicked");
            }
        }

        if self.state() != EngineState::Failed {
            self.set_state(EngineState::Stopped);
        }
        info!(processed = self.processed_events(), "Replication engine stopped");
    }
}
