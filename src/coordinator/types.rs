// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine and worker state types.
//!
//! # Engine State Transitions
//!
//! ```text
//!                  start()
//! Created ───────────────────→ Connecting
//!    │                              │
//!    │ shutdown()                   │ (start position resolved)
//!    ↓                              ↓
//! Stopped ←── ShuttingDown ←──── Running
//!                 shutdown()        │
//!                                   │ (fatal source error)
//!                                   ↓
//!                                Failed
//! ```
//!
//! - **Created**: after `ReplicationEngine::new()`. Nothing running.
//! - **Connecting**: `start()` called, checkpoint tables being read.
//! - **Running**: source feeding the producer, worker applying to slaves.
//! - **ShuttingDown**: source asked to stop, worker draining the queue.
//! - **Stopped**: shutdown complete.
//! - **Failed**: a fatal error stopped the source. Call `shutdown()` to
//!   drain what was already queued.
//!
//! # Worker States
//!
//! ```text
//! Idle ──take──→ Applying ──ok──→ Idle (or Checkpointing on the Nth event)
//!                  │   ↑
//!                  fail│retry (Draining: in-flight slot occupied)
//!                  ↓   │
//!                Draining
//! ```

/// State of the replication engine.
///
/// See module docs for the state transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Engine created but not started.
    ///
    /// Call [`start()`](super::ReplicationEngine::start) to begin replication.
    Created,

    /// Resolving the start position from slave checkpoints.
    Connecting,

    /// Running and replicating.
    Running,

    /// Shutting down gracefully.
    ///
    /// The worker finishes the in-flight event and drains the queue.
    ShuttingDown,

    /// Stopped.
    Stopped,

    /// Fatal error. Check logs for details.
    Failed,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Created => write!(f, "Created"),
            EngineState::Connecting => write!(f, "Connecting"),
            EngineState::Running => write!(f, "Running"),
            EngineState::ShuttingDown => write!(f, "ShuttingDown"),
            EngineState::Stopped => write!(f, "Stopped"),
            EngineState::Failed => write!(f, "Failed"),
        }
    }
}

/// State of the replication worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for the next event.
    Idle,
    /// Holding a failed event that will be retried before anything else.
    Draining,
    /// Writing the in-flight event to slaves.
    Applying,
    /// Writing a checkpoint after a sampled event.
    Checkpointing,
    /// Shutdown requested; finishing queued work.
    ShuttingDown,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "Idle"),
            WorkerState::Draining => write!(f, "Draining"),
            WorkerState::Applying => write!(f, "Applying"),
            WorkerState::Checkpointing => write!(f, "Checkpointing"),
            WorkerState::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}
