// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Binlog Replicator
//!
//! Change-data-capture from one MySQL master to any number of slaves,
//! grouped by source database, by tailing the master's binlog.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                           binlog-replicator                               │
//! │                                                                           │
//! │  ┌──────────────┐    ┌──────────────┐    ┌─────────┐    ┌──────────────┐  │
//! │  │ BinlogSource │───►│   Producer   │───►│  queue  │───►│    Worker    │──┼──► slaves
//! │  │ (external)   │    │ (normalize)  │    │ (FIFO)  │    │ (apply/retry)│  │
//! │  └──────────────┘    └──────────────┘    └─────────┘    └──────────────┘  │
//! │                             │                                  │          │
//! │                             ▼                                  ▼          │
//! │                      ┌─────────────┐                  ┌────────────────┐  │
//! │                      │ SchemaCache │                  │ CheckpointMgr  │──┼──► slaves
//! │                      │ (DESCRIBE)  │                  │ (every Nth)    │  │
//! │                      └─────────────┘                  └────────────────┘  │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Ordering**: events reach every slave in binlog order. A failing event
//!   blocks everything behind it until it succeeds.
//! - **At-least-once**: after a restart, replay starts at the least advanced
//!   slave's checkpoint. Upserts and deletes make replay harmless.
//! - **Backpressure**: a full queue stalls the binlog source.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use binlog_replicator::{ChannelSource, MySqlDatabase, ReplicationEngine, ReplicatorConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> binlog_replicator::Result<()> {
//!     let config = ReplicatorConfig::from_file("replicator.json")?;
//!
//!     // A binlog client writes events into `events`.
//!     let (source, _events) = ChannelSource::new(1024);
//!
//!     let mut engine = ReplicationEngine::new(config, Arc::new(MySqlDatabase::new()), Arc::new(source))?;
//!     engine.start().await?;
//!
//!     // Engine runs until shutdown signal
//!     tokio::signal::ctrl_c().await.ok();
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod error;
pub mod event;
pub mod metrics;
pub mod mysql;
pub mod producer;
pub mod queue;
pub mod registry;
pub mod schema;
pub mod source;
pub mod statement;

// Re-exports for convenience
pub use checkpoint::{CheckpointManager, LogPosition, BINLOG_START_POSITION};
pub use config::{CheckpointTableConfig, ConnectionDescriptor, ReplicationSettings, ReplicatorConfig};
pub use coordinator::{EngineState, ReplicationEngine, WorkerState};
pub use database::{BoxFuture, Database, SqlValue};
pub use error::{ReplicationError, Result};
pub use event::{BinlogEvent, ChangeEvent, ColumnValue, Operation, Row, RowImage};
pub use mysql::MySqlDatabase;
pub use producer::{EventSink, Producer};
pub use registry::DestinationRegistry;
pub use schema::{ColumnSpec, SchemaCache, SemanticType, TableSchema};
pub use source::{BinlogSource, ChannelSource};
