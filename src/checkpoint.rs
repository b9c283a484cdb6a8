// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Checkpoint persistence and start-position recovery.
//!
//! Every slave keeps a small table with one row per master:
//!
//! ```text
//! `mysql`.`rpl_checkpoint`
//! ┌───────────┬──────────────────┬────────────┐
//! │ master_id │ binlog_file      │ binlog_pos │
//! ├───────────┼──────────────────┼────────────┤
//! │ 1         │ mysql-bin.000042 │ 190233     │
//! └───────────┴──────────────────┴────────────┘
//! ```
//!
//! ## Checkpoint Semantics
//!
//! A checkpoint is the end offset of an event that was applied everywhere it
//! had to go. On restart we resume from the least advanced slave, so events
//! after the checkpoint may be replayed (upserts and deletes are idempotent).
//!
//! ```text
//! apply event 50 → checkpoint offset of 50
//!                  (crash before this = replay from the previous checkpoint)
//! ```
//!
//! ## Failure Handling
//!
//! Writes are best effort. A slave that misses a checkpoint only widens its
//! replay window. On startup, a slave whose checkpoint cannot be read counts
//! as having none, which forces a cold start from the oldest retained log.

use crate::config::{CheckpointTableConfig, ConnectionDescriptor};
use crate::database::{Database, SqlValue};
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::registry::DestinationRegistry;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// First event offset in a MySQL binlog file (after the 4-byte magic).
pub const BINLOG_START_POSITION: u64 = 4;

/// A position in the master's binlog.
///
/// Ordered by file stem and ordinal (the numeric suffix after the last
/// `.`), then by offset. `bin.10` sorts after `bin.9`. Names without a
/// numeric suffix sort ahead of numbered ones, by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogPosition {
    pub file: String,
    pub position: u64,
}

impl LogPosition {
    pub fn new(file: impl Into<String>, position: u64) -> Self {
        Self {
            file: file.into(),
            position,
        }
    }

    /// Position of the first event in `file`.
    pub fn start_of(file: impl Into<String>) -> Self {
        Self::new(file, BINLOG_START_POSITION)
    }

    pub fn file_ordinal(&self) -> Option<u64> {
        file_ordinal(&self.file)
    }

    /// Sort key for the file part. Names without a numeric suffix sort
    /// before numbered ones; numbered names group by stem, then ordinal.
    /// The full name breaks ties between spellings of the same ordinal.
    fn file_key(&self) -> (bool, &str, u64, &str) {
        match (self.file.rsplit_once('.'), self.file_ordinal()) {
            (Some((stem, _)), Some(ordinal)) => (true, stem, ordinal, self.file.as_str()),
            _ => (false, self.file.as_str(), 0, self.file.as_str()),
        }
    }
}

/// Numeric suffix of a binlog file name, if it has one.
pub fn file_ordinal(file: &str) -> Option<u64> {
    let (_, suffix) = file.rsplit_once('.')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

impl Ord for LogPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file_key()
            .cmp(&other.file_key())
            .then_with(|| self.position.cmp(&other.position))
    }
}

impl PartialOrd for LogPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for LogPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.position)
    }
}

/// Reads and writes checkpoints on every slave.
pub struct CheckpointManager<D: Database> {
    db: Arc<D>,
    master: ConnectionDescriptor,
    /// Distinct slaves across all databases, in registration order.
    slaves: Vec<ConnectionDescriptor>,
    table: CheckpointTableConfig,
}

impl<D: Database> CheckpointManager<D> {
    pub fn new(
        db: Arc<D>,
        master: ConnectionDescriptor,
        registry: &DestinationRegistry,
        table: CheckpointTableConfig,
    ) -> Self {
        Self {
            db,
            master,
            slaves: registry.all_slaves().into_iter().cloned().collect(),
            table,
        }
    }

    pub fn master_id(&self) -> u32 {
        self.master.server_id
    }

    pub fn slaves(&self) -> &[ConnectionDescriptor] {
        &self.slaves
    }

    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (`master_id` INT(32), `binlog_file` VARCHAR(63), \
             `binlog_pos` BIGINT, PRIMARY KEY(`master_id`))",
            self.table.qualified_name()
        )
    }

    pub fn select_sql(&self) -> String {
        format!(
            "SELECT `binlog_file`, `binlog_pos` FROM {} WHERE `master_id` = ?",
            self.table.qualified_name()
        )
    }

    pub fn upsert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (`master_id`, `binlog_file`, `binlog_pos`) VALUES (?, ?, ?) \
             ON DUPLICATE KEY UPDATE `binlog_file` = VALUES(`binlog_file`), `binlog_pos` = VALUES(`binlog_pos`)",
            self.table.qualified_name()
        )
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Startup
    // ═══════════════════════════════════════════════════════════════════════

    /// Decide where to start reading the master's binlog.
    ///
    /// Creates the checkpoint table on each slave, then reads each slave's
    /// checkpoint for this master. If all slaves have one, the earliest wins.
    /// Otherwise replay starts at the master's oldest retained log file.
    ///
    /// Only a failure to ask the master for its oldest log is an error.
    pub async fn resolve_start_position(&self) -> Result<LogPosition> {
        let mut checkpoints = Vec::with_capacity(self.slaves.len());
        let mut missing = 0usize;

        for slave in &self.slaves {
            self.ensure_table(slave).await;

            match self.read_checkpoint(slave).await {
                Ok(Some(position)) => {
                    debug!(slave = %slave, position = %position, "Found checkpoint");
                    checkpoints.push(position);
                }
                Ok(None) => {
                    info!(slave = %slave, master_id = self.master_id(), "No checkpoint on slave");
                    missing += 1;
                }
                Err(e) => {
                    warn!(slave = %slave, error = %e, "Cannot read checkpoint, treating as absent");
                    missing += 1;
                }
            }
        }

        if missing == 0 {
            if let Some(earliest) = checkpoints.into_iter().min() {
                info!(position = %earliest, "Resuming from earliest slave checkpoint");
                return Ok(earliest);
            }
        }

        let oldest = self.master_oldest_file().await?;
        let start = LogPosition::start_of(oldest);
        info!(
            position = %start,
            slaves_without_checkpoint = missing,
            "Cold start from oldest retained binlog"
        );
        Ok(start)
    }

    /// Create the checkpoint table if absent. Failures are logged.
    pub async fn ensure_table(&self, slave: &ConnectionDescriptor) {
        if let Err(e) = self.db.execute(slave, &self.create_table_sql(), Vec::new()).await {
            warn!(slave = %slave, error = %e, "Cannot create checkpoint table");
        }
    }

    /// Read one slave's checkpoint for this master.
    pub async fn read_checkpoint(&self, slave: &ConnectionDescriptor) -> Result<Option<LogPosition>> {
        let params = [SqlValue::Int(i64::from(self.master_id()))];
        let rows = self.db.query(slave, &self.select_sql(), &params).await?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let file = row.first().and_then(SqlValue::as_text);
        let position = row.get(1).and_then(SqlValue::as_u64);
        match (file, position) {
            (Some(file), Some(position)) => Ok(Some(LogPosition::new(file, position))),
            _ => Err(ReplicationError::database_msg(
                slave.endpoint(),
                "read_checkpoint",
                "malformed checkpoint row",
            )),
        }
    }

    async fn master_oldest_file(&self) -> Result<String> {
        self.master_first_cell("SHOW BINARY LOGS", "show_binary_logs").await
    }

    async fn master_current_file(&self) -> Result<String> {
        self.master_first_cell("SHOW MASTER STATUS", "show_master_status").await
    }

    async fn master_first_cell(&self, sql: &str, operation: &str) -> Result<String> {
        let rows = self.db.query(&self.master, sql, &[]).await?;
        rows.first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_text)
            .ok_or_else(|| {
                ReplicationError::database_msg(
                    self.master.endpoint(),
                    operation,
                    "no binlog file reported (is binary logging enabled?)",
                )
            })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Steady state
    // ═══════════════════════════════════════════════════════════════════════

    /// Write a checkpoint at `offset` in the master's current log file to
    /// every slave.
    ///
    /// Returns how many slaves were written. Never fails.
    pub async fn record_checkpoint(&self, offset: Option<u64>) -> usize {
        let Some(offset) = offset else {
            warn!("Event carried no log offset, skipping checkpoint");
            metrics::record_checkpoint_skipped("no_offset");
            return 0;
        };

        let file = match self.master_current_file().await {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "Cannot read master status, skipping checkpoint");
                metrics::record_checkpoint_skipped("master_status");
                return 0;
            }
        };

        let position = LogPosition::new(file, offset);
        let sql = self.upsert_sql();
        let mut written = 0;

        for slave in &self.slaves {
            let params = vec![
                SqlValue::Int(i64::from(self.master_id())),
                SqlValue::Text(position.file.clone()),
                SqlValue::UInt(position.position),
            ];
            match self.db.execute(slave, &sql, params).await {
                Ok(_) => {
                    written += 1;
                    metrics::record_checkpoint_write(&slave.endpoint(), true);
                }
                Err(e) => {
                    warn!(slave = %slave, position = %position, error = %e, "Checkpoint write failed");
                    metrics::record_checkpoint_write(&slave.endpoint(), false);
                }
            }
        }

        if written > 0 {
            metrics::set_checkpoint_position(position.position);
        }
        info!(position = %position, written, total = self.slaves.len(), "Checkpoint recorded");
        written
    }
}
