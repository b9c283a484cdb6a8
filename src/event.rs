// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Binlog events in, change events out.
//!
//! [`BinlogEvent`] is what the external binlog client hands us, one at a
//! time, in emission order. [`ChangeEvent`] is the uniform shape the producer
//! normalizes row events into before queueing them for the worker.
//!
//! # Normalization
//!
//! | Binlog event | Change event |
//! |--------------|--------------|
//! | `WriteRows` | `Insert` with the written rows |
//! | `UpdateRows` | `Insert` with the *after* images only |
//! | `DeleteRows` | `Delete` with the deleted rows |
//! | `TableMap`, `Other` | none |
//!
//! Updates become upserts. The before image is dropped, so an update that
//! changes a key column leaves the old row behind on slaves.

/// A raw column value as decoded by the binlog client.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Int(i64),
    Float(f64),
    /// Fixed-point values arrive as their decimal text.
    Decimal(String),
    Bytes(Vec<u8>),
}

impl From<i64> for ColumnValue {
    fn from(v: i64) -> Self {
        ColumnValue::Int(v)
    }
}

impl From<f64> for ColumnValue {
    fn from(v: f64) -> Self {
        ColumnValue::Float(v)
    }
}

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        ColumnValue::Bytes(v.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for ColumnValue {
    fn from(v: Vec<u8>) -> Self {
        ColumnValue::Bytes(v)
    }
}

/// One row image, positionally aligned with the table's columns.
pub type Row = Vec<ColumnValue>;

/// Before and after images of an updated row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowImage {
    pub before: Row,
    pub after: Row,
}

/// An event delivered by the binlog client.
///
/// `next_position` is the log offset immediately after the event, when the
/// client reports it.
#[derive(Debug, Clone, PartialEq)]
pub enum BinlogEvent {
    /// Binds a table id to a database and table for this log session.
    TableMap {
        table_id: u64,
        database: String,
        table: String,
    },
    WriteRows {
        table_id: u64,
        next_position: Option<u64>,
        rows: Vec<Row>,
    },
    UpdateRows {
        table_id: u64,
        next_position: Option<u64>,
        rows: Vec<RowImage>,
    },
    DeleteRows {
        table_id: u64,
        next_position: Option<u64>,
        rows: Vec<Row>,
    },
    /// Anything else (rotate, query, xid, heartbeat...). Ignored.
    Other { kind: String },
}

impl BinlogEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &str {
        match self {
            BinlogEvent::TableMap { .. } => "table_map",
            BinlogEvent::WriteRows { .. } => "write_rows",
            BinlogEvent::UpdateRows { .. } => "update_rows",
            BinlogEvent::DeleteRows { .. } => "delete_rows",
            BinlogEvent::Other { kind } => kind,
        }
    }
}

/// Operation to perform on slaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Delete => "delete",
        }
    }

    /// Whether a single row's affected-row count is acceptable.
    ///
    /// An insert must touch the row. A delete may find it already gone.
    pub fn accepts_affected(&self, affected: u64) -> bool {
        match self {
            Operation::Insert => affected >= 1,
            Operation::Delete => affected <= 1,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized row change, consumed exactly once by the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub operation: Operation,
    pub table_id: u64,
    /// Log offset just past the source event, used for checkpoints.
    pub source_log_offset: Option<u64>,
    pub rows: Vec<Row>,
}

impl ChangeEvent {
    /// Normalize a binlog event. Returns `None` for non-row events.
    pub fn from_binlog(event: BinlogEvent) -> Option<Self> {
        match event {
            BinlogEvent::WriteRows {
                table_id,
                next_position,
                rows,
            } => Some(Self {
                operation: Operation::Insert,
                table_id,
                source_log_offset: next_position,
                rows,
            }),
            BinlogEvent::UpdateRows {
                table_id,
                next_position,
                rows,
            } => Some(Self {
                operation: Operation::Insert,
                table_id,
                source_log_offset: next_position,
                rows: rows.into_iter().map(|image| image.after).collect(),
            }),
            BinlogEvent::DeleteRows {
                table_id,
                next_position,
                rows,
            } => Some(Self {
                operation: Operation::Delete,
                table_id,
                source_log_offset: next_position,
                rows,
            }),
            BinlogEvent::TableMap { .. } | BinlogEvent::Other { .. } => None,
        }
    }
}
