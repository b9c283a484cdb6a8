// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Event producer: binlog events in, queued change events out.
//!
//! The producer is the [`EventSink`] the binlog source writes into. For each
//! event, in order:
//!
//! 1. **Table map**: resolve the table through the master on first sight
//!    and cache its schema. Failure is fatal.
//! 2. **Row event**: normalize into a [`ChangeEvent`] and `put` it on the
//!    queue, waiting as long as the queue is full.
//! 3. **Anything else**: dropped.
//!
//! A row event for a table id without a cached schema is fatal as well: the
//! worker must never dequeue an event it cannot build a statement for.

use crate::config::ConnectionDescriptor;
use crate::database::{BoxFuture, Database};
use crate::error::{ReplicationError, Result};
use crate::event::{BinlogEvent, ChangeEvent};
use crate::metrics;
use crate::queue::QueueSender;
use crate::schema::SchemaCache;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Receives binlog events from a [`BinlogSource`](crate::source::BinlogSource).
///
/// Returning an error tells the source to stop.
pub trait EventSink: Send + Sync {
    fn send(&self, event: BinlogEvent) -> BoxFuture<'_, ()>;
}

/// Normalizes binlog events and feeds the worker queue.
pub struct Producer<D: Database> {
    db: Arc<D>,
    master: ConnectionDescriptor,
    schemas: Arc<SchemaCache>,
    queue: QueueSender,
}

impl<D: Database> Producer<D> {
    pub fn new(
        db: Arc<D>,
        master: ConnectionDescriptor,
        schemas: Arc<SchemaCache>,
        queue: QueueSender,
    ) -> Self {
        Self {
            db,
            master,
            schemas,
            queue,
        }
    }

    /// Handle one event. Errors are fatal.
    pub async fn handle(&self, event: BinlogEvent) -> Result<()> {
        match event {
            BinlogEvent::TableMap {
                table_id,
                database,
                table,
            } => {
                if self.schemas.contains(table_id) {
                    return Ok(());
                }
                self.schemas
                    .populate(self.db.as_ref(), &self.master, table_id, &database, &table)
                    .await
                    .map_err(|e| {
                        error!(table_id, database = %database, table = %table, error = %e, "Schema resolution failed");
                        e
                    })?;
                Ok(())
            }
            BinlogEvent::Other { kind } => {
                trace!(kind = %kind, "Ignoring binlog event");
                Ok(())
            }
            row_event => {
                let Some(change) = ChangeEvent::from_binlog(row_event) else {
                    return Ok(());
                };
                self.enqueue(change).await
            }
        }
    }

    async fn enqueue(&self, change: ChangeEvent) -> Result<()> {
        if !self.schemas.contains(change.table_id) {
            error!(table_id = change.table_id, "Row event for unmapped table");
            return Err(ReplicationError::UnknownTable(change.table_id));
        }

        debug!(
            op = %change.operation,
            table_id = change.table_id,
            rows = change.rows.len(),
            offset = ?change.source_log_offset,
            "Queueing change event"
        );
        let operation = change.operation;
        self.queue.put(change).await?;
        metrics::record_event_produced(operation.as_str());
        Ok(())
    }
}

impl<D: Database> EventSink for Producer<D> {
    fn send(&self, event: BinlogEvent) -> BoxFuture<'_, ()> {
        Box::pin(self.handle(event))
    }
}
