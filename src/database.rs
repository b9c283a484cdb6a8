// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Database access trait.
//!
//! The replicator never talks to a driver directly. Everything it sends to
//! the master or a slave goes through [`Database`], a black-box executor of
//! parameterized statements against a [`ConnectionDescriptor`].
//!
//! [`MySqlDatabase`](crate::mysql::MySqlDatabase) is the production
//! implementation; tests plug in an in-memory fake.
//!
//! # Connection Scope
//!
//! Implementations must open a connection per call and release it before the
//! returned future completes, on success and on error alike.
//!
//! # Example
//!
//! ```rust,no_run
//! use binlog_replicator::config::ConnectionDescriptor;
//! use binlog_replicator::database::{BoxFuture, Database, SqlValue};
//!
//! struct Recorder;
//!
//! impl Database for Recorder {
//!     fn query<'a>(
//!         &'a self,
//!         _endpoint: &'a ConnectionDescriptor,
//!         _sql: &'a str,
//!         _params: &'a [SqlValue],
//!     ) -> BoxFuture<'a, Vec<Vec<SqlValue>>> {
//!         Box::pin(async move { Ok(Vec::new()) })
//!     }
//!
//!     fn execute_batch<'a>(
//!         &'a self,
//!         _endpoint: &'a ConnectionDescriptor,
//!         _sql: &'a str,
//!         param_sets: &'a [Vec<SqlValue>],
//!     ) -> BoxFuture<'a, Vec<u64>> {
//!         Box::pin(async move { Ok(vec![1; param_sets.len()]) })
//!     }
//! }
//! ```

use crate::config::ConnectionDescriptor;
use crate::error::Result;
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A value bound to, or read from, a SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Read as text. Byte strings are decoded lossily, numbers are formatted.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Int(i) => Some(i.to_string()),
            SqlValue::UInt(u) => Some(u.to_string()),
            SqlValue::Double(d) => Some(d.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    /// Read as an unsigned integer. Text holding digits is parsed.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SqlValue::Int(i) => u64::try_from(*i).ok(),
            SqlValue::UInt(u) => Some(*u),
            SqlValue::Text(_) | SqlValue::Bytes(_) => self.as_text()?.trim().parse().ok(),
            SqlValue::Null | SqlValue::Double(_) => None,
        }
    }
}

/// Trait defining what the replicator needs from a database driver.
pub trait Database: Send + Sync + 'static {
    /// Run a statement that returns rows.
    fn query<'a>(
        &'a self,
        endpoint: &'a ConnectionDescriptor,
        sql: &'a str,
        params: &'a [SqlValue],
    ) -> BoxFuture<'a, Vec<Vec<SqlValue>>>;

    /// Execute one statement once per parameter set on a single connection.
    ///
    /// Returns the affected-row count of each execution, in order. The first
    /// failing execution aborts the batch.
    fn execute_batch<'a>(
        &'a self,
        endpoint: &'a ConnectionDescriptor,
        sql: &'a str,
        param_sets: &'a [Vec<SqlValue>],
    ) -> BoxFuture<'a, Vec<u64>>;

    /// Execute a single statement, returning its affected-row count.
    fn execute<'a>(
        &'a self,
        endpoint: &'a ConnectionDescriptor,
        sql: &'a str,
        params: Vec<SqlValue>,
    ) -> BoxFuture<'a, u64> {
        Box::pin(async move {
            let counts = self
                .execute_batch(endpoint, sql, std::slice::from_ref(&params))
                .await?;
            Ok(counts.first().copied().unwrap_or(0))
        })
    }
}
