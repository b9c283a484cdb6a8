// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! MySQL implementation of [`Database`] on top of sqlx.
//!
//! # Connection Scope
//!
//! Every call opens a fresh `MySqlConnection` from the descriptor and closes
//! it before returning. If the work fails, the connection is still closed
//! (best effort) and the original error is returned.
//!
//! # Protocols
//!
//! Statements without parameters (`DESCRIBE`, `SHOW ...`, `CREATE TABLE`)
//! go over the text protocol via `sqlx::raw_sql`, since not every server
//! accepts them as prepared statements. Everything else is prepared and
//! bound positionally.
//!
//! # Affected Rows
//!
//! sqlx negotiates `CLIENT_FOUND_ROWS`, so an upsert that matches an
//! identical row reports 1 rather than 0. The worker's insert check relies on
//! this for idempotent replay.

use crate::config::ConnectionDescriptor;
use crate::database::{BoxFuture, Database, SqlValue};
use crate::error::{ReplicationError, Result};
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Connection, Executor, MySql, Row, TypeInfo, ValueRef};
use tracing::{debug, trace};

/// sqlx-backed MySQL driver. Holds no connections between calls.
#[derive(Debug, Clone, Default)]
pub struct MySqlDatabase;

impl MySqlDatabase {
    pub fn new() -> Self {
        Self
    }

    fn connect_options(endpoint: &ConnectionDescriptor) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port)
            .username(&endpoint.user)
            .password(&endpoint.password)
    }

    async fn connect(endpoint: &ConnectionDescriptor) -> Result<MySqlConnection> {
        let options = Self::connect_options(endpoint);
        MySqlConnection::connect_with(&options)
            .await
            .map_err(|e| ReplicationError::database(endpoint.endpoint(), "connect", e))
    }

    async fn release(endpoint: &ConnectionDescriptor, conn: MySqlConnection) {
        if let Err(e) = conn.close().await {
            debug!(endpoint = %endpoint, error = %e, "Connection close failed");
        }
    }
}

fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::UInt(u) => query.bind(*u),
            SqlValue::Double(d) => query.bind(*d),
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Bytes(b) => query.bind(b.as_slice()),
        };
    }
    query
}

/// How a result column is read back, chosen from its reported type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnDecode {
    Signed,
    Unsigned,
    Float,
    Bool,
    /// Strings, blobs, decimals and anything else: keep the wire bytes.
    Raw,
}

impl ColumnDecode {
    fn for_type(type_name: &str) -> Self {
        match type_name.to_ascii_uppercase().as_str() {
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Self::Signed,
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" => Self::Unsigned,
            "FLOAT" | "DOUBLE" => Self::Float,
            // TINYINT(1) is reported as BOOLEAN
            "BOOLEAN" | "BOOL" => Self::Bool,
            _ => Self::Raw,
        }
    }
}

/// Decode one column of a result row by its reported type.
fn decode_column(row: &MySqlRow, idx: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let decode = ColumnDecode::for_type(raw.type_info().name());

    let value = match decode {
        ColumnDecode::Signed => SqlValue::Int(row.try_get::<i64, _>(idx)?),
        ColumnDecode::Unsigned => SqlValue::UInt(row.try_get::<u64, _>(idx)?),
        ColumnDecode::Float => SqlValue::Double(row.try_get::<f64, _>(idx)?),
        ColumnDecode::Bool => SqlValue::Int(i64::from(row.try_get::<bool, _>(idx)?)),
        ColumnDecode::Raw => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
    };
    Ok(value)
}

fn decode_row(row: &MySqlRow) -> std::result::Result<Vec<SqlValue>, sqlx::Error> {
    (0..row.columns().len())
        .map(|idx| decode_column(row, idx))
        .collect()
}

impl Database for MySqlDatabase {
    fn query<'a>(
        &'a self,
        endpoint: &'a ConnectionDescriptor,
        sql: &'a str,
        params: &'a [SqlValue],
    ) -> BoxFuture<'a, Vec<Vec<SqlValue>>> {
        Box::pin(async move {
            let mut conn = Self::connect(endpoint).await?;
            trace!(endpoint = %endpoint, sql, "query");

            let result = if params.is_empty() {
                conn.fetch_all(sqlx::raw_sql(sql)).await
            } else {
                conn.fetch_all(bind_all(sqlx::query(sql), params)).await
            };
            Self::release(endpoint, conn).await;

            let rows = result.map_err(|e| ReplicationError::database(endpoint.endpoint(), "query", e))?;
            rows.iter()
                .map(decode_row)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ReplicationError::database(endpoint.endpoint(), "decode", e))
        })
    }

    fn execute_batch<'a>(
        &'a self,
        endpoint: &'a ConnectionDescriptor,
        sql: &'a str,
        param_sets: &'a [Vec<SqlValue>],
    ) -> BoxFuture<'a, Vec<u64>> {
        Box::pin(async move {
            let mut conn = Self::connect(endpoint).await?;
            trace!(endpoint = %endpoint, sql, executions = param_sets.len(), "execute");

            let mut counts = Vec::with_capacity(param_sets.len());
            let mut failure = None;
            for params in param_sets {
                let result = if params.is_empty() {
                    conn.execute(sqlx::raw_sql(sql)).await
                } else {
                    conn.execute(bind_all(sqlx::query(sql), params)).await
                };
                match result {
                    Ok(done) => counts.push(done.rows_affected()),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            Self::release(endpoint, conn).await;

            match failure {
                Some(e) => Err(ReplicationError::database(endpoint.endpoint(), "execute", e)),
                None => Ok(counts),
            }
        })
    }
}
