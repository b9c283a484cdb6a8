// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Table schemas and the schema cache.
//!
//! The binlog only carries a numeric table id and positional values. To turn
//! those into SQL we need column names and types, which we fetch from the
//! master with `DESCRIBE` the first time a table id shows up in a
//! table-map event.
//!
//! # Cache Semantics
//!
//! - Populated only by the producer; read by the worker.
//! - Insert-if-absent: concurrent populates of the same id resolve to the
//!   first schema written.
//! - Never evicted, never updated. A table altered after it was cached keeps
//!   its old shape until restart.
//!
//! # Type Classification
//!
//! The declared type is cut at the first `(` or space (`int(11) unsigned`
//! becomes `int`) and matched case-insensitively. Unknown types are fatal:
//! we refuse to start replicating a table we cannot bind.

use crate::config::ConnectionDescriptor;
use crate::database::Database;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::statement::quote_ident;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// How a column's values are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Integer,
    FloatingPoint,
    FixedPoint,
    FixedString,
    VariableString,
    BinaryBlob,
    Text,
}

impl SemanticType {
    /// Classify a declared MySQL type such as `VARCHAR(255)`.
    pub fn classify(declared: &str) -> Option<Self> {
        let base = declared
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();

        match base.as_str() {
            "INT" | "INTEGER" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "BIGINT" => {
                Some(SemanticType::Integer)
            }
            "FLOAT" | "DOUBLE" => Some(SemanticType::FloatingPoint),
            "DECIMAL" => Some(SemanticType::FixedPoint),
            "CHAR" => Some(SemanticType::FixedString),
            "VARCHAR" => Some(SemanticType::VariableString),
            "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => Some(SemanticType::BinaryBlob),
            "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" => Some(SemanticType::Text),
            _ => None,
        }
    }
}

/// One column, in physical order within its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub semantic_type: SemanticType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
        }
    }
}

/// Resolved shape of one replicated table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub database: String,
    pub table: String,
    /// Physical column order; row values are positional against it.
    pub columns: Vec<ColumnSpec>,
    /// Column indexes used to match rows on delete. Empty means all columns.
    pub key_columns: Vec<usize>,
}

impl TableSchema {
    pub fn new(database: impl Into<String>, table: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            columns,
            key_columns: Vec::new(),
        }
    }

    /// Restrict the delete match key to the named columns.
    pub fn with_key_columns(mut self, names: &[String]) -> Result<Self> {
        let mut indexes = Vec::with_capacity(names.len());
        for name in names {
            let idx = self
                .columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    ReplicationError::Config(format!(
                        "Key column `{}` not found in `{}`.`{}`",
                        name, self.database, self.table
                    ))
                })?;
            indexes.push(idx);
        }
        self.key_columns = indexes;
        Ok(self)
    }

    /// Column indexes matched by a delete, in schema order when defaulted.
    pub fn match_columns(&self) -> Vec<usize> {
        if self.key_columns.is_empty() {
            (0..self.columns.len()).collect()
        } else {
            self.key_columns.clone()
        }
    }

    /// `db.table`, for logs.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

/// Concurrent table-id → schema cache.
///
/// Shared between producer and worker through an `Arc`. Sharded, so a
/// populate on one table id never blocks reads of another.
#[derive(Debug, Default)]
pub struct SchemaCache {
    schemas: DashMap<u64, Arc<TableSchema>>,
    /// Lower-cased `db.table` → configured delete key.
    key_columns: HashMap<String, Vec<String>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache that applies configured delete keys to new schemas.
    pub fn with_key_columns(key_columns: &HashMap<String, Vec<String>>) -> Self {
        Self {
            schemas: DashMap::new(),
            key_columns: key_columns
                .iter()
                .map(|(name, cols)| (name.to_lowercase(), cols.clone()))
                .collect(),
        }
    }

    /// Look up a cached schema.
    pub fn resolve(&self, table_id: u64) -> Option<Arc<TableSchema>> {
        self.schemas.get(&table_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, table_id: u64) -> bool {
        self.schemas.contains_key(&table_id)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Insert unless already present. Returns whichever schema is cached.
    pub fn insert_if_absent(&self, table_id: u64, schema: TableSchema) -> Arc<TableSchema> {
        let cached = Arc::clone(
            self.schemas
                .entry(table_id)
                .or_insert_with(|| Arc::new(schema))
                .value(),
        );
        metrics::set_schema_cache_size(self.schemas.len());
        cached
    }

    /// Resolve a table id through the master on first sight.
    ///
    /// Idempotent. Errors are fatal to the caller.
    pub async fn populate<D: Database>(
        &self,
        db: &D,
        master: &ConnectionDescriptor,
        table_id: u64,
        database: &str,
        table: &str,
    ) -> Result<Arc<TableSchema>> {
        if let Some(existing) = self.resolve(table_id) {
            return Ok(existing);
        }

        let mut schema = describe_table(db, master, database, table).await?;
        let key = format!("{}.{}", database, table).to_lowercase();
        if let Some(names) = self.key_columns.get(&key) {
            schema = schema.with_key_columns(names)?;
        }

        info!(
            table_id,
            table = %schema.qualified_name(),
            columns = schema.columns.len(),
            "Cached table schema"
        );
        Ok(self.insert_if_absent(table_id, schema))
    }
}

/// Ask the master for a table's columns and classify them.
pub async fn describe_table<D: Database>(
    db: &D,
    master: &ConnectionDescriptor,
    database: &str,
    table: &str,
) -> Result<TableSchema> {
    let sql = format!("DESCRIBE {}.{}", quote_ident(database), quote_ident(table));
    debug!(sql = %sql, "Describing table");

    let rows = db.query(master, &sql, &[]).await.map_err(|e| {
        error!(database, table, error = %e, "Cannot describe table on master");
        ReplicationError::SchemaResolution {
            database: database.to_string(),
            table: table.to_string(),
            message: e.to_string(),
        }
    })?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let field = row.first().and_then(|v| v.as_text());
        let declared = row.get(1).and_then(|v| v.as_text());
        let (Some(field), Some(declared)) = (field, declared) else {
            return Err(ReplicationError::SchemaResolution {
                database: database.to_string(),
                table: table.to_string(),
                message: "DESCRIBE row without Field/Type".to_string(),
            });
        };

        let semantic_type =
            SemanticType::classify(&declared).ok_or_else(|| ReplicationError::UnsupportedColumnType {
                database: database.to_string(),
                table: table.to_string(),
                column: field.clone(),
                declared: declared.clone(),
            })?;
        columns.push(ColumnSpec::new(field, semantic_type));
    }

    Ok(TableSchema::new(database, table, columns))
}
