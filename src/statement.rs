// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Statement builder.
//!
//! Turns a [`TableSchema`] plus a [`ChangeEvent`] into one parameterized
//! statement and a parameter set per row.
//!
//! # Statements
//!
//! ```text
//! Insert: INSERT INTO `db`.`t` (`a`, `b`) VALUES (?, ?)
//!         ON DUPLICATE KEY UPDATE `a` = VALUES(`a`), `b` = VALUES(`b`)
//! Delete: DELETE FROM `db`.`t` WHERE `a` <=> ? AND `b` <=> ?
//! ```
//!
//! The upsert reassigns every column, so replaying an insert or update is a
//! no-op on a slave that already has it. The delete predicate covers every
//! column unless the table has configured key columns. It compares with
//! `<=>`, so a NULL in the row image matches a NULL on the slave.
//!
//! # Binding
//!
//! | Semantic type | Accepted raw values | Bound as |
//! |---------------|---------------------|----------|
//! | Integer | `Int`, numeric bytes | `Int` |
//! | FloatingPoint, FixedPoint | `Float`, `Int`, `Decimal`, numeric bytes | `Double` |
//! | FixedString, VariableString | `Bytes`, `Decimal` | `Text` |
//! | BinaryBlob, Text | `Bytes` | `Bytes` |
//!
//! `Null` binds as SQL NULL everywhere. Anything else is a [`Bind`] error,
//! which the worker treats as a failed attempt.
//!
//! [`Bind`]: ReplicationError::Bind

use crate::database::SqlValue;
use crate::error::{ReplicationError, Result};
use crate::event::{ChangeEvent, ColumnValue, Operation, Row};
use crate::schema::{ColumnSpec, SemanticType, TableSchema};

/// Backtick-quote an identifier, doubling embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn qualified_table(schema: &TableSchema) -> String {
    format!("{}.{}", quote_ident(&schema.database), quote_ident(&schema.table))
}

/// Upsert naming every column in schema order.
pub fn build_upsert(schema: &TableSchema) -> String {
    let names: Vec<String> = schema.columns.iter().map(|c| quote_ident(&c.name)).collect();
    let placeholders = vec!["?"; names.len()].join(", ");
    let assignments: Vec<String> = names
        .iter()
        .map(|name| format!("{} = VALUES({})", name, name))
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
        qualified_table(schema),
        names.join(", "),
        placeholders,
        assignments.join(", ")
    )
}

/// Delete matching on the table's match columns.
pub fn build_delete(schema: &TableSchema) -> String {
    let predicate: Vec<String> = schema
        .match_columns()
        .into_iter()
        .map(|idx| format!("{} <=> ?", quote_ident(&schema.columns[idx].name)))
        .collect();

    format!(
        "DELETE FROM {} WHERE {}",
        qualified_table(schema),
        predicate.join(" AND ")
    )
}

pub fn build_statement(schema: &TableSchema, operation: Operation) -> String {
    match operation {
        Operation::Insert => build_upsert(schema),
        Operation::Delete => build_delete(schema),
    }
}

fn bind_error(column: &ColumnSpec, message: impl Into<String>) -> ReplicationError {
    ReplicationError::Bind {
        column: column.name.clone(),
        message: message.into(),
    }
}

fn parse_text<T: std::str::FromStr>(column: &ColumnSpec, bytes: &[u8]) -> Result<T> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| bind_error(column, format!("not a {:?} value", column.semantic_type)))
}

/// Bind one raw value according to its column's semantic type.
pub fn bind_value(column: &ColumnSpec, value: &ColumnValue) -> Result<SqlValue> {
    use SemanticType::*;

    if let ColumnValue::Null = value {
        return Ok(SqlValue::Null);
    }

    match (column.semantic_type, value) {
        (Integer, ColumnValue::Int(i)) => Ok(SqlValue::Int(*i)),
        (Integer, ColumnValue::Bytes(b)) => parse_text(column, b).map(SqlValue::Int),

        (FloatingPoint | FixedPoint, ColumnValue::Float(f)) => Ok(SqlValue::Double(*f)),
        (FloatingPoint | FixedPoint, ColumnValue::Int(i)) => Ok(SqlValue::Double(*i as f64)),
        (FloatingPoint | FixedPoint, ColumnValue::Decimal(s)) => {
            parse_text(column, s.as_bytes()).map(SqlValue::Double)
        }
        (FloatingPoint | FixedPoint, ColumnValue::Bytes(b)) => parse_text(column, b).map(SqlValue::Double),

        (FixedString | VariableString, ColumnValue::Bytes(b)) => {
            Ok(SqlValue::Text(String::from_utf8_lossy(b).into_owned()))
        }
        (FixedString | VariableString, ColumnValue::Decimal(s)) => Ok(SqlValue::Text(s.clone())),

        (BinaryBlob | Text, ColumnValue::Bytes(b)) => Ok(SqlValue::Bytes(b.clone())),

        (ty, other) => Err(bind_error(
            column,
            format!("cannot bind {:?} as {:?}", other, ty),
        )),
    }
}

/// Bind a row's parameters for the given operation.
///
/// Inserts bind every column. Deletes bind only the match columns, in
/// predicate order.
pub fn bind_row(schema: &TableSchema, row: &Row, operation: Operation) -> Result<Vec<SqlValue>> {
    if row.len() != schema.columns.len() {
        return Err(ReplicationError::Bind {
            column: "*".to_string(),
            message: format!(
                "row has {} values, {} has {} columns",
                row.len(),
                schema.qualified_name(),
                schema.columns.len()
            ),
        });
    }

    match operation {
        Operation::Insert => schema
            .columns
            .iter()
            .zip(row)
            .map(|(column, value)| bind_value(column, value))
            .collect(),
        Operation::Delete => schema
            .match_columns()
            .into_iter()
            .map(|idx| bind_value(&schema.columns[idx], &row[idx]))
            .collect(),
    }
}

/// A statement ready to run once per parameter set on one slave.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedWrite {
    pub sql: String,
    pub param_sets: Vec<Vec<SqlValue>>,
}

impl PreparedWrite {
    /// Build the statement and bind every row of an event.
    pub fn for_event(schema: &TableSchema, event: &ChangeEvent) -> Result<Self> {
        let param_sets = event
            .rows
            .iter()
            .map(|row| bind_row(schema, row, event.operation))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sql: build_statement(schema, event.operation),
            param_sets,
        })
    }
}
