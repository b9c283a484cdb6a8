// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replicator.
//!
//! Errors are grouped by how the pipeline reacts to them, not by where they
//! come from.
//!
//! # Error Categories
//!
//! | Error Type | Class | Description |
//! |------------|-------|-------------|
//! | `Database` | Retryable | Connection loss, constraint violation, query failure |
//! | `Bind` | Retryable | A row value does not fit its column's semantic type |
//! | `UnknownTable` | Fatal | Row event for a table id that was never mapped |
//! | `UnsupportedColumnType` | Fatal | Declared column type has no semantic mapping |
//! | `SchemaResolution` | Fatal | Master could not describe a table |
//! | `Config` | Fatal | Bootstrap configuration invalid |
//! | `InvalidState` | Neither | Engine lifecycle misuse |
//! | `Shutdown` | Neither | Queue closed, engine stopping |
//! | `Internal` | Neither | Unexpected internal error |
//!
//! # Propagation
//!
//! Retryable errors never leave the replication worker: the in-flight event
//! is kept and applied again. Fatal errors travel back through the producer
//! to the binlog source, which stops, and the engine moves to `Failed`.
//! Checkpoint failures are logged where they happen and never surface here.

use thiserror::Error;

/// Result type alias for replicator operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur while replicating.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// SQL execution against the master or a slave failed.
    ///
    /// `endpoint` is the `host:port` of the database involved.
    #[error("Database error on {endpoint} ({operation}): {message}")]
    Database {
        endpoint: String,
        operation: String,
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// A raw row value could not be bound as its column's semantic type.
    #[error("Cannot bind column `{column}`: {message}")]
    Bind { column: String, message: String },

    /// A row event referenced a table id with no cached schema.
    #[error("No schema cached for table id {0}")]
    UnknownTable(u64),

    /// `DESCRIBE` returned a type we cannot classify.
    #[error("Unsupported column type `{declared}` for `{database}`.`{table}`.`{column}`")]
    UnsupportedColumnType {
        database: String,
        table: String,
        column: String,
        declared: String,
    },

    /// The master could not be asked for a table's structure.
    #[error("Schema resolution failed for `{database}`.`{table}`: {message}")]
    SchemaResolution {
        database: String,
        table: String,
        message: String,
    },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine lifecycle violation (e.g. `start()` twice).
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// The hand-off queue is closed because the engine is stopping.
    #[error("Shutdown in progress")]
    Shutdown,

    /// Catch-all for errors that shouldn't happen.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Create a database error from a sqlx error.
    pub fn database(
        endpoint: impl Into<String>,
        operation: impl Into<String>,
        source: sqlx::Error,
    ) -> Self {
        Self::Database {
            endpoint: endpoint.into(),
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a database error without source.
    pub fn database_msg(
        endpoint: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Database {
            endpoint: endpoint.into(),
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Check if retrying the same event could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database { .. } => true,
            Self::Bind { .. } => true,
            Self::UnknownTable(_) => false,
            Self::UnsupportedColumnType { .. } => false,
            Self::SchemaResolution { .. } => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Shutdown => false,
            Self::Internal(_) => false,
        }
    }

    /// Check if the process cannot safely continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownTable(_)
                | Self::UnsupportedColumnType { .. }
                | Self::SchemaResolution { .. }
                | Self::Config(_)
        )
    }
}
