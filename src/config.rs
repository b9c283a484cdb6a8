// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the replicator.
//!
//! Configuration is passed to
//! [`ReplicationEngine::new()`](crate::ReplicationEngine::new) and can be
//! constructed programmatically or deserialized from JSON.
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicatorConfig
//! ├── master: ConnectionDescriptor       # the binlog source
//! ├── slaves: Vec<ConnectionDescriptor>  # every destination endpoint
//! ├── databases: {name: ["host:port"]}   # which slaves receive which database
//! ├── key_columns: {"db.table": [col]}   # optional delete match key
//! └── settings: ReplicationSettings
//!     ├── queue_capacity
//!     ├── checkpoint_sample_period
//!     ├── source_stop_timeout
//!     └── checkpoint_table
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "master": { "host": "localhost", "port": 3306, "user": "repl", "password": "secret", "server_id": 1 },
//!   "slaves": [
//!     { "host": "localhost", "port": 3307, "user": "repl", "password": "secret" }
//!   ],
//!   "databases": {
//!     "test": ["localhost:3307"],
//!     "MyDB": ["localhost:3307"]
//!   }
//! }
//! ```

use crate::error::{ReplicationError, Result};
use crate::registry::DestinationRegistry;
use crate::statement::quote_ident;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// ConnectionDescriptor: one database endpoint
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifies one database endpoint.
///
/// Immutable once built. Connections are opened from it on demand and
/// closed after each operation; nothing is pooled.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,

    /// Server id. Only meaningful for the master, where it keys checkpoints.
    #[serde(default, alias = "serverId")]
    pub server_id: u32,
}

impl ConnectionDescriptor {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        server_id: u32,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            server_id,
        }
    }

    /// `host:port`, the form used to reference slaves from `databases`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Create a descriptor for testing.
    pub fn for_testing(host: &str, port: u16) -> Self {
        Self::new(host, port, "root", "root", 0)
    }
}

impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("server_id", &self.server_id)
            .finish()
    }
}

impl std::fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level bootstrap document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicatorConfig {
    /// The master whose binlog is tailed.
    pub master: ConnectionDescriptor,

    /// Every slave endpoint. Referenced by `host:port` from `databases`.
    #[serde(default)]
    pub slaves: Vec<ConnectionDescriptor>,

    /// Source database name to the slaves responsible for it.
    #[serde(default)]
    pub databases: HashMap<String, Vec<String>>,

    /// Optional per-table delete match key, keyed `db.table`.
    /// Tables not listed match on every column.
    #[serde(default)]
    pub key_columns: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub settings: ReplicationSettings,
}

impl ReplicatorConfig {
    /// Parse a JSON bootstrap document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ReplicationError::Config(format!("Invalid config JSON: {}", e)))?;
        config.settings.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON bootstrap file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ReplicationError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Build the destination registry, resolving `host:port` references.
    ///
    /// Registration order within a database follows the order listed in
    /// `databases`. An unknown reference is a configuration error.
    pub fn destination_registry(&self) -> Result<DestinationRegistry> {
        let by_endpoint: HashMap<String, &ConnectionDescriptor> = self
            .slaves
            .iter()
            .map(|slave| (slave.endpoint(), slave))
            .collect();

        let mut registry = DestinationRegistry::builder();
        for (database, endpoints) in &self.databases {
            let mut slaves = Vec::with_capacity(endpoints.len());
            for endpoint in endpoints {
                let slave = by_endpoint.get(endpoint).ok_or_else(|| {
                    ReplicationError::Config(format!(
                        "Database `{}` references unknown slave {}",
                        database, endpoint
                    ))
                })?;
                slaves.push((*slave).clone());
            }
            registry = registry.database(database, slaves);
        }
        Ok(registry.build())
    }

    /// Configured delete match key for a table, if any.
    pub fn key_columns_for(&self, database: &str, table: &str) -> Option<&[String]> {
        let wanted = format!("{}.{}", database, table).to_lowercase();
        self.key_columns
            .iter()
            .find(|(name, _)| name.to_lowercase() == wanted)
            .map(|(_, cols)| cols.as_slice())
    }

    /// Create a minimal config for testing.
    pub fn for_testing(master: ConnectionDescriptor) -> Self {
        Self {
            master,
            slaves: Vec::new(),
            databases: HashMap::new(),
            key_columns: HashMap::new(),
            settings: ReplicationSettings::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ReplicationSettings: tunables
// ═══════════════════════════════════════════════════════════════════════════════

/// Tunable parameters for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationSettings {
    /// Capacity of the producer → worker queue. A full queue blocks the
    /// producer, which stalls the binlog source.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Write a checkpoint every N successfully applied events.
    #[serde(default = "default_checkpoint_sample_period")]
    pub checkpoint_sample_period: u64,

    /// How long to wait for the binlog source to stop, as a duration string.
    #[serde(default = "default_source_stop_timeout")]
    pub source_stop_timeout: String,

    #[serde(default)]
    pub checkpoint_table: CheckpointTableConfig,
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_checkpoint_sample_period() -> u64 {
    50
}

fn default_source_stop_timeout() -> String {
    "60s".to_string()
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            checkpoint_sample_period: 50,
            source_stop_timeout: "60s".to_string(),
            checkpoint_table: CheckpointTableConfig::default(),
        }
    }
}

impl ReplicationSettings {
    /// Parse `source_stop_timeout`. An unparseable value is a `Config` error.
    pub fn source_stop_timeout_duration(&self) -> Result<Duration> {
        humantime::parse_duration(&self.source_stop_timeout).map_err(|e| {
            ReplicationError::Config(format!(
                "Invalid source_stop_timeout {:?}: {}",
                self.source_stop_timeout, e
            ))
        })
    }

    /// Reject settings that would only fail later, at shutdown.
    pub fn validate(&self) -> Result<()> {
        self.source_stop_timeout_duration().map(|_| ())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CheckpointTableConfig: where checkpoints live on each slave
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointTableConfig {
    #[serde(default = "default_checkpoint_database")]
    pub database: String,
    #[serde(default = "default_checkpoint_table")]
    pub table: String,
}

fn default_checkpoint_database() -> String {
    "mysql".to_string()
}

fn default_checkpoint_table() -> String {
    "rpl_checkpoint".to_string()
}

impl Default for CheckpointTableConfig {
    fn default() -> Self {
        Self {
            database: default_checkpoint_database(),
            table: default_checkpoint_table(),
        }
    }
}

impl CheckpointTableConfig {
    /// Backtick-quoted `db`.`table`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", quote_ident(&self.database), quote_ident(&self.table))
    }
}
