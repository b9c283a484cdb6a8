// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Destination registry: which slaves receive which source database.
//!
//! Built once at startup and read-only afterwards. Keys are lower-cased so
//! lookups by the binlog's database name are case-insensitive.

use crate::config::ConnectionDescriptor;
use std::collections::{HashMap, HashSet};

/// Lower-cased database name to the slaves that must receive its changes.
#[derive(Debug, Clone, Default)]
pub struct DestinationRegistry {
    databases: HashMap<String, Vec<ConnectionDescriptor>>,
    /// Registration order of database names, for deterministic iteration.
    order: Vec<String>,
}

impl DestinationRegistry {
    pub fn builder() -> DestinationRegistryBuilder {
        DestinationRegistryBuilder::default()
    }

    /// Slaves registered for a database, in registration order.
    ///
    /// Empty when the database is not replicated.
    pub fn slaves_for(&self, database: &str) -> &[ConnectionDescriptor] {
        self.databases
            .get(&database.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every distinct slave across all databases, first registration wins.
    pub fn all_slaves(&self) -> Vec<&ConnectionDescriptor> {
        let mut seen = HashSet::new();
        let mut slaves = Vec::new();
        for name in &self.order {
            for slave in &self.databases[name] {
                if seen.insert(slave.endpoint()) {
                    slaves.push(slave);
                }
            }
        }
        slaves
    }

    /// Registered database names (lower-cased).
    pub fn databases(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct DestinationRegistryBuilder {
    inner: DestinationRegistry,
}

impl DestinationRegistryBuilder {
    /// Register slaves for a database. Repeated names append.
    pub fn database(mut self, name: &str, slaves: Vec<ConnectionDescriptor>) -> Self {
        let key = name.to_lowercase();
        if !self.inner.databases.contains_key(&key) {
            self.inner.order.push(key.clone());
        }
        self.inner.databases.entry(key).or_default().extend(slaves);
        self
    }

    pub fn build(self) -> DestinationRegistry {
        self.inner
    }
}
