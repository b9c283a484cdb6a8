// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Binlog event builders and engine wiring over [`MockDatabase`].

#![allow(dead_code)]

use super::mock_db::MockDatabase;
use binlog_replicator::config::{ConnectionDescriptor, ReplicatorConfig};
use binlog_replicator::coordinator::{EngineState, ReplicationEngine};
use binlog_replicator::event::{BinlogEvent, ColumnValue, Row, RowImage};
use binlog_replicator::source::ChannelSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const MASTER_ID: u32 = 1;

pub const USERS_COLUMNS: &[(&str, &str)] = &[
    ("id", "int(11)"),
    ("name", "varchar(64)"),
    ("score", "double"),
];

pub fn master() -> ConnectionDescriptor {
    ConnectionDescriptor::new("master", 3306, "root", "root", MASTER_ID)
}

pub fn slave(n: u16) -> ConnectionDescriptor {
    ConnectionDescriptor::for_testing(&format!("slave-{}", n), 3306)
}

/// Config replicating each `(database, slaves)` pair.
pub fn config(databases: &[(&str, Vec<ConnectionDescriptor>)]) -> ReplicatorConfig {
    let mut config = ReplicatorConfig::for_testing(master());
    for (database, slaves) in databases {
        for slave in slaves {
            if !config.slaves.contains(slave) {
                config.slaves.push(slave.clone());
            }
        }
        config.databases.insert(
            database.to_string(),
            slaves.iter().map(ConnectionDescriptor::endpoint).collect(),
        );
    }
    config.settings.source_stop_timeout = "2s".to_string();
    config
}

/// Define `users` on the master and every slave, and give the master a log.
pub fn mock_with_users(database: &str, slaves: &[ConnectionDescriptor]) -> Arc<MockDatabase> {
    let db = Arc::new(MockDatabase::new());
    db.set_binlogs(&master(), &["mysql-bin.000001", "mysql-bin.000002"]);
    db.define_table(&master(), database, "users", USERS_COLUMNS);
    for slave in slaves {
        db.define_table(slave, database, "users", USERS_COLUMNS);
    }
    db
}

pub type TestEngine = ReplicationEngine<MockDatabase, ChannelSource>;

/// Build an engine fed by a channel. The sender stands in for the binlog
/// client; dropping it ends the source.
pub fn engine(
    config: ReplicatorConfig,
    db: &Arc<MockDatabase>,
) -> (TestEngine, Arc<ChannelSource>, mpsc::Sender<BinlogEvent>) {
    let (source, events) = ChannelSource::new(64);
    let source = Arc::new(source);
    let engine = ReplicationEngine::new(config, Arc::clone(db), Arc::clone(&source))
        .expect("engine config");
    (engine, source, events)
}

// ═══════════════════════════════════════════════════════════════════════════
// Event builders
// ═══════════════════════════════════════════════════════════════════════════

pub fn table_map(table_id: u64, database: &str, table: &str) -> BinlogEvent {
    BinlogEvent::TableMap {
        table_id,
        database: database.to_string(),
        table: table.to_string(),
    }
}

pub fn user(id: i64, name: &str, score: f64) -> Row {
    vec![ColumnValue::Int(id), ColumnValue::from(name), ColumnValue::Float(score)]
}

pub fn write_rows(table_id: u64, next_position: u64, rows: Vec<Row>) -> BinlogEvent {
    BinlogEvent::WriteRows {
        table_id,
        next_position: Some(next_position),
        rows,
    }
}

pub fn update_rows(table_id: u64, next_position: u64, rows: Vec<(Row, Row)>) -> BinlogEvent {
    BinlogEvent::UpdateRows {
        table_id,
        next_position: Some(next_position),
        rows: rows
            .into_iter()
            .map(|(before, after)| RowImage { before, after })
            .collect(),
    }
}

pub fn delete_rows(table_id: u64, next_position: u64, rows: Vec<Row>) -> BinlogEvent {
    BinlogEvent::DeleteRows {
        table_id,
        next_position: Some(next_position),
        rows,
    }
}

pub fn other(kind: &str) -> BinlogEvent {
    BinlogEvent::Other {
        kind: kind.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Waiting
// ═══════════════════════════════════════════════════════════════════════════

/// Poll until the engine has applied at least `n` events.
pub async fn wait_for_processed(engine: &TestEngine, n: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while engine.processed_events() < n {
        if tokio::time::Instant::now() > deadline {
            panic!(
                "timed out waiting for {} processed events (got {})",
                n,
                engine.processed_events()
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_state(engine: &TestEngine, state: EngineState) {
    let mut rx = engine.state_receiver();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", state))
        .expect("state channel closed");
}

/// Poll a condition on the mock until it holds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met within 5s");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
