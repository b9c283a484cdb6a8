// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory `Database` for tests.
//!
//! Understands exactly the statements the replicator issues:
//! `DESCRIBE`, `SHOW BINARY LOGS`, `SHOW MASTER STATUS`, the checkpoint
//! table's `CREATE`/`SELECT`/upsert, and data-table upserts and deletes.
//! Each endpoint (`host:port`) is an independent server.
//!
//! Affected-row counts follow MySQL with `CLIENT_FOUND_ROWS`: an upsert that
//! inserts reports 1, one that matches an identical row reports 1, one that
//! changes a row reports 2.

#![allow(dead_code)]

use binlog_replicator::config::ConnectionDescriptor;
use binlog_replicator::database::{BoxFuture, Database, SqlValue};
use binlog_replicator::error::{ReplicationError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// A statement the mock received.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub endpoint: String,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Clone, Default)]
pub struct MockTable {
    /// (name, declared type) in physical order.
    pub columns: Vec<(String, String)>,
    /// Unique key column indexes.
    pub key: Vec<usize>,
    pub rows: Vec<Vec<SqlValue>>,
}

#[derive(Debug, Default)]
struct Server {
    tables: HashMap<String, MockTable>,
    binlogs: Vec<String>,
    checkpoint_table: bool,
    checkpoints: BTreeMap<i64, (String, u64)>,
    unreachable: bool,
    fail_next: usize,
    zero_affected_next: usize,
    fail_checkpoint_reads: bool,
    fail_checkpoint_writes: bool,
    executed: Vec<Executed>,
}

#[derive(Debug, Default)]
pub struct MockDatabase {
    servers: Mutex<HashMap<String, Server>>,
}

fn table_key(database: &str, table: &str) -> String {
    format!("{}.{}", database, table).to_lowercase()
}

/// Every backtick-quoted identifier in `sql`, in order.
/// Backtick-quoted identifiers in `sql`, in order, unescaped.
pub fn idents(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '`' {
            continue;
        }
        let mut ident = String::new();
        while let Some(c) = chars.next() {
            if c == '`' {
                if chars.peek() == Some(&'`') {
                    chars.next();
                    ident.push('`');
                    continue;
                }
                break;
            }
            ident.push(c);
        }
        out.push(ident);
    }
    out
}

fn fail(endpoint: &str, operation: &str, message: &str) -> ReplicationError {
    ReplicationError::database_msg(endpoint, operation, message)
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_server<T>(&self, endpoint: &str, f: impl FnOnce(&mut Server) -> T) -> T {
        let mut servers = self.servers.lock().unwrap();
        f(servers.entry(endpoint.to_string()).or_default())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Setup
    // ═══════════════════════════════════════════════════════════════════════

    /// Define a table whose unique key is its first column.
    pub fn define_table(
        &self,
        endpoint: &ConnectionDescriptor,
        database: &str,
        table: &str,
        columns: &[(&str, &str)],
    ) {
        self.define_table_with_key(endpoint, database, table, columns, &[0]);
    }

    pub fn define_table_with_key(
        &self,
        endpoint: &ConnectionDescriptor,
        database: &str,
        table: &str,
        columns: &[(&str, &str)],
        key: &[usize],
    ) {
        let table_def = MockTable {
            columns: columns
                .iter()
                .map(|(n, t)| (n.to_string(), t.to_string()))
                .collect(),
            key: key.to_vec(),
            rows: Vec::new(),
        };
        self.with_server(&endpoint.endpoint(), |s| {
            s.tables.insert(table_key(database, table), table_def);
        });
    }

    /// Binlog files the master retains, oldest first. The last is current.
    pub fn set_binlogs(&self, master: &ConnectionDescriptor, files: &[&str]) {
        self.with_server(&master.endpoint(), |s| {
            s.binlogs = files.iter().map(|f| f.to_string()).collect();
        });
    }

    /// Seed a checkpoint row (creates the checkpoint table).
    pub fn set_checkpoint(&self, slave: &ConnectionDescriptor, master_id: u32, file: &str, pos: u64) {
        self.with_server(&slave.endpoint(), |s| {
            s.checkpoint_table = true;
            s.checkpoints
                .insert(i64::from(master_id), (file.to_string(), pos));
        });
    }

    pub fn set_unreachable(&self, endpoint: &ConnectionDescriptor, unreachable: bool) {
        self.with_server(&endpoint.endpoint(), |s| s.unreachable = unreachable);
    }

    /// Fail the next `n` calls to this endpoint.
    pub fn fail_next(&self, endpoint: &ConnectionDescriptor, n: usize) {
        self.with_server(&endpoint.endpoint(), |s| s.fail_next = n);
    }

    /// Report zero affected rows for the next `n` data-table writes.
    pub fn zero_affected_next(&self, endpoint: &ConnectionDescriptor, n: usize) {
        self.with_server(&endpoint.endpoint(), |s| s.zero_affected_next = n);
    }

    pub fn fail_checkpoint_reads(&self, endpoint: &ConnectionDescriptor) {
        self.with_server(&endpoint.endpoint(), |s| s.fail_checkpoint_reads = true);
    }

    pub fn fail_checkpoint_writes(&self, endpoint: &ConnectionDescriptor, enabled: bool) {
        self.with_server(&endpoint.endpoint(), |s| s.fail_checkpoint_writes = enabled);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════════════════

    pub fn rows(&self, endpoint: &ConnectionDescriptor, database: &str, table: &str) -> Vec<Vec<SqlValue>> {
        self.with_server(&endpoint.endpoint(), |s| {
            s.tables
                .get(&table_key(database, table))
                .map(|t| t.rows.clone())
                .unwrap_or_default()
        })
    }

    pub fn checkpoint(&self, slave: &ConnectionDescriptor, master_id: u32) -> Option<(String, u64)> {
        self.with_server(&slave.endpoint(), |s| s.checkpoints.get(&i64::from(master_id)).cloned())
    }

    pub fn has_checkpoint_table(&self, slave: &ConnectionDescriptor) -> bool {
        self.with_server(&slave.endpoint(), |s| s.checkpoint_table)
    }

    pub fn executed(&self, endpoint: &ConnectionDescriptor) -> Vec<Executed> {
        self.with_server(&endpoint.endpoint(), |s| s.executed.clone())
    }

    /// Executed statements on an endpoint whose SQL starts with `prefix`.
    pub fn executed_starting_with(&self, endpoint: &ConnectionDescriptor, prefix: &str) -> Vec<Executed> {
        self.executed(endpoint)
            .into_iter()
            .filter(|e| e.sql.starts_with(prefix))
            .collect()
    }

    /// Number of checkpoint upserts that reached this slave.
    pub fn checkpoint_writes(&self, slave: &ConnectionDescriptor) -> usize {
        self.executed(slave)
            .iter()
            .filter(|e| e.sql.starts_with("INSERT INTO") && e.sql.contains("rpl_checkpoint"))
            .count()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Statement handling
    // ═══════════════════════════════════════════════════════════════════════

    fn gate(server: &mut Server, endpoint: &str) -> Result<()> {
        if server.unreachable {
            return Err(fail(endpoint, "connect", "connection refused"));
        }
        if server.fail_next > 0 {
            server.fail_next -= 1;
            return Err(fail(endpoint, "execute", "injected failure"));
        }
        Ok(())
    }

    fn run_query(&self, endpoint: &str, sql: &str, params: &[SqlValue]) -> Result<Vec<Vec<SqlValue>>> {
        let mut servers = self.servers.lock().unwrap();
        let server = servers.entry(endpoint.to_string()).or_default();
        Self::gate(server, endpoint)?;

        if sql.starts_with("DESCRIBE") {
            let names = idents(sql);
            let key = table_key(&names[0], &names[1]);
            let table = server
                .tables
                .get(&key)
                .ok_or_else(|| fail(endpoint, "query", &format!("Table '{}' doesn't exist", key)))?;
            return Ok(table
                .columns
                .iter()
                .map(|(name, ty)| {
                    vec![
                        SqlValue::Bytes(name.as_bytes().to_vec()),
                        SqlValue::Bytes(ty.as_bytes().to_vec()),
                        SqlValue::Bytes(b"YES".to_vec()),
                        SqlValue::Bytes(Vec::new()),
                        SqlValue::Null,
                        SqlValue::Bytes(Vec::new()),
                    ]
                })
                .collect());
        }

        if sql == "SHOW BINARY LOGS" {
            return Ok(server
                .binlogs
                .iter()
                .map(|f| vec![SqlValue::Text(f.clone()), SqlValue::UInt(1024)])
                .collect());
        }

        if sql == "SHOW MASTER STATUS" {
            return Ok(server
                .binlogs
                .last()
                .map(|f| vec![vec![SqlValue::Text(f.clone()), SqlValue::UInt(1024)]])
                .unwrap_or_default());
        }

        if sql.starts_with("SELECT") && sql.contains("rpl_checkpoint") {
            if server.fail_checkpoint_reads || !server.checkpoint_table {
                return Err(fail(endpoint, "query", "checkpoint table unavailable"));
            }
            let master_id = match params.first() {
                Some(SqlValue::Int(id)) => *id,
                other => return Err(fail(endpoint, "query", &format!("bad master id {:?}", other))),
            };
            return Ok(server
                .checkpoints
                .get(&master_id)
                .map(|(file, pos)| vec![vec![SqlValue::Bytes(file.as_bytes().to_vec()), SqlValue::Int(*pos as i64)]])
                .unwrap_or_default());
        }

        Err(fail(endpoint, "query", &format!("mock cannot answer: {}", sql)))
    }

    fn run_execute(&self, endpoint: &str, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut servers = self.servers.lock().unwrap();
        let server = servers.entry(endpoint.to_string()).or_default();
        Self::gate(server, endpoint)?;
        server.executed.push(Executed {
            endpoint: endpoint.to_string(),
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        if sql.starts_with("CREATE TABLE IF NOT EXISTS") {
            server.checkpoint_table = true;
            return Ok(0);
        }

        if sql.starts_with("INSERT INTO") && sql.contains("rpl_checkpoint") {
            if server.fail_checkpoint_writes || !server.checkpoint_table {
                return Err(fail(endpoint, "execute", "checkpoint table unavailable"));
            }
            let (Some(SqlValue::Int(id)), Some(file), Some(pos)) = (params.first(), params.get(1), params.get(2)) else {
                return Err(fail(endpoint, "execute", "bad checkpoint params"));
            };
            let file = file.as_text().unwrap_or_default();
            let pos = pos.as_u64().unwrap_or_default();
            let previous = server.checkpoints.insert(*id, (file.clone(), pos));
            return Ok(match previous {
                Some((old_file, old_pos)) if old_file != file || old_pos != pos => 2,
                _ => 1,
            });
        }

        let zero = server.zero_affected_next > 0;
        if zero {
            server.zero_affected_next -= 1;
        }

        if sql.starts_with("INSERT INTO") {
            let names = idents(sql);
            let table = server
                .tables
                .get_mut(&table_key(&names[0], &names[1]))
                .ok_or_else(|| fail(endpoint, "execute", "no such table"))?;
            let affected = upsert(table, &names[2..], params)
                .map_err(|m| fail(endpoint, "execute", &m))?;
            return Ok(if zero { 0 } else { affected });
        }

        if sql.starts_with("DELETE FROM") {
            let names = idents(sql);
            let table = server
                .tables
                .get_mut(&table_key(&names[0], &names[1]))
                .ok_or_else(|| fail(endpoint, "execute", "no such table"))?;
            let null_safe = sql.contains("<=>");
            let affected = delete(table, &names[2..], params, null_safe)
                .map_err(|m| fail(endpoint, "execute", &m))?;
            return Ok(if zero { 0 } else { affected });
        }

        Err(fail(endpoint, "execute", &format!("mock cannot execute: {}", sql)))
    }
}

fn column_index(table: &MockTable, name: &str) -> std::result::Result<usize, String> {
    table
        .columns
        .iter()
        .position(|(n, _)| n.eq_ignore_ascii_case(name))
        .ok_or_else(|| format!("Unknown column '{}'", name))
}

/// `names` holds the insert column list followed by the update clause idents.
fn upsert(table: &mut MockTable, names: &[String], params: &[SqlValue]) -> std::result::Result<u64, String> {
    let insert_columns = &names[..params.len().min(names.len())];
    let mut row = vec![SqlValue::Null; table.columns.len()];
    for (name, value) in insert_columns.iter().zip(params) {
        row[column_index(table, name)?] = value.clone();
    }

    let key = table.key.clone();
    let existing = table
        .rows
        .iter_mut()
        .find(|r| key.iter().all(|&k| r[k] != SqlValue::Null && r[k] == row[k]));

    match existing {
        Some(current) if *current == row => Ok(1),
        Some(current) => {
            *current = row;
            Ok(2)
        }
        None => {
            table.rows.push(row);
            Ok(1)
        }
    }
}

fn delete(
    table: &mut MockTable,
    names: &[String],
    params: &[SqlValue],
    null_safe: bool,
) -> std::result::Result<u64, String> {
    if names.len() != params.len() {
        return Err(format!("{} predicates, {} params", names.len(), params.len()));
    }
    let predicate = names
        .iter()
        .map(|n| column_index(table, n))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let before = table.rows.len();
    table.rows.retain(|row| {
        // `=` never matches NULL; `<=>` treats two NULLs as equal.
        !predicate
            .iter()
            .zip(params)
            .all(|(&idx, value)| (null_safe || *value != SqlValue::Null) && row[idx] == *value)
    });
    Ok((before - table.rows.len()) as u64)
}

impl Database for MockDatabase {
    fn query<'a>(
        &'a self,
        endpoint: &'a ConnectionDescriptor,
        sql: &'a str,
        params: &'a [SqlValue],
    ) -> BoxFuture<'a, Vec<Vec<SqlValue>>> {
        Box::pin(async move { self.run_query(&endpoint.endpoint(), sql, params) })
    }

    fn execute_batch<'a>(
        &'a self,
        endpoint: &'a ConnectionDescriptor,
        sql: &'a str,
        param_sets: &'a [Vec<SqlValue>],
    ) -> BoxFuture<'a, Vec<u64>> {
        Box::pin(async move {
            let endpoint = endpoint.endpoint();
            // Unreachable endpoints fail before the first statement, like a
            // refused connection.
            {
                let mut servers = self.servers.lock().unwrap();
                let server = servers.entry(endpoint.clone()).or_default();
                if server.unreachable {
                    return Err(fail(&endpoint, "connect", "connection refused"));
                }
            }
            let mut counts = Vec::with_capacity(param_sets.len());
            for params in param_sets {
                counts.push(self.run_execute(&endpoint, sql, params)?);
            }
            Ok(counts)
        })
    }
}
