// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Testcontainers setup for MySQL.
//!
//! The official image enables the binary log by default (server id 1), so
//! one container can act as master, slave, or both.

#![allow(dead_code)]

use binlog_replicator::config::ConnectionDescriptor;
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

pub const MYSQL_ROOT_PASSWORD: &str = "replicator";

/// Create a MySQL 8 container.
///
/// The entrypoint starts a temporary server on port 0 while initializing,
/// so wait for the line naming port 3306.
pub fn mysql_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("mysql", "8.0")
        .with_env_var("MYSQL_ROOT_PASSWORD", MYSQL_ROOT_PASSWORD)
        .with_exposed_port(3306)
        .with_wait_for(WaitFor::message_on_stderr("port: 3306  MySQL Community Server"));
    docker.run(image)
}

/// Root descriptor for a running container.
pub fn mysql_descriptor(container: &Container<'_, GenericImage>, server_id: u32) -> ConnectionDescriptor {
    let port = container.get_host_port_ipv4(3306);
    ConnectionDescriptor::new("127.0.0.1", port, "root", MYSQL_ROOT_PASSWORD, server_id)
}

/// A MySQL server kept alive for the test's duration.
pub struct TestServer<'a> {
    #[allow(dead_code)] // Kept alive for container lifetime
    container: Container<'a, GenericImage>,
    pub descriptor: ConnectionDescriptor,
}

impl<'a> TestServer<'a> {
    pub fn new(docker: &'a Cli, server_id: u32) -> Self {
        let container = mysql_container(docker);
        let descriptor = mysql_descriptor(&container, server_id);
        Self {
            container,
            descriptor,
        }
    }
}
