// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - MySQL testcontainer setup
//! - An in-memory `Database` that records every statement
//! - Binlog event and engine helpers

pub mod containers;
pub mod fixtures;
pub mod mock_db;

#[allow(unused_imports)]
pub use containers::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use mock_db::*;
