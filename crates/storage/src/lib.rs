// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! cam-storage: the relational persistence layer for tasks, workers, and
//! agent definitions.
//!
//! [`Database`] is the contract the engine programs against; [`PgStore`] is
//! the Postgres implementation and [`MemoryStore`] (behind `test-support`)
//! is an in-process double used by engine unit tests.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod database;
pub mod error;
pub mod patch;
pub mod pg;
pub mod rows;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use config::DbConfig;
pub use database::{DepStatus, Database};
pub use error::StoreError;
pub use patch::TaskStatusPatch;
pub use pg::PgStore;

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryStore;
