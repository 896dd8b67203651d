// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Database connection configuration.

use std::env;
use std::path::Path;
use std::time::Duration;

/// Connection settings for the Postgres-backed store.
///
/// Reads from the `CAM_DATABASE_URL` environment variable, falling back to
/// `postgresql://localhost:5432/cam` when unset.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DbConfig {
    pub const DEFAULT_URL: &'static str = "postgresql://localhost:5432/cam";

    pub fn from_env() -> Self {
        let database_url =
            env::var("CAM_DATABASE_URL").unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        Self {
            database_url,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(10),
        }
    }

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// The migrations directory shipped with this crate, resolved relative to
/// the source tree at compile time.
pub fn default_migrations_path() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/src/migrations"))
}
