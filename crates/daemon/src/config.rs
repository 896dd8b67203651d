// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Daemon configuration: environment defaults overridden by CLI flags,
//! mirroring the host daemon's `Config::load` (spec §6, SPEC_FULL.md §6).

use clap::{Parser, ValueEnum};
use std::time::Duration;

const DEFAULT_STALE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_DOCKER_SOCKET_PATH: &str = "/var/run/docker.sock";
const DEFAULT_TICK_INTERVAL_MS: u64 = 2_000;
const DEFAULT_DATABASE_URL: &str = "postgresql://localhost:5432/cam";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "camd", about = "Coding-agent task scheduler and worker lifecycle daemon")]
pub struct Cli {
    /// Postgres connection string (overrides `DATABASE_URL`/`CAM_DATABASE_URL`).
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Scheduler tick period in milliseconds.
    #[arg(long)]
    pub tick_interval: Option<u64>,

    /// Path to a config file (reserved; environment variables are authoritative today).
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,

    /// Log output format.
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub worker_stale_timeout: chrono::Duration,
    pub docker_socket_path: String,
    pub api_server_url: Option<String>,
    pub auth_token: Option<String>,
    pub tick_interval: Duration,
    pub log_format: LogFormat,
}

impl Config {
    /// Reads `WORKER_STALE_TIMEOUT_MS`, `DOCKER_SOCKET_PATH`, `API_SERVER_URL`,
    /// `CAM_AUTH_TOKEN`, and `DATABASE_URL`/`CAM_DATABASE_URL` (spec §6), then
    /// applies `cli` overrides on top.
    pub fn load(cli: &Cli) -> Self {
        let database_url = cli
            .database_url
            .clone()
            .or_else(|| std::env::var("CAM_DATABASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let worker_stale_timeout_ms = std::env::var("WORKER_STALE_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(DEFAULT_STALE_TIMEOUT_MS as i64);

        let docker_socket_path =
            std::env::var("DOCKER_SOCKET_PATH").unwrap_or_else(|_| DEFAULT_DOCKER_SOCKET_PATH.to_string());

        let api_server_url = std::env::var("API_SERVER_URL").ok();
        let auth_token = std::env::var("CAM_AUTH_TOKEN").ok().filter(|s| !s.is_empty());

        let tick_interval_ms = cli
            .tick_interval
            .or_else(|| std::env::var("CAM_TICK_INTERVAL_MS").ok().and_then(|s| s.parse().ok()))
            .unwrap_or(DEFAULT_TICK_INTERVAL_MS);

        let log_format = cli.log_format.unwrap_or_else(|| {
            match std::env::var("CAM_LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Text,
            }
        });

        Self {
            database_url,
            worker_stale_timeout: chrono::Duration::milliseconds(worker_stale_timeout_ms),
            docker_socket_path,
            api_server_url,
            auth_token,
            tick_interval: Duration::from_millis(tick_interval_ms),
            log_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_tick_interval_overrides_default() {
        let cli = Cli { database_url: None, tick_interval: Some(500), config: None, log_format: None };
        let config = Config::load(&cli);
        assert_eq!(config.tick_interval, Duration::from_millis(500));
    }

    #[test]
    fn cli_database_url_overrides_env() {
        let cli = Cli {
            database_url: Some("postgresql://example.test/cam".to_string()),
            tick_interval: None,
            config: None,
            log_format: None,
        };
        let config = Config::load(&cli);
        assert_eq!(config.database_url, "postgresql://example.test/cam");
    }
}
