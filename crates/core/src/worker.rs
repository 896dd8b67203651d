// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! The Worker entity (spec §3).

use crate::ids::{AgentDefinitionId, TaskId, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Distinguishes container-launched workers from externally-registered
/// daemon workers (spec §9: "Worker representation").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerMode {
    Container,
    Daemon,
}

impl std::fmt::Display for WorkerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Container => "container",
            Self::Daemon => "daemon",
        })
    }
}

impl std::str::FromStr for WorkerMode {
    type Err = crate::task::InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "container" => Ok(Self::Container),
            "daemon" => Ok(Self::Daemon),
            other => Err(crate::task::InvalidEnumValue(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Draining,
    Offline,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Draining => "draining",
            Self::Offline => "offline",
        })
    }
}

impl std::str::FromStr for WorkerStatus {
    type Err = crate::task::InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "busy" => Ok(Self::Busy),
            "draining" => Ok(Self::Draining),
            "offline" => Ok(Self::Offline),
            other => Err(crate::task::InvalidEnumValue(other.to_string())),
        }
    }
}

/// A registration record for an executor (container or external daemon).
///
/// Invariant: `current_task_id.is_some() <=> status == Busy`. `Offline` is
/// sticky until a new heartbeat or explicit reactivation (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub supported_agent_ids: Vec<AgentDefinitionId>,
    pub status: WorkerStatus,
    pub current_task_id: Option<TaskId>,
    pub last_heartbeat_at: DateTime<Utc>,
    /// Names only, never values — see `EnvVarScope` precedence rule.
    pub reported_env_vars: Vec<String>,
    pub mode: WorkerMode,
}

impl Worker {
    /// Whether `current_task_id`/`status` agree, per the spec §3 invariant.
    pub fn is_consistent(&self) -> bool {
        self.current_task_id.is_some() == matches!(self.status, WorkerStatus::Busy)
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_timeout: chrono::Duration) -> bool {
        now - self.last_heartbeat_at >= stale_timeout
    }
}
