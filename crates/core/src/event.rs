// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! The stable event catalog (spec §6) plus the append-only `SystemEvent`
//! audit record (spec §3).
//!
//! `Event` is the typed payload handed to `EventBroadcaster::broadcast` and
//! serialized into `SystemEvent::payload` for `appendSystemEvent`. Event
//! names and payload shapes are a stable external contract — see spec §6's
//! table — so new variants are additive only.

use crate::ids::{AgentDefinitionId, TaskId, WorkerId};
use crate::task::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// Events the engine publishes. Serializes as `{"type": "task.queued", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "task.queued")]
    TaskQueued { task_id: TaskId, title: String },

    #[serde(rename = "task.waiting")]
    TaskWaiting { task_id: TaskId, title: String },

    #[serde(rename = "task.progress")]
    TaskProgress { task_id: TaskId, status: TaskStatus },

    #[serde(rename = "task.started")]
    TaskStarted { task_id: TaskId, worker_id: WorkerId, agent_definition_id: AgentDefinitionId },

    #[serde(rename = "task.dependencies_satisfied")]
    TaskDependenciesSatisfied { task_id: TaskId, depends_on: Vec<TaskId> },

    #[serde(rename = "task.recovered_after_restart")]
    TaskRecoveredAfterRestart {
        task_id: TaskId,
        previous_status: TaskStatus,
        retry_count: u32,
        max_retries: u32,
        reason: String,
    },

    #[serde(rename = "task.recovery_failed_after_restart")]
    TaskRecoveryFailedAfterRestart {
        task_id: TaskId,
        previous_status: TaskStatus,
        retry_count: u32,
        max_retries: u32,
        reason: String,
    },

    #[serde(rename = "worker.offline")]
    WorkerOffline { worker_id: WorkerId },

    #[serde(rename = "alert.triggered")]
    AlertTriggered { message: String, severity: AlertSeverity },
}

impl Event {
    /// The stable dotted event name, as published over `broadcast`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TaskQueued { .. } => "task.queued",
            Self::TaskWaiting { .. } => "task.waiting",
            Self::TaskProgress { .. } => "task.progress",
            Self::TaskStarted { .. } => "task.started",
            Self::TaskDependenciesSatisfied { .. } => "task.dependencies_satisfied",
            Self::TaskRecoveredAfterRestart { .. } => "task.recovered_after_restart",
            Self::TaskRecoveryFailedAfterRestart { .. } => "task.recovery_failed_after_restart",
            Self::WorkerOffline { .. } => "worker.offline",
            Self::AlertTriggered { .. } => "alert.triggered",
        }
    }

    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::TaskQueued { task_id, .. }
            | Self::TaskWaiting { task_id, .. }
            | Self::TaskProgress { task_id, .. }
            | Self::TaskStarted { task_id, .. }
            | Self::TaskDependenciesSatisfied { task_id, .. }
            | Self::TaskRecoveredAfterRestart { task_id, .. }
            | Self::TaskRecoveryFailedAfterRestart { task_id, .. } => Some(*task_id),
            Self::WorkerOffline { .. } | Self::AlertTriggered { .. } => None,
        }
    }
}

/// Append-only audit record. Never read back by the core itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub actor: Option<String>,
}

impl SystemEvent {
    pub fn from_event(event: &Event, timestamp: DateTime<Utc>, actor: Option<String>) -> Self {
        Self {
            kind: event.kind().to_string(),
            payload: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
            timestamp,
            actor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_matches_wire_name() {
        let event = Event::WorkerOffline { worker_id: WorkerId::new() };
        assert_eq!(event.kind(), "worker.offline");
        let json = serde_json::to_value(&event).expect("serializes");
        assert_eq!(json["type"], "worker.offline");
    }

    #[test]
    fn task_events_carry_task_id() {
        let task_id = TaskId::new();
        let event = Event::TaskQueued { task_id, title: "t".to_string() };
        assert_eq!(event.task_id(), Some(task_id));
    }
}
