// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Raw row shapes and their conversion into domain types.
//!
//! Domain enums implement `Display`/`FromStr` rather than `sqlx::Type` (they
//! live in `cam-core`, which does not depend on `sqlx`), so every row is
//! fetched into a plain-string shape here and parsed by hand.

use crate::error::StoreError;
use cam_core::{
    AgentDefinition, AgentDefinitionId, EnvVarSpec, ResourceLimits, Task, TaskId, TaskSource,
    TaskStatus, Worker, WorkerId, WorkerMode, WorkerStatus,
};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(FromRow)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub agent_definition_id: String,
    pub repo_url: String,
    pub base_branch: String,
    pub work_branch: String,
    pub sub_directory: Option<String>,
    pub status: String,
    pub source: String,
    pub depends_on: serde_json::Value,
    pub group_id: Option<String>,
    pub assigned_worker_id: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pr_url: Option<String>,
    pub summary: Option<String>,
    pub feedback: Option<String>,
    pub review_comment: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let depends_on: Vec<String> = serde_json::from_value(row.depends_on).unwrap_or_default();
        Ok(Task {
            id: TaskId::from(row.id.as_str()),
            title: row.title,
            description: row.description,
            agent_definition_id: AgentDefinitionId::from(row.agent_definition_id.as_str()),
            repo_url: row.repo_url,
            base_branch: row.base_branch,
            work_branch: row.work_branch,
            sub_directory: row.sub_directory,
            status: row.status.parse::<TaskStatus>()?,
            source: row.source.parse::<TaskSource>()?,
            depends_on: depends_on.iter().map(|s| TaskId::from(s.as_str())).collect(),
            group_id: row.group_id,
            assigned_worker_id: row.assigned_worker_id.map(|s| WorkerId::from(s.as_str())),
            retry_count: row.retry_count.max(0) as u32,
            max_retries: row.max_retries.max(0) as u32,
            created_at: row.created_at,
            queued_at: row.queued_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            pr_url: row.pr_url,
            summary: row.summary,
            feedback: row.feedback,
            review_comment: row.review_comment,
        })
    }
}

#[derive(FromRow)]
pub struct WorkerRow {
    pub id: String,
    pub supported_agent_ids: serde_json::Value,
    pub status: String,
    pub current_task_id: Option<String>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub reported_env_vars: serde_json::Value,
    pub mode: String,
}

impl TryFrom<WorkerRow> for Worker {
    type Error = StoreError;

    fn try_from(row: WorkerRow) -> Result<Self, Self::Error> {
        let supported: Vec<String> = serde_json::from_value(row.supported_agent_ids).unwrap_or_default();
        let reported: Vec<String> = serde_json::from_value(row.reported_env_vars).unwrap_or_default();
        Ok(Worker {
            id: WorkerId::from(row.id.as_str()),
            supported_agent_ids: supported.iter().map(|s| AgentDefinitionId::from(s.as_str())).collect(),
            status: row.status.parse::<WorkerStatus>()?,
            current_task_id: row.current_task_id.map(|s| TaskId::from(s.as_str())),
            last_heartbeat_at: row.last_heartbeat_at,
            reported_env_vars: reported,
            mode: row.mode.parse::<WorkerMode>()?,
        })
    }
}

#[derive(FromRow)]
pub struct AgentDefinitionRow {
    pub id: String,
    pub display_name: String,
    pub docker_image: String,
    pub command: String,
    pub args: serde_json::Value,
    pub required_env_vars: serde_json::Value,
    pub default_resource_limits: serde_json::Value,
}

impl TryFrom<AgentDefinitionRow> for AgentDefinition {
    type Error = StoreError;

    fn try_from(row: AgentDefinitionRow) -> Result<Self, Self::Error> {
        let args: Vec<String> = serde_json::from_value(row.args).unwrap_or_default();
        let required_env_vars: Vec<EnvVarSpec> =
            serde_json::from_value(row.required_env_vars).unwrap_or_default();
        let default_resource_limits: ResourceLimits =
            serde_json::from_value(row.default_resource_limits).unwrap_or_default();
        Ok(AgentDefinition {
            id: AgentDefinitionId::from(row.id.as_str()),
            display_name: row.display_name,
            docker_image: row.docker_image,
            command: row.command,
            args,
            required_env_vars,
            default_resource_limits,
        })
    }
}
