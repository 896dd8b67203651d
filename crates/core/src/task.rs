// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! The Task entity and its state machine (spec §3, §4.1).

use crate::ids::{AgentDefinitionId, TaskId, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a task came from. Only `Scheduler` tasks are managed by the core;
/// `Terminal` tasks back live interactive runs and are excluded from every
/// query the engine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    Scheduler,
    Terminal,
}

impl std::fmt::Display for TaskSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Scheduler => "scheduler",
            Self::Terminal => "terminal",
        })
    }
}

impl std::str::FromStr for TaskSource {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduler" => Ok(Self::Scheduler),
            "terminal" => Ok(Self::Terminal),
            other => Err(InvalidEnumValue(other.to_string())),
        }
    }
}

/// A task's position in the state machine described in spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Waiting,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Error returned when parsing an invalid enum string read back from storage.
#[derive(Debug, Clone)]
pub struct InvalidEnumValue(pub String);

impl std::fmt::Display for InvalidEnumValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid value: {:?}", self.0)
    }
}

impl std::error::Error for InvalidEnumValue {}

impl TaskStatus {
    /// Terminal statuses never transition to another status (spec §3 invariant).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(InvalidEnumValue(other.to_string())),
        }
    }
}

/// A single unit of work a single worker must execute end-to-end.
///
/// See spec §3 for the full field list and invariants:
/// `status=running ⇒ assignedWorkerId ≠ null`; terminal statuses never
/// transition away; `retryCount ≤ maxRetries + 1` at all times; `dependsOn`
/// is acyclic (enforced at creation, not here).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    /// Used as the agent's prompt.
    pub description: String,
    pub agent_definition_id: AgentDefinitionId,
    pub repo_url: String,
    pub base_branch: String,
    pub work_branch: String,
    pub sub_directory: Option<String>,
    pub status: TaskStatus,
    pub source: TaskSource,
    /// Ids that must reach `completed` before this task becomes runnable.
    pub depends_on: Vec<TaskId>,
    /// Cohort tag; a `pipeline/`-prefixed value additionally selects a
    /// shared artifact volume (spec §4.4, §6).
    pub group_id: Option<String>,
    pub assigned_worker_id: Option<WorkerId>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pr_url: Option<String>,
    pub summary: Option<String>,
    pub feedback: Option<String>,
    pub review_comment: Option<String>,
}

impl Task {
    /// True when `group_id` selects a pipeline artifact volume (spec §4.4).
    pub fn pipeline_group(&self) -> Option<&str> {
        self.group_id.as_deref().filter(|g| g.starts_with("pipeline/"))
    }

    /// Whether this is a task the engine manages at all (spec §3: `source`).
    pub fn is_scheduler_managed(&self) -> bool {
        matches!(self.source, TaskSource::Scheduler)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;

    /// Builder for [`Task`] with sensible defaults, for unit tests.
    pub struct TaskBuilder {
        task: Task,
    }

    impl TaskBuilder {
        pub fn new() -> Self {
            let now = DateTime::<Utc>::default();
            Self {
                task: Task {
                    id: TaskId::new(),
                    title: "test task".to_string(),
                    description: "do the thing".to_string(),
                    agent_definition_id: AgentDefinitionId::new(),
                    repo_url: "https://example.test/repo.git".to_string(),
                    base_branch: "main".to_string(),
                    work_branch: "cam/test".to_string(),
                    sub_directory: None,
                    status: TaskStatus::Queued,
                    source: TaskSource::Scheduler,
                    depends_on: Vec::new(),
                    group_id: None,
                    assigned_worker_id: None,
                    retry_count: 0,
                    max_retries: 2,
                    created_at: now,
                    queued_at: Some(now),
                    started_at: None,
                    completed_at: None,
                    pr_url: None,
                    summary: None,
                    feedback: None,
                    review_comment: None,
                },
            }
        }

        pub fn status(mut self, status: TaskStatus) -> Self {
            self.task.status = status;
            self
        }

        pub fn depends_on(mut self, ids: Vec<TaskId>) -> Self {
            self.task.depends_on = ids;
            self
        }

        pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
            self.task.group_id = Some(group_id.into());
            self
        }

        pub fn max_retries(mut self, n: u32) -> Self {
            self.task.max_retries = n;
            self
        }

        pub fn agent_definition_id(mut self, id: AgentDefinitionId) -> Self {
            self.task.agent_definition_id = id;
            self
        }

        pub fn build(self) -> Task {
            self.task
        }
    }

    impl Default for TaskBuilder {
        fn default() -> Self {
            Self::new()
        }
    }
}
