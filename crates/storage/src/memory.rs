// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! An in-memory [`Database`] used by engine tests (feature `test-support`).
//!
//! Mirrors the Postgres store's CAS semantics without a real connection, so
//! `cam-engine` tests can exercise races and concurrency without
//! `testcontainers`.

use crate::database::{DepStatus, Database};
use crate::error::StoreError;
use crate::patch::TaskStatusPatch;
use async_trait::async_trait;
use cam_core::{AgentDefinition, AgentDefinitionId, SystemEvent, Task, TaskId, TaskStatus, Worker, WorkerId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    tasks: BTreeMap<String, Task>,
    workers: BTreeMap<String, Worker>,
    agent_definitions: BTreeMap<String, AgentDefinition>,
    events: Vec<SystemEvent>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_task(&self, task: Task) {
        self.inner.lock().tasks.insert(task.id.as_str().to_string(), task);
    }

    pub fn insert_agent_definition(&self, def: AgentDefinition) {
        self.inner.lock().agent_definitions.insert(def.id.as_str().to_string(), def);
    }

    pub fn tasks_snapshot(&self) -> Vec<Task> {
        self.inner.lock().tasks.values().cloned().collect()
    }

    pub fn events_snapshot(&self) -> Vec<SystemEvent> {
        self.inner.lock().events.clone()
    }
}

#[async_trait]
impl Database for MemoryStore {
    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.inner.lock().tasks.get(id.as_str()).cloned())
    }

    async fn get_task_statuses(&self, ids: &[TaskId]) -> Result<Vec<DepStatus>, StoreError> {
        let inner = self.inner.lock();
        Ok(ids
            .iter()
            .map(|id| (*id, inner.tasks.get(id.as_str()).map(|t| t.status)))
            .collect())
    }

    async fn select_waiting_tasks(&self, limit: u32) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.lock();
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.is_scheduler_managed() && t.status == TaskStatus::Waiting)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks.truncate(limit as usize);
        Ok(tasks)
    }

    async fn select_queued_tasks(&self, limit: u32) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.lock();
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.is_scheduler_managed() && t.status == TaskStatus::Queued)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.queued_at);
        tasks.truncate(limit as usize);
        Ok(tasks)
    }

    async fn select_running_tasks_page(
        &self,
        after: Option<TaskId>,
        limit: u32,
    ) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.lock();
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.is_scheduler_managed() && t.status == TaskStatus::Running)
            .filter(|t| match &after {
                Some(after) => t.id.as_str() > after.as_str(),
                None => true,
            })
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        tasks.truncate(limit as usize);
        Ok(tasks)
    }

    async fn select_running_tasks_for_worker(&self, worker_id: WorkerId) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .tasks
            .values()
            .filter(|t| {
                t.is_scheduler_managed()
                    && t.status == TaskStatus::Running
                    && t.assigned_worker_id == Some(worker_id)
            })
            .cloned()
            .collect())
    }

    async fn cas_update_task_status(
        &self,
        task_id: TaskId,
        expected_status: TaskStatus,
        expected_assigned_worker_id: Option<Option<WorkerId>>,
        next_status: TaskStatus,
        now: DateTime<Utc>,
        patch: TaskStatusPatch,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(task) = inner.tasks.get_mut(task_id.as_str()) else {
            return Ok(false);
        };
        if task.status != expected_status {
            return Ok(false);
        }
        if let Some(expected_worker) = expected_assigned_worker_id {
            if task.assigned_worker_id != expected_worker {
                return Ok(false);
            }
        }

        task.status = next_status;
        if next_status == TaskStatus::Running {
            task.started_at = Some(now);
        }
        if matches!(next_status, TaskStatus::Completed | TaskStatus::Failed) {
            task.completed_at = Some(now);
        }
        if let Some(assigned) = patch.assigned_worker_id {
            task.assigned_worker_id = assigned;
        }
        if patch.increment_retry_count {
            task.retry_count += 1;
        }
        if patch.reset_queued_at {
            task.queued_at = Some(now);
        }
        if patch.clear_started_at {
            task.started_at = None;
        }
        if patch.clear_completed_at {
            task.completed_at = None;
        }
        if let Some(summary) = patch.summary {
            task.summary = Some(summary);
        }
        if let Some(pr_url) = patch.pr_url {
            task.pr_url = Some(pr_url);
        }
        if let Some(feedback) = patch.feedback {
            task.feedback = Some(feedback);
        }
        if let Some(review_comment) = patch.review_comment {
            task.review_comment = Some(review_comment);
        }
        Ok(true)
    }

    async fn get_worker(&self, id: WorkerId) -> Result<Option<Worker>, StoreError> {
        Ok(self.inner.lock().workers.get(id.as_str()).cloned())
    }

    async fn get_workers(&self, ids: &[WorkerId]) -> Result<Vec<Worker>, StoreError> {
        let inner = self.inner.lock();
        Ok(ids.iter().filter_map(|id| inner.workers.get(id.as_str()).cloned()).collect())
    }

    async fn select_stale_busy_workers(&self, stale_before: DateTime<Utc>) -> Result<Vec<Worker>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .workers
            .values()
            .filter(|w| w.status == cam_core::WorkerStatus::Busy && w.last_heartbeat_at < stale_before)
            .cloned()
            .collect())
    }

    async fn cas_worker_offline(&self, worker_id: WorkerId, stale_before: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(worker) = inner.workers.get_mut(worker_id.as_str()) else {
            return Ok(false);
        };
        if worker.status != cam_core::WorkerStatus::Busy || worker.last_heartbeat_at >= stale_before {
            return Ok(false);
        }
        worker.status = cam_core::WorkerStatus::Offline;
        worker.current_task_id = None;
        Ok(true)
    }

    async fn upsert_worker(&self, worker: Worker) -> Result<(), StoreError> {
        self.inner.lock().workers.insert(worker.id.as_str().to_string(), worker);
        Ok(())
    }

    async fn list_eligible_workers(&self) -> Result<Vec<Worker>, StoreError> {
        Ok(self
            .inner
            .lock()
            .workers
            .values()
            .filter(|w| w.status == cam_core::WorkerStatus::Idle)
            .cloned()
            .collect())
    }

    async fn get_agent_definition(&self, id: AgentDefinitionId) -> Result<Option<AgentDefinition>, StoreError> {
        Ok(self.inner.lock().agent_definitions.get(id.as_str()).cloned())
    }

    async fn append_system_event(&self, event: SystemEvent) -> Result<(), StoreError> {
        self.inner.lock().events.push(event);
        Ok(())
    }
}
