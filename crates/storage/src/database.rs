// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! The row-level contract a relational database must honor (spec §6).
//!
//! Every mutation here is a compare-and-swap keyed on the row's current
//! status (plus, where noted, its current `assigned_worker_id`) so the
//! database — not an application-level lock — imposes the total order per
//! task described in spec §5.

use crate::error::StoreError;
use crate::patch::TaskStatusPatch;
use async_trait::async_trait;
use cam_core::{AgentDefinition, AgentDefinitionId, SystemEvent, Task, TaskId, TaskStatus, Worker, WorkerId};
use chrono::{DateTime, Utc};

/// A single dependency's resolved status, or `None` if the id has no
/// matching row ("missing", which the Dependency Gate treats as blocked).
pub type DepStatus = (TaskId, Option<TaskStatus>);

#[async_trait]
pub trait Database: Send + Sync {
    // -- Task reads --

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Batch-load dependency statuses in one query (spec §4.2).
    async fn get_task_statuses(&self, ids: &[TaskId]) -> Result<Vec<DepStatus>, StoreError>;

    /// `source=scheduler, status=waiting`, ordered by `created_at`, capped at `limit` (spec §4.3).
    async fn select_waiting_tasks(&self, limit: u32) -> Result<Vec<Task>, StoreError>;

    /// `source=scheduler, status=queued`, ordered by `queued_at`, capped at `limit` (spec §4.3).
    async fn select_queued_tasks(&self, limit: u32) -> Result<Vec<Task>, StoreError>;

    /// `source=scheduler, status=running`, paginated by id (spec §4.6).
    async fn select_running_tasks_page(
        &self,
        after: Option<TaskId>,
        limit: u32,
    ) -> Result<Vec<Task>, StoreError>;

    /// Tasks currently assigned to `worker_id` with `status=running,
    /// source=scheduler` (spec §4.5 step 2).
    async fn select_running_tasks_for_worker(&self, worker_id: WorkerId) -> Result<Vec<Task>, StoreError>;

    // -- Task transitions (all compare-and-swap) --

    /// Transition `task_id` from `expected_status` to `next_status`,
    /// applying `patch` and the auto timestamp rules (`started_at` on entry
    /// to `running`, `completed_at` on entry to `completed`/`failed`).
    ///
    /// When `expected_assigned_worker_id` is `Some`, the update additionally
    /// requires the row's current `assigned_worker_id` to match — used by
    /// the heartbeat monitor and startup recovery so a concurrent writer
    /// cannot be silently overwritten (spec §4.5, §4.6).
    ///
    /// Returns `true` iff the row was updated (i.e. the CAS won).
    #[allow(clippy::too_many_arguments)]
    async fn cas_update_task_status(
        &self,
        task_id: TaskId,
        expected_status: TaskStatus,
        expected_assigned_worker_id: Option<Option<WorkerId>>,
        next_status: TaskStatus,
        now: DateTime<Utc>,
        patch: TaskStatusPatch,
    ) -> Result<bool, StoreError>;

    // -- Workers --

    async fn get_worker(&self, id: WorkerId) -> Result<Option<Worker>, StoreError>;

    async fn get_workers(&self, ids: &[WorkerId]) -> Result<Vec<Worker>, StoreError>;

    /// `status=busy AND last_heartbeat_at < stale_before` (spec §4.5).
    async fn select_stale_busy_workers(&self, stale_before: DateTime<Utc>) -> Result<Vec<Worker>, StoreError>;

    /// CAS `busy -> offline` guarded by `last_heartbeat_at < stale_before`,
    /// so a worker whose heartbeat just arrived is not reaped (spec §4.5).
    async fn cas_worker_offline(&self, worker_id: WorkerId, stale_before: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Upsert a worker row (registration + heartbeat refresh).
    async fn upsert_worker(&self, worker: Worker) -> Result<(), StoreError>;

    async fn list_eligible_workers(&self) -> Result<Vec<Worker>, StoreError>;

    // -- Agent definitions (read-only to the core) --

    async fn get_agent_definition(&self, id: AgentDefinitionId) -> Result<Option<AgentDefinition>, StoreError>;

    // -- Audit log --

    async fn append_system_event(&self, event: SystemEvent) -> Result<(), StoreError>;
}
