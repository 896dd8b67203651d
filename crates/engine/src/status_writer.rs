// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Status Writer (spec §4.1): the only path that mutates a task's `status`
//! column.
//!
//! Every other component — the Dependency Gate, the Scheduler Tick, the
//! Heartbeat Monitor, Startup Recovery — calls through here (or through
//! [`cam_storage::Database::cas_update_task_status`] directly with the same
//! terminal-state guard already satisfied by their own CAS `expected`
//! status) rather than writing `tasks.status` themselves.

use cam_adapters::EventBroadcaster;
use cam_core::{Clock, Event, SystemEvent, Task, TaskId, TaskStatus};
use cam_storage::{Database, TaskStatusPatch};
use std::sync::Arc;

pub struct StatusWriter<D, B, C> {
    db: Arc<D>,
    broadcaster: Arc<B>,
    clock: C,
}

impl<D: Database, B: EventBroadcaster, C: Clock> StatusWriter<D, B, C> {
    pub fn new(db: Arc<D>, broadcaster: Arc<B>, clock: C) -> Self {
        Self { db, broadcaster, clock }
    }

    /// `updateTaskStatus(taskId, nextStatus, extra?)` (spec §4.1).
    ///
    /// A no-op if the current status is terminal and differs from
    /// `next_status` — this is the guard that stops a late-arriving write
    /// from resurrecting an already-cancelled task. Otherwise CAS from the
    /// row's current status; a zero-rowcount result (someone else moved it
    /// first) is treated as success.
    pub async fn update_task_status(
        &self,
        task_id: TaskId,
        next_status: TaskStatus,
        patch: TaskStatusPatch,
    ) -> Result<(), cam_storage::StoreError> {
        let Some(task) = self.db.get_task(task_id).await? else {
            return Ok(());
        };
        if task.status.is_terminal() && task.status != next_status {
            return Ok(());
        }

        let now = self.clock.now();
        let extra = patch.extra_payload();
        let updated = self
            .db
            .cas_update_task_status(task_id, task.status, None, next_status, now, patch)
            .await?;
        if !updated {
            return Ok(());
        }

        let progress = Event::TaskProgress { task_id, status: next_status };
        self.broadcaster.broadcast(progress.clone());

        // `SystemEvent::payload` merges `{taskId, status}` with `extra`
        // (spec §4.1) so the audit record carries the reason/fields the
        // patch set (e.g. `mark_failed`'s summary), not just the bare
        // status transition.
        let mut event = SystemEvent::from_event(&progress, now, None);
        if let serde_json::Value::Object(obj) = &mut event.payload {
            obj.extend(extra);
        }
        self.db.append_system_event(event).await?;
        Ok(())
    }

    /// The reject-and-rerun flow (external review endpoint, spec §4.1:
    /// "Awaiting-review and reject-and-rerun flows ... must go through the
    /// Status Writer and respect the same terminal-state guard"): re-queues
    /// a task with reviewer feedback attached.
    pub async fn reject_and_rerun(
        &self,
        task_id: TaskId,
        review_comment: impl Into<String>,
    ) -> Result<(), cam_storage::StoreError> {
        let patch = TaskStatusPatch { review_comment: Some(review_comment.into()), ..TaskStatusPatch::retry() };
        self.update_task_status(task_id, TaskStatus::Queued, patch).await
    }

    /// External cancellation (spec §5: "writes the task to `cancelled` via
    /// the Status Writer (respecting the terminal guard)").
    pub async fn cancel(&self, task_id: TaskId) -> Result<(), cam_storage::StoreError> {
        self.update_task_status(task_id, TaskStatus::Cancelled, TaskStatusPatch::default()).await
    }

    pub async fn mark_failed(
        &self,
        task_id: TaskId,
        summary: impl Into<String>,
    ) -> Result<(), cam_storage::StoreError> {
        let patch = TaskStatusPatch { assigned_worker_id: Some(None), ..TaskStatusPatch::default() }
            .with_summary(summary);
        self.update_task_status(task_id, TaskStatus::Failed, patch).await
    }

    pub async fn get_task(&self, task_id: TaskId) -> Result<Option<Task>, cam_storage::StoreError> {
        self.db.get_task(task_id).await
    }
}
