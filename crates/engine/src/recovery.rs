// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Startup Recovery (spec §4.6): runs once at process boot, before the
//! first tick, and reconciles `running` tasks left behind by an unclean
//! shutdown.

use cam_adapters::EventBroadcaster;
use cam_core::{Clock, Event, SystemEvent, Task, TaskStatus, Worker};
use cam_storage::{Database, TaskStatusPatch};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

const PAGE_SIZE: u32 = 500;

#[derive(Debug, Default, Clone, Copy)]
pub struct RecoverySummary {
    pub scanned: u64,
    pub recovered_to_queued: u64,
    pub marked_failed: u64,
}

pub struct StartupRecovery<D, B, C> {
    db: Arc<D>,
    broadcaster: Arc<B>,
    clock: C,
    stale_timeout: chrono::Duration,
}

impl<D: Database, B: EventBroadcaster, C: Clock> StartupRecovery<D, B, C> {
    pub fn new(db: Arc<D>, broadcaster: Arc<B>, clock: C, stale_timeout: chrono::Duration) -> Self {
        Self { db, broadcaster, clock, stale_timeout }
    }

    pub async fn run(&self) -> Result<RecoverySummary, cam_storage::StoreError> {
        let now = self.clock.now();
        let stale_before = now - self.stale_timeout;
        let mut summary = RecoverySummary::default();
        let mut after = None;

        loop {
            let page = self.db.select_running_tasks_page(after, PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }
            summary.scanned += page.len() as u64;

            let worker_ids: Vec<_> = page.iter().filter_map(|t| t.assigned_worker_id).collect();
            let workers = self.db.get_workers(&worker_ids).await?;
            let workers_by_id: HashMap<_, _> = workers.into_iter().map(|w| (w.id, w)).collect();

            let last = page.last().map(|t| t.id);
            for task in page {
                self.recover_one(&task, &workers_by_id, now, stale_before, &mut summary).await?;
            }
            after = last;
        }

        info!(
            scanned = summary.scanned,
            recovered_to_queued = summary.recovered_to_queued,
            marked_failed = summary.marked_failed,
            "startup recovery complete"
        );
        Ok(summary)
    }

    async fn recover_one(
        &self,
        task: &Task,
        workers_by_id: &HashMap<cam_core::WorkerId, Worker>,
        now: chrono::DateTime<chrono::Utc>,
        stale_before: chrono::DateTime<chrono::Utc>,
        summary: &mut RecoverySummary,
    ) -> Result<(), cam_storage::StoreError> {
        let worker_alive = task
            .assigned_worker_id
            .and_then(|id| workers_by_id.get(&id))
            .is_some_and(|w| {
                w.status == cam_core::WorkerStatus::Busy
                    && w.current_task_id == Some(task.id)
                    && w.last_heartbeat_at >= stale_before
            });

        if worker_alive {
            return Ok(());
        }

        if task.retry_count < task.max_retries {
            let updated = self
                .db
                .cas_update_task_status(
                    task.id,
                    TaskStatus::Running,
                    Some(task.assigned_worker_id),
                    TaskStatus::Queued,
                    now,
                    TaskStatusPatch::retry(),
                )
                .await?;
            if updated {
                summary.recovered_to_queued += 1;
                self.db
                    .append_system_event(SystemEvent::from_event(
                        &Event::TaskRecoveredAfterRestart {
                            task_id: task.id,
                            previous_status: TaskStatus::Running,
                            retry_count: task.retry_count + 1,
                            max_retries: task.max_retries,
                            reason: "orphaned_after_restart".to_string(),
                        },
                        now,
                        None,
                    ))
                    .await?;
                self.broadcaster.broadcast(Event::TaskRecoveredAfterRestart {
                    task_id: task.id,
                    previous_status: TaskStatus::Running,
                    retry_count: task.retry_count + 1,
                    max_retries: task.max_retries,
                    reason: "orphaned_after_restart".to_string(),
                });
            }
        } else {
            let patch = TaskStatusPatch { assigned_worker_id: Some(None), ..Default::default() };
            let updated = self
                .db
                .cas_update_task_status(
                    task.id,
                    TaskStatus::Running,
                    Some(task.assigned_worker_id),
                    TaskStatus::Failed,
                    now,
                    patch,
                )
                .await?;
            if updated {
                summary.marked_failed += 1;
                self.db
                    .append_system_event(SystemEvent::from_event(
                        &Event::TaskRecoveryFailedAfterRestart {
                            task_id: task.id,
                            previous_status: TaskStatus::Running,
                            retry_count: task.retry_count,
                            max_retries: task.max_retries,
                            reason: "orphaned_after_restart_retries_exhausted".to_string(),
                        },
                        now,
                        None,
                    ))
                    .await?;
                self.broadcaster.broadcast(Event::TaskRecoveryFailedAfterRestart {
                    task_id: task.id,
                    previous_status: TaskStatus::Running,
                    retry_count: task.retry_count,
                    max_retries: task.max_retries,
                    reason: "orphaned_after_restart_retries_exhausted".to_string(),
                });
            }
        }
        Ok(())
    }
}
