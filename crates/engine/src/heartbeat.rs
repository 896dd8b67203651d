// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Heartbeat Monitor (spec §4.5): detects workers whose heartbeat has gone
//! stale, marks them offline, and recovers their in-flight tasks.

use cam_adapters::EventBroadcaster;
use cam_core::{AlertSeverity, Clock, Event, SystemEvent, TaskStatus};
use cam_storage::{Database, TaskStatusPatch};
use std::sync::Arc;
use tracing::{info, warn};

pub struct HeartbeatMonitor<D, B, C> {
    db: Arc<D>,
    broadcaster: Arc<B>,
    clock: C,
    stale_timeout: chrono::Duration,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HeartbeatSummary {
    pub workers_reaped: u32,
    pub tasks_requeued: u32,
    pub tasks_failed: u32,
}

impl<D: Database, B: EventBroadcaster, C: Clock> HeartbeatMonitor<D, B, C> {
    pub fn new(db: Arc<D>, broadcaster: Arc<B>, clock: C, stale_timeout: chrono::Duration) -> Self {
        Self { db, broadcaster, clock, stale_timeout }
    }

    /// Runs the full check described in spec §4.5: reap stale workers, then
    /// apply the stale-task retry-or-fail policy to whatever was assigned
    /// to them.
    pub async fn run_once(&self) -> Result<HeartbeatSummary, cam_storage::StoreError> {
        let now = self.clock.now();
        let stale_before = now - self.stale_timeout;
        let mut summary = HeartbeatSummary::default();

        let stale_workers = self.db.select_stale_busy_workers(stale_before).await?;
        for worker in stale_workers {
            let reaped = self.db.cas_worker_offline(worker.id, stale_before).await?;
            if !reaped {
                // Heartbeat arrived between the select and the CAS; leave it.
                continue;
            }
            summary.workers_reaped += 1;

            self.broadcaster.broadcast(Event::WorkerOffline { worker_id: worker.id });
            self.db
                .append_system_event(SystemEvent::from_event(
                    &Event::WorkerOffline { worker_id: worker.id },
                    now,
                    None,
                ))
                .await?;
            self.broadcaster.broadcast(Event::AlertTriggered {
                message: format!("worker {} went offline (stale heartbeat)", worker.id),
                severity: AlertSeverity::Warning,
            });
            info!(worker_id = %worker.id, "worker reaped for stale heartbeat");

            let orphaned = self.db.select_running_tasks_for_worker(worker.id).await?;
            for task in orphaned {
                if task.retry_count < task.max_retries {
                    let patch = TaskStatusPatch::retry();
                    let updated = self
                        .db
                        .cas_update_task_status(
                            task.id,
                            TaskStatus::Running,
                            Some(Some(worker.id)),
                            TaskStatus::Queued,
                            now,
                            patch,
                        )
                        .await?;
                    if updated {
                        summary.tasks_requeued += 1;
                        self.db
                            .append_system_event(SystemEvent::from_event(
                                &Event::TaskRecoveredAfterRestart {
                                    task_id: task.id,
                                    previous_status: TaskStatus::Running,
                                    retry_count: task.retry_count + 1,
                                    max_retries: task.max_retries,
                                    reason: "worker_heartbeat_stale".to_string(),
                                },
                                now,
                                None,
                            ))
                            .await?;
                    }
                } else {
                    let patch = TaskStatusPatch { assigned_worker_id: Some(None), ..Default::default() };
                    let updated = self
                        .db
                        .cas_update_task_status(
                            task.id,
                            TaskStatus::Running,
                            Some(Some(worker.id)),
                            TaskStatus::Failed,
                            now,
                            patch,
                        )
                        .await?;
                    if updated {
                        summary.tasks_failed += 1;
                        warn!(task_id = %task.id, "task failed after exhausting retries on stale worker");
                    }
                }
            }
        }

        Ok(summary)
    }
}
