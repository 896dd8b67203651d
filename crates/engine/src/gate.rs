// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Dependency Gate (spec §4.2): classifies a task's dependency readiness
//! and promotes/demotes it between `waiting` and `queued`.

use cam_adapters::EventBroadcaster;
use cam_core::{Clock, Event, SystemEvent, TaskId, TaskStatus};
use cam_storage::{Database, TaskStatusPatch};
use std::sync::Arc;

/// Readiness classification for a task's `depends_on` set (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Every dependency is `completed`.
    Ready,
    /// All deps exist and none is blocked, but at least one is not yet `completed`.
    Pending,
    /// Any dep is `failed`/`cancelled`, or a dep id has no matching row.
    Blocked,
}

/// Classify `depends_on` against the batch-loaded dependency statuses.
pub fn classify(dep_statuses: &[(TaskId, Option<TaskStatus>)]) -> Readiness {
    if dep_statuses.is_empty() {
        return Readiness::Ready;
    }
    if dep_statuses
        .iter()
        .any(|(_, status)| matches!(status, None | Some(TaskStatus::Failed) | Some(TaskStatus::Cancelled)))
    {
        return Readiness::Blocked;
    }
    if dep_statuses.iter().all(|(_, status)| *status == Some(TaskStatus::Completed)) {
        Readiness::Ready
    } else {
        Readiness::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitingOutcome {
    Promoted,
    Pending,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuedOutcome {
    Ready,
    Waiting,
    Blocked,
}

pub struct DependencyGate<D, B, C> {
    db: Arc<D>,
    broadcaster: Arc<B>,
    clock: C,
}

impl<D: Database, B: EventBroadcaster, C: Clock> DependencyGate<D, B, C> {
    pub fn new(db: Arc<D>, broadcaster: Arc<B>, clock: C) -> Self {
        Self { db, broadcaster, clock }
    }

    async fn dep_statuses(&self, depends_on: &[TaskId]) -> Result<Vec<(TaskId, Option<TaskStatus>)>, cam_storage::StoreError> {
        if depends_on.is_empty() {
            return Ok(Vec::new());
        }
        self.db.get_task_statuses(depends_on).await
    }

    /// `handleWaiting(taskId, dependsOn)` (spec §4.2).
    pub async fn handle_waiting(
        &self,
        task_id: TaskId,
        depends_on: &[TaskId],
    ) -> Result<WaitingOutcome, cam_storage::StoreError> {
        let dep_statuses = self.dep_statuses(depends_on).await?;
        match classify(&dep_statuses) {
            Readiness::Ready => {
                let now = self.clock.now();
                let updated = self
                    .db
                    .cas_update_task_status(task_id, TaskStatus::Waiting, None, TaskStatus::Queued, now, TaskStatusPatch { reset_queued_at: true, ..Default::default() })
                    .await?;
                if updated {
                    self.broadcaster.broadcast(Event::TaskDependenciesSatisfied {
                        task_id,
                        depends_on: depends_on.to_vec(),
                    });
                    self.db
                        .append_system_event(SystemEvent::from_event(
                            &Event::TaskDependenciesSatisfied { task_id, depends_on: depends_on.to_vec() },
                            now,
                            None,
                        ))
                        .await?;
                }
                Ok(WaitingOutcome::Promoted)
            }
            Readiness::Pending => Ok(WaitingOutcome::Pending),
            Readiness::Blocked => {
                let now = self.clock.now();
                self.db
                    .cas_update_task_status(
                        task_id,
                        TaskStatus::Waiting,
                        None,
                        TaskStatus::Cancelled,
                        now,
                        TaskStatusPatch { summary: Some("dependency_blocked".to_string()), ..Default::default() },
                    )
                    .await?;
                Ok(WaitingOutcome::Blocked)
            }
        }
    }

    /// `handleQueued(taskId, dependsOn)` (spec §4.2).
    pub async fn handle_queued(
        &self,
        task_id: TaskId,
        depends_on: &[TaskId],
    ) -> Result<QueuedOutcome, cam_storage::StoreError> {
        let dep_statuses = self.dep_statuses(depends_on).await?;
        match classify(&dep_statuses) {
            Readiness::Ready => Ok(QueuedOutcome::Ready),
            Readiness::Pending => {
                let now = self.clock.now();
                self.db
                    .cas_update_task_status(task_id, TaskStatus::Queued, None, TaskStatus::Waiting, now, TaskStatusPatch::default())
                    .await?;
                Ok(QueuedOutcome::Waiting)
            }
            Readiness::Blocked => {
                let now = self.clock.now();
                self.db
                    .cas_update_task_status(
                        task_id,
                        TaskStatus::Queued,
                        None,
                        TaskStatus::Cancelled,
                        now,
                        TaskStatusPatch { summary: Some("dependency_blocked".to_string()), ..Default::default() },
                    )
                    .await?;
                Ok(QueuedOutcome::Blocked)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_adapters::events::test_support::RecordingBroadcaster;
    use cam_core::task::test_support::TaskBuilder;
    use cam_core::FakeClock;
    use cam_storage::MemoryStore;

    fn gate() -> (DependencyGate<MemoryStore, RecordingBroadcaster, FakeClock>, Arc<MemoryStore>) {
        let db = Arc::new(MemoryStore::new());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        (DependencyGate::new(db.clone(), broadcaster, FakeClock::new()), db)
    }

    #[tokio::test]
    async fn empty_deps_is_ready() {
        assert_eq!(classify(&[]), Readiness::Ready);
    }

    #[tokio::test]
    async fn missing_dep_row_blocks() {
        let dep_id = TaskId::new();
        assert_eq!(classify(&[(dep_id, None)]), Readiness::Blocked);
    }

    #[tokio::test]
    async fn any_failed_dep_blocks_even_if_others_completed() {
        let a = TaskId::new();
        let b = TaskId::new();
        let statuses = vec![(a, Some(TaskStatus::Completed)), (b, Some(TaskStatus::Failed))];
        assert_eq!(classify(&statuses), Readiness::Blocked);
    }

    #[tokio::test]
    async fn waiting_promotes_when_dep_completes() {
        let (gate, db) = gate();
        let dep = TaskBuilder::new().status(TaskStatus::Completed).build();
        db.insert_task(dep.clone());
        let task = TaskBuilder::new().status(TaskStatus::Waiting).depends_on(vec![dep.id]).build();
        db.insert_task(task.clone());

        let outcome = gate.handle_waiting(task.id, &[dep.id]).await.unwrap();
        assert_eq!(outcome, WaitingOutcome::Promoted);
        assert_eq!(db.get_task(task.id).await.unwrap().unwrap().status, TaskStatus::Queued);
    }

    #[tokio::test]
    async fn waiting_stays_pending_while_dep_runs() {
        let (gate, db) = gate();
        let dep = TaskBuilder::new().status(TaskStatus::Running).build();
        db.insert_task(dep.clone());
        let task = TaskBuilder::new().status(TaskStatus::Waiting).depends_on(vec![dep.id]).build();
        db.insert_task(task.clone());

        let outcome = gate.handle_waiting(task.id, &[dep.id]).await.unwrap();
        assert_eq!(outcome, WaitingOutcome::Pending);
        assert_eq!(db.get_task(task.id).await.unwrap().unwrap().status, TaskStatus::Waiting);
    }

    #[tokio::test]
    async fn waiting_cancels_when_dep_blocked() {
        let (gate, db) = gate();
        let dep = TaskBuilder::new().status(TaskStatus::Failed).build();
        db.insert_task(dep.clone());
        let task = TaskBuilder::new().status(TaskStatus::Waiting).depends_on(vec![dep.id]).build();
        db.insert_task(task.clone());

        let outcome = gate.handle_waiting(task.id, &[dep.id]).await.unwrap();
        assert_eq!(outcome, WaitingOutcome::Blocked);
        assert_eq!(db.get_task(task.id).await.unwrap().unwrap().status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn queued_demotes_to_waiting_when_dep_regresses() {
        let (gate, db) = gate();
        let dep = TaskBuilder::new().status(TaskStatus::Running).build();
        db.insert_task(dep.clone());
        let task = TaskBuilder::new().status(TaskStatus::Queued).depends_on(vec![dep.id]).build();
        db.insert_task(task.clone());

        let outcome = gate.handle_queued(task.id, &[dep.id]).await.unwrap();
        assert_eq!(outcome, QueuedOutcome::Waiting);
        assert_eq!(db.get_task(task.id).await.unwrap().unwrap().status, TaskStatus::Waiting);
    }
}
