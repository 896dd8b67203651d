// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Scheduler Tick (spec §4.3): the periodic control loop that promotes
//! waiting tasks, drains the queue, claims and launches tasks, and checks
//! heartbeats.

use crate::gate::DependencyGate;
use crate::heartbeat::{HeartbeatMonitor, HeartbeatSummary};
use crate::launcher::{LaunchContext, WorkerLauncher};
use crate::suppression::LogSuppressor;
use cam_adapters::{ContainerRuntime, EventBroadcaster, SecretResolver};
use cam_core::{Clock, EnvVarScope, Task, TaskId, TaskStatus, WorkerId};
use cam_storage::{Database, TaskStatusPatch};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::{error, warn};

pub const WAITING_BATCH_SIZE: u32 = 50;
pub const QUEUED_BATCH_SIZE: u32 = 20;

#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    pub promoted: u32,
    pub claimed: u32,
    pub launch_failures: u32,
    pub skipped_missing_env: u32,
    pub heartbeat: HeartbeatSummary,
}

/// Per-task result of a single `drain_one` call, merged into [`TickSummary`]
/// once its concurrent future resolves.
#[derive(Debug, Default, Clone, Copy)]
struct DrainOutcome {
    claimed: u32,
    launch_failures: u32,
    skipped_missing_env: u32,
}

pub struct SchedulerTick<D, R, S, B, C> {
    db: Arc<D>,
    runtime: Option<Arc<R>>,
    secrets: Arc<S>,
    broadcaster: Arc<B>,
    clock: C,
    context: LaunchContext,
    stale_timeout: chrono::Duration,
    suppressor: LogSuppressor,
}

impl<D, R, S, B, C> SchedulerTick<D, R, S, B, C>
where
    D: Database,
    R: ContainerRuntime,
    S: SecretResolver,
    B: EventBroadcaster,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<D>,
        runtime: Option<Arc<R>>,
        secrets: Arc<S>,
        broadcaster: Arc<B>,
        clock: C,
        context: LaunchContext,
        stale_timeout: chrono::Duration,
    ) -> Self {
        Self { db, runtime, secrets, broadcaster, clock, context, stale_timeout, suppressor: LogSuppressor::new() }
    }

    /// Runs one full tick: promote → drain → heartbeat check (spec §4.3).
    ///
    /// A transient failure on one task (spec §7: "uncaught inside the
    /// per-task loop, logged; tick moves on") is logged and skipped rather
    /// than aborting the rest of the batch; only a failure selecting the
    /// batch itself propagates.
    pub async fn run_once(&self) -> Result<TickSummary, cam_storage::StoreError> {
        let mut summary = TickSummary::default();

        let gate = DependencyGate::new(self.db.clone(), self.broadcaster.clone(), self.clock.clone());

        let waiting = self.db.select_waiting_tasks(WAITING_BATCH_SIZE).await?;
        for task in waiting {
            match gate.handle_waiting(task.id, &task.depends_on).await {
                Ok(outcome) if outcome == crate::gate::WaitingOutcome::Promoted => summary.promoted += 1,
                Ok(_) => {}
                Err(e) => warn!(task_id = %task.id, error = %e, "dependency gate check failed, will retry next tick"),
            }
        }

        // Bounded by the queued batch size itself (spec §5: bounded per-task
        // fan-out via a worker pool), so no separate concurrency cap is needed.
        let queued = self.db.select_queued_tasks(QUEUED_BATCH_SIZE).await?;
        let mut drains: FuturesUnordered<_> = queued
            .into_iter()
            .map(|task| async move {
                let task_id = task.id;
                (task_id, self.drain_one(task, &gate).await)
            })
            .collect();
        while let Some((task_id, result)) = drains.next().await {
            match result {
                Ok(outcome) => {
                    summary.claimed += outcome.claimed;
                    summary.launch_failures += outcome.launch_failures;
                    summary.skipped_missing_env += outcome.skipped_missing_env;
                }
                Err(e) => warn!(task_id = %task_id, error = %e, "draining queued task failed, will retry next tick"),
            }
        }

        summary.heartbeat = self.check_heartbeats().await?;

        Ok(summary)
    }

    async fn drain_one(
        &self,
        task: Task,
        gate: &DependencyGate<D, B, C>,
    ) -> Result<DrainOutcome, cam_storage::StoreError> {
        let mut outcome = DrainOutcome::default();

        let queued_outcome = gate.handle_queued(task.id, &task.depends_on).await?;
        if queued_outcome != crate::gate::QueuedOutcome::Ready {
            return Ok(outcome);
        }

        let Some(runtime) = &self.runtime else {
            // No container runtime available: leave it queued rather than failing it.
            return Ok(outcome);
        };

        let Some(agent_def) = self.db.get_agent_definition(task.agent_definition_id).await? else {
            self.fail_task(task.id, "agent definition not found").await?;
            return Ok(outcome);
        };

        let scope = EnvVarScope::new(None, Some(task.repo_url.clone()), Some(agent_def.id));
        for name in agent_def.required_env_var_names() {
            if self.secrets.resolve_env_var(name, &scope).await.is_none() {
                if self.suppressor.should_log(task.id, self.clock.now()) {
                    warn!(task_id = %task.id, env_var = name, "required env var unavailable, leaving task queued");
                }
                outcome.skipped_missing_env += 1;
                return Ok(outcome);
            }
        }

        let worker_id = derive_worker_id(task.id);
        let now = self.clock.now();
        let claimed = self
            .db
            .cas_update_task_status(
                task.id,
                TaskStatus::Queued,
                None,
                TaskStatus::Running,
                now,
                TaskStatusPatch::assign_worker(worker_id),
            )
            .await?;
        if !claimed {
            return Ok(outcome);
        }
        outcome.claimed += 1;

        let launcher = WorkerLauncher::new(
            self.db.clone(),
            runtime.clone(),
            self.secrets.clone(),
            self.broadcaster.clone(),
            self.clock.clone(),
            self.context.clone(),
        );
        if let Err(e) = launcher.launch(&task, &agent_def, worker_id).await {
            error!(task_id = %task.id, error = %e, "worker launch failed");
            outcome.launch_failures += 1;
            self.fail_task(task.id, format!("launch failed: {e}")).await?;
        }

        Ok(outcome)
    }

    async fn fail_task(&self, task_id: TaskId, summary: impl Into<String>) -> Result<(), cam_storage::StoreError> {
        let now = self.clock.now();
        let patch = TaskStatusPatch { assigned_worker_id: Some(None), ..Default::default() }.with_summary(summary);
        self.db
            .cas_update_task_status(task_id, TaskStatus::Running, None, TaskStatus::Failed, now, patch.clone())
            .await?;
        // The task may still be `queued` (agent definition missing before claim).
        self.db
            .cas_update_task_status(task_id, TaskStatus::Queued, None, TaskStatus::Failed, now, patch)
            .await?;
        Ok(())
    }

    async fn check_heartbeats(&self) -> Result<HeartbeatSummary, cam_storage::StoreError> {
        let monitor = HeartbeatMonitor::new(self.db.clone(), self.broadcaster.clone(), self.clock.clone(), self.stale_timeout);
        monitor.run_once().await
    }
}

/// `workerId = "worker-" + firstEightCharsOf(taskId)` (spec §4.3 step 2e).
pub fn derive_worker_id(task_id: TaskId) -> WorkerId {
    let short = cam_core::id::short(task_id.as_str(), 8);
    WorkerId::from_string(format!("worker-{short}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_adapters::container::test_support::FakeContainerRuntime;
    use cam_adapters::events::test_support::RecordingBroadcaster;
    use cam_adapters::LayeredSecretResolver;
    use cam_core::agent_definition::test_support::agent_definition;
    use cam_core::task::test_support::TaskBuilder;
    use cam_core::{AgentDefinitionId, FakeClock};
    use cam_storage::MemoryStore;

    type TestTick = SchedulerTick<MemoryStore, FakeContainerRuntime, LayeredSecretResolver, RecordingBroadcaster, FakeClock>;

    fn tick_with_runtime() -> (TestTick, Arc<MemoryStore>, Arc<FakeContainerRuntime>) {
        let db = Arc::new(MemoryStore::new());
        let runtime = Arc::new(FakeContainerRuntime::new());
        let secrets = Arc::new(LayeredSecretResolver::new());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        (
            SchedulerTick::new(
                db.clone(),
                Some(runtime.clone()),
                secrets,
                broadcaster,
                FakeClock::new(),
                LaunchContext::default(),
                chrono::Duration::seconds(30),
            ),
            db,
            runtime,
        )
    }

    #[tokio::test]
    async fn claims_and_launches_a_ready_queued_task() {
        let (tick, db, runtime) = tick_with_runtime();
        let agent_id = AgentDefinitionId::new();
        db.insert_agent_definition(agent_definition(agent_id, &[]));
        let task = TaskBuilder::new().agent_definition_id(agent_id).build();
        db.insert_task(task.clone());

        let summary = tick.run_once().await.unwrap();
        assert_eq!(summary.claimed, 1);
        assert_eq!(runtime.started().len(), 1);

        let reloaded = db.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Running);
        assert!(reloaded.assigned_worker_id.is_some());
    }

    #[tokio::test]
    async fn missing_agent_definition_fails_the_task() {
        let (tick, db, _runtime) = tick_with_runtime();
        let task = TaskBuilder::new().agent_definition_id(AgentDefinitionId::new()).build();
        db.insert_task(task.clone());

        tick.run_once().await.unwrap();

        assert_eq!(db.get_task(task.id).await.unwrap().unwrap().status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn no_runtime_leaves_task_queued() {
        let db = Arc::new(MemoryStore::new());
        let secrets = Arc::new(LayeredSecretResolver::new());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let tick: SchedulerTick<MemoryStore, FakeContainerRuntime, LayeredSecretResolver, RecordingBroadcaster, FakeClock> =
            SchedulerTick::new(db.clone(), None, secrets, broadcaster, FakeClock::new(), LaunchContext::default(), chrono::Duration::seconds(30));

        let agent_id = AgentDefinitionId::new();
        db.insert_agent_definition(agent_definition(agent_id, &[]));
        let task = TaskBuilder::new().agent_definition_id(agent_id).build();
        db.insert_task(task.clone());

        tick.run_once().await.unwrap();
        assert_eq!(db.get_task(task.id).await.unwrap().unwrap().status, TaskStatus::Queued);
    }

    #[tokio::test]
    async fn missing_required_secret_keeps_task_queued() {
        let (tick, db, _runtime) = tick_with_runtime();
        let agent_id = AgentDefinitionId::new();
        db.insert_agent_definition(agent_definition(agent_id, &["OPENAI_API_KEY"]));
        let task = TaskBuilder::new().agent_definition_id(agent_id).build();
        db.insert_task(task.clone());

        let summary = tick.run_once().await.unwrap();
        assert_eq!(summary.skipped_missing_env, 1);
        assert_eq!(db.get_task(task.id).await.unwrap().unwrap().status, TaskStatus::Queued);
    }

    #[test]
    fn derived_worker_id_uses_first_eight_chars_of_task_id() {
        let task_id = TaskId::new();
        let worker_id = derive_worker_id(task_id);
        assert_eq!(worker_id.as_str(), format!("worker-{}", &task_id.as_str()[..8]));
    }
}
