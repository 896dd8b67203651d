// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Worker Launcher (spec §4.4): materializes a container (or accepts a
//! daemon worker) for a freshly-claimed task.

use cam_adapters::{
    pipeline_volume_name, resolve_github_token, BindMount, ContainerRuntime, ContainerSpec, EventBroadcaster,
    SecretResolver,
};
use cam_core::{
    AgentDefinition, Clock, EnvVarScope, Event, SystemEvent, Task, WorkerId, WorkerMode, WorkerStatus,
};
use cam_storage::Database;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub const PIPELINE_ARTIFACT_DIR: &str = "/cam-pipeline-artifacts";

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Store(#[from] cam_storage::StoreError),

    #[error(transparent)]
    Adapter(#[from] cam_adapters::AdapterError),
}

/// Configuration the launcher needs beyond the claimed task itself (spec
/// §4.4 step 2's base environment, and §6's `API_SERVER_URL`/`CAM_AUTH_TOKEN`).
#[derive(Debug, Clone, Default)]
pub struct LaunchContext {
    pub api_server_url: Option<String>,
    pub auth_token: Option<String>,
    pub work_dir: Option<String>,
}

pub struct WorkerLauncher<D, R, S, B, C> {
    db: Arc<D>,
    runtime: Arc<R>,
    secrets: Arc<S>,
    broadcaster: Arc<B>,
    clock: C,
    context: LaunchContext,
}

impl<D: Database, R: ContainerRuntime, S: SecretResolver, B: EventBroadcaster, C: Clock>
    WorkerLauncher<D, R, S, B, C>
{
    pub fn new(db: Arc<D>, runtime: Arc<R>, secrets: Arc<S>, broadcaster: Arc<B>, clock: C, context: LaunchContext) -> Self {
        Self { db, runtime, secrets, broadcaster, clock, context }
    }

    /// Launches `task` (already claimed `running`) under `worker_id`,
    /// against `agent_def`.
    pub async fn launch(
        &self,
        task: &Task,
        agent_def: &AgentDefinition,
        worker_id: WorkerId,
    ) -> Result<(), LaunchError> {
        let scope = EnvVarScope::new(None, Some(task.repo_url.clone()), Some(agent_def.id));

        let mut binds = Vec::new();
        let mut pipeline_env = Vec::new();
        if let Some(group_id) = task.pipeline_group() {
            let volume_name = pipeline_volume_name(group_id);
            let mut labels = HashMap::new();
            labels.insert("groupId".to_string(), group_id.to_string());
            self.runtime.create_volume(&volume_name, &labels).await?;
            binds.push(BindMount { volume_name, container_path: PIPELINE_ARTIFACT_DIR.to_string() });
            pipeline_env.push(("CAM_PIPELINE_ARTIFACT_DIR".to_string(), PIPELINE_ARTIFACT_DIR.to_string()));
            pipeline_env.push(("CAM_PIPELINE_GROUP_ID".to_string(), group_id.to_string()));
        }

        let mut env = vec![
            ("WORKER_ID".to_string(), worker_id.as_str().to_string()),
            ("TASK_ID".to_string(), task.id.as_str().to_string()),
            ("AGENT_DEF_ID".to_string(), agent_def.id.as_str().to_string()),
            ("REPO_URL".to_string(), task.repo_url.clone()),
            ("BASE_BRANCH".to_string(), task.base_branch.clone()),
            ("WORK_BRANCH".to_string(), task.work_branch.clone()),
            ("TASK_DESCRIPTION".to_string(), task.description.clone()),
        ];
        if let Some(url) = &self.context.api_server_url {
            env.push(("API_SERVER_URL".to_string(), url.clone()));
        }
        if let Some(dir) = &self.context.work_dir {
            env.push(("WORK_DIR".to_string(), dir.clone()));
        }
        if let Some(token) = &self.context.auth_token {
            env.push(("API_AUTH_TOKEN".to_string(), token.clone()));
        }
        env.extend(pipeline_env);

        if let Some(token) = resolve_github_token(self.secrets.as_ref(), &scope).await {
            env.push(("GITHUB_TOKEN".to_string(), token));
        }

        for name in agent_def.required_env_var_names() {
            if env.iter().any(|(k, _)| k.as_str() == name) {
                continue;
            }
            if let Some(value) = self.secrets.resolve_env_var(name, &scope).await {
                env.push((name.to_string(), value));
            }
        }

        let mut labels = HashMap::new();
        labels.insert("cam.task-id".to_string(), task.id.as_str().to_string());
        labels.insert("cam.agent-def-id".to_string(), agent_def.id.as_str().to_string());
        labels.insert("cam.worker-id".to_string(), worker_id.as_str().to_string());
        if let Some(group_id) = &task.group_id {
            labels.insert("cam.pipeline-group-id".to_string(), group_id.clone());
        }

        let spec = ContainerSpec {
            name: format!("cam-{worker_id}"),
            image: agent_def.docker_image.clone(),
            command: agent_def.command.clone(),
            args: agent_def.args.clone(),
            env,
            binds,
            network_mode: "host".to_string(),
            labels,
            memory_limit_mb: agent_def.default_resource_limits.memory_limit_mb,
            auto_remove: true,
        };

        let handle = self.runtime.create_container(spec).await?;
        self.runtime.start_container(&handle).await?;

        let now = self.clock.now();
        self.db
            .upsert_worker(cam_core::Worker {
                id: worker_id,
                supported_agent_ids: vec![agent_def.id],
                status: WorkerStatus::Busy,
                current_task_id: Some(task.id),
                last_heartbeat_at: now,
                reported_env_vars: vec![],
                mode: WorkerMode::Container,
            })
            .await?;

        self.broadcaster.broadcast(Event::TaskStarted {
            task_id: task.id,
            worker_id,
            agent_definition_id: agent_def.id,
        });
        self.db
            .append_system_event(SystemEvent::from_event(
                &Event::TaskStarted { task_id: task.id, worker_id, agent_definition_id: agent_def.id },
                now,
                None,
            ))
            .await?;

        Ok(())
    }
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

    fn launcher() -> (
        WorkerLauncher<MemoryStore, FakeContainerRuntime, LayeredSecretResolver, RecordingBroadcaster, FakeClock>,
        Arc<MemoryStore>,
        Arc<FakeContainerRuntime>,
        Arc<RecordingBroadcaster>,
    ) {
        let db = Arc::new(MemoryStore::new());
        let runtime = Arc::new(FakeContainerRuntime::new());
        let secrets = Arc::new(LayeredSecretResolver::new());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        (
            WorkerLauncher::new(db.clone(), runtime.clone(), secrets, broadcaster.clone(), FakeClock::new(), LaunchContext::default()),
            db,
            runtime,
            broadcaster,
        )
    }

    #[tokio::test]
    async fn launch_registers_busy_worker_and_emits_task_started() {
        let (launcher, db, runtime, broadcaster) = launcher();
        let agent_id = AgentDefinitionId::new();
        let def = agent_definition(agent_id, &[]);
        let task = TaskBuilder::new().agent_definition_id(agent_id).build();
        let worker_id = cam_core::WorkerId::new();

        launcher.launch(&task, &def, worker_id).await.unwrap();

        let worker = db.get_worker(worker_id).await.unwrap().unwrap();
        assert_eq!(worker.status, WorkerStatus::Busy);
        assert_eq!(worker.current_task_id, Some(task.id));
        assert_eq!(runtime.started().len(), 1);
        assert_eq!(broadcaster.events().len(), 1);
    }

    #[tokio::test]
    async fn pipeline_group_creates_volume_once_across_two_launches() {
        let (launcher, _db, runtime, _broadcaster) = launcher();
        let agent_id = AgentDefinitionId::new();
        let def = agent_definition(agent_id, &[]);

        let task1 = TaskBuilder::new().agent_definition_id(agent_id).group_id("pipeline/abc").build();
        launcher.launch(&task1, &def, cam_core::WorkerId::new()).await.unwrap();

        let task2 = TaskBuilder::new().agent_definition_id(agent_id).group_id("pipeline/abc").build();
        launcher.launch(&task2, &def, cam_core::WorkerId::new()).await.unwrap();

        assert_eq!(runtime.volumes().len(), 1);
        let containers = runtime.containers();
        assert_eq!(containers.len(), 2);
        for c in &containers {
            assert!(c.binds.iter().any(|b| b.container_path == PIPELINE_ARTIFACT_DIR));
        }
    }

    #[tokio::test]
    async fn missing_required_secret_is_simply_absent_from_env() {
        let (launcher, _db, runtime, _broadcaster) = launcher();
        let agent_id = AgentDefinitionId::new();
        let def = agent_definition(agent_id, &["OPENAI_API_KEY"]);
        let task = TaskBuilder::new().agent_definition_id(agent_id).build();

        launcher.launch(&task, &def, cam_core::WorkerId::new()).await.unwrap();

        let containers = runtime.containers();
        assert!(!containers[0].env.iter().any(|(k, _)| k.as_str() == "OPENAI_API_KEY"));
    }
}
