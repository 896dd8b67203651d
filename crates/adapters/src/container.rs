// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! The container runtime contract (spec §6) and a Docker-CLI implementation.
//!
//! The engine never talks to a container socket directly; it drives
//! containers through this trait so the Worker Launcher can be tested
//! against [`FakeContainerRuntime`] without a daemon running.

use crate::error::AdapterError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Mount of a named volume into the container.
#[derive(Debug, Clone)]
pub struct BindMount {
    pub volume_name: String,
    pub container_path: String,
}

/// Everything needed to create a container (spec §6: "`spec` carries image,
/// env array, bind mounts, network mode, labels, optional memory limit").
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub binds: Vec<BindMount>,
    /// `"host"` or `"bridge"`; the engine must be able to request host
    /// networking (spec §6: "must accept AutoRemove and host networking").
    pub network_mode: String,
    pub labels: HashMap<String, String>,
    pub memory_limit_mb: Option<u64>,
    pub auto_remove: bool,
}

/// An opaque handle returned from `create_container`, passed to `start_container`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle(pub String);

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Idempotent: "already exists" is success (spec §4.4).
    async fn create_volume(&self, name: &str, labels: &HashMap<String, String>) -> Result<(), AdapterError>;

    async fn create_container(&self, spec: ContainerSpec) -> Result<ContainerHandle, AdapterError>;

    async fn start_container(&self, handle: &ContainerHandle) -> Result<(), AdapterError>;
}

/// Derives the stable volume name for a pipeline group (spec §4.4, §6):
/// `cam-pipeline-<first 16 hex chars of sha256(group_id)>`.
pub fn pipeline_volume_name(group_id: &str) -> String {
    let digest = Sha256::digest(group_id.as_bytes());
    let hex = hex_encode(&digest);
    format!("cam-pipeline-{}", &hex[..16])
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// Shells out to the `docker` CLI for container and volume lifecycle.
#[derive(Debug, Clone, Default)]
pub struct DockerRuntime {
    socket_path: Option<String>,
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self { socket_path: None }
    }

    /// `DOCKER_SOCKET_PATH` (spec §6), forwarded to the CLI via `DOCKER_HOST`.
    pub fn with_socket_path(mut self, socket_path: impl Into<String>) -> Self {
        self.socket_path = Some(socket_path.into());
        self
    }

    async fn run_docker(&self, args: &[&str]) -> Result<String, AdapterError> {
        let mut cmd = tokio::process::Command::new("docker");
        if let Some(socket) = &self.socket_path {
            cmd.env("DOCKER_HOST", format!("unix://{socket}"));
        }
        let output = cmd
            .args(args)
            .output()
            .await
            .map_err(|e| AdapterError::Runtime(format!("failed to exec docker: {e}")))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(AdapterError::Runtime(format!(
                "docker {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_volume(&self, name: &str, labels: &HashMap<String, String>) -> Result<(), AdapterError> {
        let mut args = vec!["volume", "create", name];
        let label_args: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let mut label_flags = Vec::with_capacity(label_args.len() * 2);
        for l in &label_args {
            label_flags.push("--label");
            label_flags.push(l.as_str());
        }
        args.splice(2..2, label_flags);

        match self.run_docker(&args).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("already exists") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn create_container(&self, spec: ContainerSpec) -> Result<ContainerHandle, AdapterError> {
        let mut args = vec!["create", "--name", spec.name.as_str()];

        if spec.auto_remove {
            args.push("--rm");
        }
        args.push("--network");
        args.push(spec.network_mode.as_str());

        let env_args: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        for e in &env_args {
            args.push("-e");
            args.push(e.as_str());
        }

        let bind_args: Vec<String> = spec
            .binds
            .iter()
            .map(|b| format!("{}:{}", b.volume_name, b.container_path))
            .collect();
        for b in &bind_args {
            args.push("-v");
            args.push(b.as_str());
        }

        let label_args: Vec<String> = spec.labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        for l in &label_args {
            args.push("--label");
            args.push(l.as_str());
        }

        let memory_arg;
        if let Some(mb) = spec.memory_limit_mb {
            memory_arg = format!("{mb}m");
            args.push("--memory");
            args.push(memory_arg.as_str());
        }

        args.push(spec.image.as_str());
        args.push(spec.command.as_str());
        for a in &spec.args {
            args.push(a.as_str());
        }

        let container_id = self.run_docker(&args).await?;
        Ok(ContainerHandle(container_id))
    }

    async fn start_container(&self, handle: &ContainerHandle) -> Result<(), AdapterError> {
        self.run_docker(&["start", handle.0.as_str()]).await?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct CreatedVolume {
        pub name: String,
        pub labels: HashMap<String, String>,
    }

    /// Records every call made to it, for assertions in engine tests (spec
    /// §8 scenario 6: "runtime receives createVolume exactly once").
    #[derive(Clone, Default)]
    pub struct FakeContainerRuntime {
        volumes: Arc<Mutex<Vec<CreatedVolume>>>,
        containers: Arc<Mutex<Vec<ContainerSpec>>>,
        started: Arc<Mutex<Vec<ContainerHandle>>>,
        next_id: Arc<Mutex<u64>>,
    }

    impl FakeContainerRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn volumes(&self) -> Vec<CreatedVolume> {
            self.volumes.lock().clone()
        }

        pub fn containers(&self) -> Vec<ContainerSpec> {
            self.containers.lock().clone()
        }

        pub fn started(&self) -> Vec<ContainerHandle> {
            self.started.lock().clone()
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeContainerRuntime {
        async fn create_volume(&self, name: &str, labels: &HashMap<String, String>) -> Result<(), AdapterError> {
            let mut volumes = self.volumes.lock();
            if volumes.iter().any(|v| v.name == name) {
                return Ok(());
            }
            volumes.push(CreatedVolume { name: name.to_string(), labels: labels.clone() });
            Ok(())
        }

        async fn create_container(&self, spec: ContainerSpec) -> Result<ContainerHandle, AdapterError> {
            let mut next_id = self.next_id.lock();
            *next_id += 1;
            let handle = ContainerHandle(format!("fake-container-{next_id}"));
            self.containers.lock().push(spec);
            Ok(handle)
        }

        async fn start_container(&self, handle: &ContainerHandle) -> Result<(), AdapterError> {
            self.started.lock().push(handle.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_volume_name_is_stable_and_prefixed() {
        let a = pipeline_volume_name("pipeline/abc");
        let b = pipeline_volume_name("pipeline/abc");
        assert_eq!(a, b);
        assert!(a.starts_with("cam-pipeline-"));
        assert_eq!(a.len(), "cam-pipeline-".len() + 16);
    }

    #[test]
    fn pipeline_volume_name_differs_per_group() {
        assert_ne!(pipeline_volume_name("pipeline/a"), pipeline_volume_name("pipeline/b"));
    }
}
