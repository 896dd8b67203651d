// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! The AgentDefinition entity: an immutable-per-version descriptor (spec §3).

use crate::env_var::EnvVarSpec;
use crate::ids::AgentDefinitionId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub memory_limit_mb: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: AgentDefinitionId,
    pub display_name: String,
    pub docker_image: String,
    pub command: String,
    pub args: Vec<String>,
    pub required_env_vars: Vec<EnvVarSpec>,
    pub default_resource_limits: ResourceLimits,
}

impl AgentDefinition {
    /// Names of every env var this agent requires, in declaration order.
    pub fn required_env_var_names(&self) -> impl Iterator<Item = &str> {
        self.required_env_vars.iter().map(|v| v.name.as_str())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;

    pub fn agent_definition(id: AgentDefinitionId, required: &[&str]) -> AgentDefinition {
        AgentDefinition {
            id,
            display_name: "test agent".to_string(),
            docker_image: "example/agent:latest".to_string(),
            command: "run-agent".to_string(),
            args: vec![],
            required_env_vars: required
                .iter()
                .map(|name| EnvVarSpec { name: (*name).to_string(), required: true, sensitive: true })
                .collect(),
            default_resource_limits: ResourceLimits { memory_limit_mb: Some(2048) },
        }
    }
}
