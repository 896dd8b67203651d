// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Env-var specs and the scope used to resolve a secret (spec §3, §9).

use crate::ids::AgentDefinitionId;
use serde::{Deserialize, Serialize};

/// One entry of an [`crate::agent_definition::AgentDefinition`]'s
/// `requiredEnvVars` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarSpec {
    pub name: String,
    pub required: bool,
    pub sensitive: bool,
}

/// Scope used to resolve a secret, with precedence
/// `repo+agent > repo > agent > global` (spec §3, §6).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarScope {
    pub repository_id: Option<String>,
    pub repo_url: Option<String>,
    pub agent_definition_id: Option<AgentDefinitionId>,
}

impl EnvVarScope {
    pub fn new(
        repository_id: Option<String>,
        repo_url: Option<String>,
        agent_definition_id: Option<AgentDefinitionId>,
    ) -> Self {
        Self { repository_id, repo_url, agent_definition_id }
    }
}
