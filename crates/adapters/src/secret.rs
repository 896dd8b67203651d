// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Secret resolution contract (spec §6).
//!
//! The core never talks to the secret store directly; it resolves a single
//! named value at a time through this trait, scoped to a repository and/or
//! agent definition. Resolution precedence is `repo+agent > repo > agent >
//! global`; the secret store's own storage model is out of scope here.

use async_trait::async_trait;
use cam_core::EnvVarScope;
use std::collections::HashMap;

#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Returns `None` if no value is configured at any precedence level.
    async fn resolve_env_var(&self, name: &str, scope: &EnvVarScope) -> Option<String>;
}

/// Fallback chain for git credentials (spec §6): the first set, non-empty
/// variable wins.
pub const GITHUB_TOKEN_FALLBACK_CHAIN: &[&str] =
    &["GITHUB_TOKEN", "GITHUB_PAT", "GITHUB_API_TOKEN", "GIT_HTTP_TOKEN", "CAM_GIT_HTTP_TOKEN"];

/// Resolves `GITHUB_TOKEN` via the scope first, then walks
/// [`GITHUB_TOKEN_FALLBACK_CHAIN`] against the process environment (spec
/// §4.4 step 2: "Resolve `GITHUB_TOKEN` via the scope, then process-env
/// fallbacks").
pub async fn resolve_github_token(resolver: &dyn SecretResolver, scope: &EnvVarScope) -> Option<String> {
    if let Some(token) = resolver.resolve_env_var("GITHUB_TOKEN", scope).await {
        return Some(token);
    }
    for name in GITHUB_TOKEN_FALLBACK_CHAIN {
        if let Ok(value) = std::env::var(name) {
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// A layered, in-process secret table keyed by scope precedence. Not a
/// secret-store client — a thin adapter over whatever backs the four
/// precedence layers (e.g. a KV store behind `CAM_MASTER_KEY`, out of
/// scope here).
#[derive(Debug, Clone, Default)]
pub struct LayeredSecretResolver {
    /// keyed by `(repo_url, agent_definition_id)`.
    repo_and_agent: HashMap<(String, String), HashMap<String, String>>,
    /// keyed by `repo_url`.
    repo: HashMap<String, HashMap<String, String>>,
    /// keyed by `agent_definition_id`.
    agent: HashMap<String, HashMap<String, String>>,
    global: HashMap<String, String>,
}

impl LayeredSecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.global.insert(name.into(), value.into());
        self
    }

    pub fn set_for_repo(&mut self, repo_url: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.repo.entry(repo_url.into()).or_default().insert(name.into(), value.into());
        self
    }

    pub fn set_for_agent(&mut self, agent_definition_id: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.agent.entry(agent_definition_id.into()).or_default().insert(name.into(), value.into());
        self
    }

    pub fn set_for_repo_and_agent(
        &mut self,
        repo_url: impl Into<String>,
        agent_definition_id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.repo_and_agent
            .entry((repo_url.into(), agent_definition_id.into()))
            .or_default()
            .insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretResolver for LayeredSecretResolver {
    async fn resolve_env_var(&self, name: &str, scope: &EnvVarScope) -> Option<String> {
        if let (Some(repo_url), Some(agent_id)) = (&scope.repo_url, &scope.agent_definition_id) {
            if let Some(v) = self
                .repo_and_agent
                .get(&(repo_url.clone(), agent_id.as_str().to_string()))
                .and_then(|m| m.get(name))
            {
                return Some(v.clone());
            }
        }
        if let Some(repo_url) = &scope.repo_url {
            if let Some(v) = self.repo.get(repo_url).and_then(|m| m.get(name)) {
                return Some(v.clone());
            }
        }
        if let Some(agent_id) = &scope.agent_definition_id {
            if let Some(v) = self.agent.get(agent_id.as_str()).and_then(|m| m.get(name)) {
                return Some(v.clone());
            }
        }
        self.global.get(name).cloned()
    }
}
