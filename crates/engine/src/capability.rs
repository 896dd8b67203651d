// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Capability Registry (spec §4.7): pure read-only helpers over worker rows.
//!
//! These never touch the database themselves — callers pass in whatever
//! worker rows they already loaded. The external task-creation admission
//! check (out of scope here) uses these to decide a missing server-side
//! env-var may still be available on a daemon worker.

use cam_core::{AgentDefinitionId, Worker, WorkerMode, WorkerStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// `{ nowMs, staleTimeoutMs }` from spec §4.7, expressed as real timestamps.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityPolicy {
    pub now: DateTime<Utc>,
    pub stale_timeout: chrono::Duration,
}

/// A worker is eligible iff it's a daemon worker, not offline/draining, and
/// its heartbeat is fresh.
pub fn is_eligible(worker: &Worker, policy: EligibilityPolicy) -> bool {
    worker.mode == WorkerMode::Daemon
        && matches!(worker.status, WorkerStatus::Idle | WorkerStatus::Busy)
        && policy.now - worker.last_heartbeat_at < policy.stale_timeout
}

pub fn supports_agent(worker: &Worker, agent_definition_id: AgentDefinitionId) -> bool {
    worker.supported_agent_ids.contains(&agent_definition_id)
}

/// Union of `reported_env_vars` across eligible workers that support the
/// given agent.
pub fn collect_env_vars_for_agent(
    workers: &[Worker],
    agent_definition_id: AgentDefinitionId,
    policy: EligibilityPolicy,
) -> BTreeSet<String> {
    workers
        .iter()
        .filter(|w| is_eligible(w, policy) && supports_agent(w, agent_definition_id))
        .flat_map(|w| w.reported_env_vars.iter().cloned())
        .collect()
}
