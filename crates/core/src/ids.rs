// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Typed identifiers for the three first-class entities.

use crate::define_id;

define_id! {
    /// Unique identifier for a [`crate::task::Task`].
    pub struct TaskId("task");
}

define_id! {
    /// Unique identifier for a [`crate::worker::Worker`].
    ///
    /// Container-launched workers get a deterministic id
    /// (`"worker-" + first 8 chars of the owning task's id`, minted by the
    /// Worker Launcher) rather than a random one; daemon workers register
    /// with an id of their own choosing. Both fit the same 23-byte buffer.
    pub struct WorkerId("work");
}

define_id! {
    /// Unique identifier for an [`crate::agent_definition::AgentDefinition`].
    pub struct AgentDefinitionId("agnt");
}
