// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! cam-core: domain types for the coding-agent task scheduler.
//!
//! This crate has no I/O. It defines the three first-class entities (Task,
//! Worker, AgentDefinition), the two value records (EnvVarScope,
//! SystemEvent), the stable event catalog, typed ids, and the `Clock`
//! abstraction used throughout `cam-engine` for testable time handling.

// Allow panic!/unwrap/expect in test code.
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod id;

pub mod agent_definition;
pub mod clock;
pub mod env_var;
pub mod event;
pub mod ids;
pub mod task;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use agent_definition::{AgentDefinition, ResourceLimits};
pub use clock::{Clock, FakeClock, SystemClock};
pub use env_var::{EnvVarScope, EnvVarSpec};
pub use event::{AlertSeverity, Event, SystemEvent};
pub use ids::{AgentDefinitionId, TaskId, WorkerId};
pub use task::{InvalidEnumValue, Task, TaskSource, TaskStatus};
pub use worker::{Worker, WorkerMode, WorkerStatus};
