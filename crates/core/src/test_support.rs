// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Proptest strategies for property-testing the Dependency Gate's
//! classification logic (spec §8: "Gate idempotence").

use crate::task::TaskStatus;
use proptest::prelude::*;

/// Any terminal or non-terminal task status, with equal weight.
pub fn any_task_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Waiting),
        Just(TaskStatus::Queued),
        Just(TaskStatus::Running),
        Just(TaskStatus::Completed),
        Just(TaskStatus::Failed),
        Just(TaskStatus::Cancelled),
    ]
}

/// A small vector of dependency statuses, some of which may be "missing"
/// (`None`), modelling a dependency id with no matching row.
pub fn dep_statuses(max_len: usize) -> impl Strategy<Value = Vec<Option<TaskStatus>>> {
    prop::collection::vec(prop::option::of(any_task_status()), 0..=max_len)
}
