// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Per-task log suppression for the Scheduler Tick's missing-env-var
//! warning (spec §4.3, §9): at most one warning per task per 60 seconds.

use cam_core::TaskId;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

const SUPPRESS_WINDOW_SECS: i64 = 60;

/// Process-local, in-memory, and intentionally lossy across restarts: a
/// missed warning right after a crash is an acceptable cost for never
/// blocking the tick loop on a lock held across I/O.
pub struct LogSuppressor {
    last_logged: Mutex<HashMap<TaskId, DateTime<Utc>>>,
}

impl LogSuppressor {
    pub fn new() -> Self {
        Self { last_logged: Mutex::new(HashMap::new()) }
    }

    /// Returns `true` if a warning for `task_id` should be emitted now,
    /// recording `now` as the last-logged time when it does.
    pub fn should_log(&self, task_id: TaskId, now: DateTime<Utc>) -> bool {
        let mut last_logged = self.last_logged.lock();
        match last_logged.get(&task_id) {
            Some(last) if now - *last < Duration::seconds(SUPPRESS_WINDOW_SECS) => false,
            _ => {
                last_logged.insert(task_id, now);
                true
            }
        }
    }
}

impl Default for LogSuppressor {
    fn default() -> Self {
        Self::new()
    }
}
