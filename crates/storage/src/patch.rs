// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! The mutable fields a status transition may also need to write, beyond
//! the status column itself — the `extra` of spec §4.1's
//! `updateTaskStatus(taskId, nextStatus, extra?)`.

use cam_core::WorkerId;

/// `None` on a field means "leave unchanged"; `Some(_)` means "set to this
/// value" (for `assigned_worker_id`, `Some(None)` means "clear").
#[derive(Debug, Clone, Default)]
pub struct TaskStatusPatch {
    pub assigned_worker_id: Option<Option<WorkerId>>,
    /// Increment `retry_count` by one as part of this transition.
    pub increment_retry_count: bool,
    /// Reset `queued_at` to the transition's timestamp.
    pub reset_queued_at: bool,
    /// Clear `started_at` (used when re-queuing a previously-run task).
    pub clear_started_at: bool,
    /// Clear `completed_at` (used when re-queuing a previously-run task).
    pub clear_completed_at: bool,
    pub summary: Option<String>,
    pub pr_url: Option<String>,
    pub feedback: Option<String>,
    pub review_comment: Option<String>,
}

impl TaskStatusPatch {
    pub fn assign_worker(worker_id: WorkerId) -> Self {
        Self { assigned_worker_id: Some(Some(worker_id)), ..Self::default() }
    }

    pub fn clear_worker(mut self) -> Self {
        self.assigned_worker_id = Some(None);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// The reset/clear shape used by both the heartbeat monitor's retry path
    /// and startup recovery's retry path (spec §4.5, §4.6).
    pub fn retry() -> Self {
        Self {
            assigned_worker_id: Some(None),
            increment_retry_count: true,
            reset_queued_at: true,
            clear_started_at: true,
            clear_completed_at: true,
            ..Self::default()
        }
    }

    /// The `extra` half of spec §4.1's `updateTaskStatus(taskId, nextStatus,
    /// extra?)`: the fields this patch actually sets, for merging into the
    /// audit event's payload. Fields left at their "unchanged" value are
    /// omitted rather than serialized as `null`/`false`.
    pub fn extra_payload(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        if let Some(assigned) = &self.assigned_worker_id {
            map.insert(
                "assignedWorkerId".to_string(),
                assigned
                    .as_ref()
                    .map(|w| serde_json::Value::String(w.as_str().to_string()))
                    .unwrap_or(serde_json::Value::Null),
            );
        }
        if self.increment_retry_count {
            map.insert("incrementRetryCount".to_string(), serde_json::Value::Bool(true));
        }
        if self.reset_queued_at {
            map.insert("resetQueuedAt".to_string(), serde_json::Value::Bool(true));
        }
        if self.clear_started_at {
            map.insert("clearStartedAt".to_string(), serde_json::Value::Bool(true));
        }
        if self.clear_completed_at {
            map.insert("clearCompletedAt".to_string(), serde_json::Value::Bool(true));
        }
        if let Some(summary) = &self.summary {
            map.insert("summary".to_string(), serde_json::Value::String(summary.clone()));
        }
        if let Some(pr_url) = &self.pr_url {
            map.insert("prUrl".to_string(), serde_json::Value::String(pr_url.clone()));
        }
        if let Some(feedback) = &self.feedback {
            map.insert("feedback".to_string(), serde_json::Value::String(feedback.clone()));
        }
        if let Some(review_comment) = &self.review_comment {
            map.insert("reviewComment".to_string(), serde_json::Value::String(review_comment.clone()));
        }
        map
    }
}
