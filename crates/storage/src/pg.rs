// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Postgres implementation of the [`Database`] contract.

use crate::config::DbConfig;
use crate::database::{DepStatus, Database};
use crate::error::StoreError;
use crate::patch::TaskStatusPatch;
use crate::rows::{AgentDefinitionRow, TaskRow, WorkerRow};
use async_trait::async_trait;
use cam_core::{AgentDefinition, AgentDefinitionId, SystemEvent, Task, TaskId, TaskStatus, Worker, WorkerId};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use tracing::info;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self, migrations_dir: &Path) -> Result<(), StoreError> {
        let migrator = sqlx::migrate::Migrator::new(migrations_dir).await?;
        migrator.run(&self.pool).await?;
        info!("migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PgStore {
    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn get_task_statuses(&self, ids: &[TaskId]) -> Result<Vec<DepStatus>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_strs: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, status FROM tasks WHERE id = ANY($1)")
                .bind(&id_strs as &[&str])
                .fetch_all(&self.pool)
                .await?;
        let mut found: std::collections::HashMap<String, TaskStatus> =
            std::collections::HashMap::with_capacity(rows.len());
        for (id, status) in rows {
            found.insert(id, status.parse::<TaskStatus>()?);
        }
        Ok(ids
            .iter()
            .map(|id| (*id, found.get(id.as_str()).copied()))
            .collect())
    }

    async fn select_waiting_tasks(&self, limit: u32) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE source = 'scheduler' AND status = 'waiting' \
             ORDER BY created_at ASC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn select_queued_tasks(&self, limit: u32) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE source = 'scheduler' AND status = 'queued' \
             ORDER BY queued_at ASC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn select_running_tasks_page(
        &self,
        after: Option<TaskId>,
        limit: u32,
    ) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = match after {
            Some(after) => {
                sqlx::query_as(
                    "SELECT * FROM tasks WHERE source = 'scheduler' AND status = 'running' \
                     AND id > $1 ORDER BY id ASC LIMIT $2",
                )
                .bind(after.as_str())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM tasks WHERE source = 'scheduler' AND status = 'running' \
                     ORDER BY id ASC LIMIT $1",
                )
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn select_running_tasks_for_worker(&self, worker_id: WorkerId) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE source = 'scheduler' AND status = 'running' \
             AND assigned_worker_id = $1",
        )
        .bind(worker_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn cas_update_task_status(
        &self,
        task_id: TaskId,
        expected_status: TaskStatus,
        expected_assigned_worker_id: Option<Option<WorkerId>>,
        next_status: TaskStatus,
        now: DateTime<Utc>,
        patch: TaskStatusPatch,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        // started_at/completed_at are each assigned exactly once: the clear
        // flags fold into the same CASE expression the status-driven
        // auto-timestamp rule uses, rather than appending a second
        // assignment, which Postgres rejects (unlike MySQL's last-write-wins).
        let started_at_else = if patch.clear_started_at { "NULL" } else { "started_at" };
        let completed_at_else = if patch.clear_completed_at { "NULL" } else { "completed_at" };
        let mut sql = format!(
            "UPDATE tasks SET status = $1, \
             started_at = CASE WHEN $1 = 'running' THEN $2 ELSE {started_at_else} END, \
             completed_at = CASE WHEN $1 IN ('completed', 'failed') THEN $2 ELSE {completed_at_else} END",
        );
        let mut idx = 3;
        if let Some(assigned) = &patch.assigned_worker_id {
            sql.push_str(&format!(", assigned_worker_id = ${idx}"));
            idx += 1;
            let _ = assigned;
        }
        if patch.increment_retry_count {
            sql.push_str(", retry_count = retry_count + 1");
        }
        if patch.reset_queued_at {
            sql.push_str(&format!(", queued_at = ${idx}"));
            idx += 1;
        }
        if patch.summary.is_some() {
            sql.push_str(&format!(", summary = ${idx}"));
            idx += 1;
        }
        if patch.pr_url.is_some() {
            sql.push_str(&format!(", pr_url = ${idx}"));
            idx += 1;
        }
        if patch.feedback.is_some() {
            sql.push_str(&format!(", feedback = ${idx}"));
            idx += 1;
        }
        if patch.review_comment.is_some() {
            sql.push_str(&format!(", review_comment = ${idx}"));
            idx += 1;
        }

        sql.push_str(&format!(" WHERE id = ${idx} AND status = ${}", idx + 1));
        idx += 2;
        let worker_guard_idx = if expected_assigned_worker_id.is_some() {
            sql.push_str(&format!(" AND assigned_worker_id = ${idx}"));
            Some(idx)
        } else {
            None
        };

        let mut query = sqlx::query(&sql).bind(next_status.to_string()).bind(now);
        if let Some(assigned) = &patch.assigned_worker_id {
            query = query.bind(assigned.as_ref().map(|w| w.as_str().to_string()));
        }
        if patch.reset_queued_at {
            query = query.bind(now);
        }
        if let Some(summary) = &patch.summary {
            query = query.bind(summary.clone());
        }
        if let Some(pr_url) = &patch.pr_url {
            query = query.bind(pr_url.clone());
        }
        if let Some(feedback) = &patch.feedback {
            query = query.bind(feedback.clone());
        }
        if let Some(review_comment) = &patch.review_comment {
            query = query.bind(review_comment.clone());
        }
        query = query.bind(task_id.as_str()).bind(expected_status.to_string());
        if worker_guard_idx.is_some() {
            let expected_worker = expected_assigned_worker_id
                .clone()
                .flatten()
                .map(|w| w.as_str().to_string());
            query = query.bind(expected_worker);
        }

        let result = query.execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_worker(&self, id: WorkerId) -> Result<Option<Worker>, StoreError> {
        let row = sqlx::query_as::<_, WorkerRow>("SELECT * FROM workers WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Worker::try_from).transpose()
    }

    async fn get_workers(&self, ids: &[WorkerId]) -> Result<Vec<Worker>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_strs: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
        let rows: Vec<WorkerRow> = sqlx::query_as("SELECT * FROM workers WHERE id = ANY($1)")
            .bind(&id_strs as &[&str])
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Worker::try_from).collect()
    }

    async fn select_stale_busy_workers(&self, stale_before: DateTime<Utc>) -> Result<Vec<Worker>, StoreError> {
        let rows: Vec<WorkerRow> = sqlx::query_as(
            "SELECT * FROM workers WHERE status = 'busy' AND last_heartbeat_at < $1",
        )
        .bind(stale_before)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Worker::try_from).collect()
    }

    async fn cas_worker_offline(&self, worker_id: WorkerId, stale_before: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE workers SET status = 'offline', current_task_id = NULL \
             WHERE id = $1 AND status = 'busy' AND last_heartbeat_at < $2",
        )
        .bind(worker_id.as_str())
        .bind(stale_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_worker(&self, worker: Worker) -> Result<(), StoreError> {
        let supported_agent_ids = serde_json::to_value(
            worker.supported_agent_ids.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
        )
        .unwrap_or_default();
        let reported_env_vars = serde_json::to_value(&worker.reported_env_vars).unwrap_or_default();

        sqlx::query(
            "INSERT INTO workers (id, supported_agent_ids, status, current_task_id, last_heartbeat_at, reported_env_vars, mode) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET \
                supported_agent_ids = EXCLUDED.supported_agent_ids, \
                status = EXCLUDED.status, \
                current_task_id = EXCLUDED.current_task_id, \
                last_heartbeat_at = EXCLUDED.last_heartbeat_at, \
                reported_env_vars = EXCLUDED.reported_env_vars, \
                mode = EXCLUDED.mode",
        )
        .bind(worker.id.as_str())
        .bind(supported_agent_ids)
        .bind(worker.status.to_string())
        .bind(worker.current_task_id.map(|id| id.as_str().to_string()))
        .bind(worker.last_heartbeat_at)
        .bind(reported_env_vars)
        .bind(worker.mode.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_eligible_workers(&self) -> Result<Vec<Worker>, StoreError> {
        let rows: Vec<WorkerRow> =
            sqlx::query_as("SELECT * FROM workers WHERE status = 'idle' ORDER BY last_heartbeat_at ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Worker::try_from).collect()
    }

    async fn get_agent_definition(&self, id: AgentDefinitionId) -> Result<Option<AgentDefinition>, StoreError> {
        let row = sqlx::query_as::<_, AgentDefinitionRow>("SELECT * FROM agent_definitions WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(AgentDefinition::try_from).transpose()
    }

    async fn append_system_event(&self, event: SystemEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO system_events (kind, payload, timestamp, actor) VALUES ($1, $2, $3, $4)",
        )
        .bind(&event.kind)
        .bind(&event.payload)
        .bind(event.timestamp)
        .bind(&event.actor)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
