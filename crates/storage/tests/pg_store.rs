// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Integration tests against a real Postgres instance (testcontainers).
//!
//! Each test gets its own database within a container shared per process.

use cam_core::task::test_support::TaskBuilder;
use cam_core::{TaskStatus, WorkerId};
use cam_storage::{Database, PgStore, TaskStatusPatch};
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::Executor;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

struct SharedPg {
    base_url: String,
    _container: Option<ContainerAsync<Postgres>>,
}

static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

async fn init_shared_pg() -> SharedPg {
    if let Ok(url) = std::env::var("CAM_TEST_PG_URL") {
        return SharedPg { base_url: url, _container: None };
    }
    let container = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .expect("failed to start postgres container");
    let host = container.get_host().await.expect("host");
    let port = container.get_host_port_ipv4(5432).await.expect("port");
    SharedPg {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

async fn test_store() -> (PgStore, String) {
    let shared = SHARED_PG.get_or_init(init_shared_pg).await;
    let maint_url = format!("{}/postgres", shared.base_url);
    let maint_pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&maint_url)
        .await
        .expect("connect to maintenance db");

    let db_name = format!("cam_test_{}", Uuid::new_v4().simple());
    maint_pool
        .execute(format!("CREATE DATABASE {db_name}").as_str())
        .await
        .expect("create temp database");
    maint_pool.close().await;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&format!("{}/{db_name}", shared.base_url))
        .await
        .expect("connect to temp database");
    let store = PgStore::from_pool(pool);
    store
        .run_migrations(cam_storage::config::default_migrations_path())
        .await
        .expect("migrations should succeed");
    (store, db_name)
}

#[tokio::test]
async fn cas_update_rejects_stale_expected_status() {
    let (store, _db) = test_store().await;
    let task = TaskBuilder::new().status(TaskStatus::Queued).build();
    store
        .upsert_worker(cam_core::Worker {
            id: WorkerId::new(),
            supported_agent_ids: vec![],
            status: cam_core::WorkerStatus::Idle,
            current_task_id: None,
            last_heartbeat_at: Utc::now(),
            reported_env_vars: vec![],
            mode: cam_core::WorkerMode::Container,
        })
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO agent_definitions (id, display_name, docker_image, command) VALUES ($1, $2, $3, $4)",
    )
    .bind(task.agent_definition_id.as_str())
    .bind("test agent")
    .bind("example/agent:latest")
    .bind("run-agent")
    .execute(store.pool())
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO tasks (id, title, description, agent_definition_id, repo_url, base_branch, work_branch, status, source, max_retries) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(task.id.as_str())
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.agent_definition_id.as_str())
    .bind(&task.repo_url)
    .bind(&task.base_branch)
    .bind(&task.work_branch)
    .bind(task.status.to_string())
    .bind(task.source.to_string())
    .bind(task.max_retries as i32)
    .execute(store.pool())
    .await
    .unwrap();

    let won = store
        .cas_update_task_status(
            task.id,
            TaskStatus::Running,
            None,
            TaskStatus::Running,
            Utc::now(),
            TaskStatusPatch::default(),
        )
        .await
        .unwrap();
    assert!(!won, "CAS must fail when expected_status does not match the row");

    let won = store
        .cas_update_task_status(
            task.id,
            TaskStatus::Queued,
            None,
            TaskStatus::Running,
            Utc::now(),
            TaskStatusPatch::default(),
        )
        .await
        .unwrap();
    assert!(won);

    let reloaded = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TaskStatus::Running);
    assert!(reloaded.started_at.is_some());
}

/// A retry-style patch (`clear_started_at` + `clear_completed_at`, as used by
/// the heartbeat monitor and startup recovery) must not assign `started_at`
/// or `completed_at` twice in the generated `UPDATE`.
#[tokio::test]
async fn cas_update_clears_started_and_completed_at_on_retry() {
    let (store, _db) = test_store().await;
    let task = TaskBuilder::new().status(TaskStatus::Running).build();

    sqlx::query(
        "INSERT INTO agent_definitions (id, display_name, docker_image, command) VALUES ($1, $2, $3, $4)",
    )
    .bind(task.agent_definition_id.as_str())
    .bind("test agent")
    .bind("example/agent:latest")
    .bind("run-agent")
    .execute(store.pool())
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO tasks (id, title, description, agent_definition_id, repo_url, base_branch, work_branch, status, source, max_retries, started_at, completed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)",
    )
    .bind(task.id.as_str())
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.agent_definition_id.as_str())
    .bind(&task.repo_url)
    .bind(&task.base_branch)
    .bind(&task.work_branch)
    .bind(task.status.to_string())
    .bind(task.source.to_string())
    .bind(task.max_retries as i32)
    .bind(Utc::now())
    .execute(store.pool())
    .await
    .unwrap();

    let won = store
        .cas_update_task_status(
            task.id,
            TaskStatus::Running,
            None,
            TaskStatus::Queued,
            Utc::now(),
            TaskStatusPatch::retry(),
        )
        .await
        .unwrap();
    assert!(won, "retry CAS should succeed against a real Postgres instance");

    let reloaded = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TaskStatus::Queued);
    assert!(reloaded.started_at.is_none());
    assert!(reloaded.completed_at.is_none());
    assert_eq!(reloaded.retry_count, 1);
}
