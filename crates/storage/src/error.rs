// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Storage error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("row contained an invalid enum value: {0}")]
    InvalidEnumValue(#[from] cam_core::task::InvalidEnumValue),

    #[error("task {0} not found")]
    TaskNotFound(cam_core::TaskId),

    #[error("worker {0} not found")]
    WorkerNotFound(cam_core::WorkerId),
}
