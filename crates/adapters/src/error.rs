// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Adapter error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("container runtime error: {0}")]
    Runtime(String),

    #[error("secret resolution error: {0}")]
    Secret(String),
}
