// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! Engine error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] cam_storage::StoreError),

    #[error(transparent)]
    Adapter(#[from] cam_adapters::AdapterError),
}
