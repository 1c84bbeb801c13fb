// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type

use sr_bus::BusError;
use sr_storage::StoreError;
use thiserror::Error;

/// Errors surfaced by the orchestrator and worker loops.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
