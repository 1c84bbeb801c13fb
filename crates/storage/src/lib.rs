// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sr-storage: durable state for the subtitle pipeline.
//!
//! Three stores live here: the job store (one JSON document per job plus an
//! append-only event log), the duplicate-suppression registry, and the
//! translation checkpoint files.

pub mod checkpoint;
pub mod dedup;
pub mod job_store;

use std::path::PathBuf;
use thiserror::Error;

pub use checkpoint::{checkpoint_path, CheckpointStore, TranslationCheckpoint};
pub use dedup::{
    CasOutcome, DedupDecision, DedupService, DedupStore, FileDedupStore, MemoryDedupStore,
};
pub use job_store::{AdvanceOutcome, JobStore};

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown job {0:?}")]
    UnknownJob(String),
    #[error("corrupt record at {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
}
