// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sr-engine: orchestrator and workers for the subtitle pipeline.
//!
//! The orchestrator is the single producer of task-queue messages and the
//! single reconciler of job-store state. The download worker talks to the
//! subtitle-provider gateway; the translation worker chunks artifacts to a
//! token budget, calls the LLM gateway with retry, and checkpoints progress
//! after every chunk.

pub mod download;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod supervisor;
pub mod translate;

pub use download::DownloadWorker;
pub use error::EngineError;
pub use gateway::{
    LlmError, LlmGateway, ProviderError, ProviderGateway, StubLlmGateway, StubProviderGateway,
    SubtitleCandidate, SubtitleQuery, TranslateChunkRequest,
};
pub use orchestrator::{Orchestrator, ORCHESTRATOR_QUEUE};
pub use supervisor::{HealthMonitor, HealthProbe, ReconnectTracker};
pub use translate::{TokenCounter, TranslationWorker};

/// How a worker settles the message it is holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Work concluded (successfully or terminally); remove the message.
    Ack,
    /// Transient trouble; return the message for another attempt.
    Requeue,
    /// Doomed message; drop without redelivery.
    Drop,
}
