// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sr-bus: durable topic exchange and work queues for the subtitle pipeline.
//!
//! One topic exchange (`subtitle.events`) routes envelopes to bound queues;
//! two work queues carry download and translation tasks. Every queue is
//! backed by a JSONL message log, so unacknowledged messages survive a
//! restart and are redelivered (at-least-once).

pub mod broker;
pub mod exchange;
pub mod log;
pub mod pattern;
pub mod queue;

use std::path::PathBuf;
use thiserror::Error;

pub use broker::Broker;
pub use exchange::TopicExchange;
pub use queue::{Consumer, Delivery, WorkQueue};

/// Errors from bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown queue {0:?}")]
    UnknownQueue(String),
    #[error("queue log {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("bus is shut down")]
    Closed,
}
