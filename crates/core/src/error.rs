// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure classification shared by workers, orchestrator, and ingress.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of failure carried on `job.failed` events.
///
/// The kind decides the handling policy: transient kinds are retried with
/// backoff before surfacing, permanent kinds fail fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bus/store connection loss, timeouts, 5xx from external gateways.
    TransientInfrastructure,
    /// Provider or LLM rate limiting (HTTP 429 and friends).
    RateLimit,
    /// Malformed input, invalid auth, not found.
    PermanentClient,
    /// Unreadable subtitle artifact.
    ParseError,
    /// LLM returned the wrong number of segments or altered timestamps.
    TranslationSemantic,
    /// Checkpoint file could not be read or written. Never fails a job.
    Checkpoint,
    /// Dedup store unavailable; the request is allowed through.
    DedupOutage,
}

impl ErrorKind {
    /// Kinds that warrant retry with backoff before surfacing.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::TransientInfrastructure
                | ErrorKind::RateLimit
                | ErrorKind::TranslationSemantic
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::TransientInfrastructure => "transient_infrastructure",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::PermanentClient => "permanent_client",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::TranslationSemantic => "translation_semantic",
            ErrorKind::Checkpoint => "checkpoint",
            ErrorKind::DedupOutage => "dedup_outage",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
