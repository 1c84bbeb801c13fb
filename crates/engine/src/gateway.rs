// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable gateway seams: subtitle providers and the LLM translator.
//!
//! Concrete clients live outside this crate; the pipeline only depends on
//! these traits. Errors carry enough classification to drive the retry
//! policy (§ error kinds).

use async_trait::async_trait;
use sr_core::{ErrorKind, LanguageCode, SubtitleSegment};
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Search input for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleQuery {
    pub title: String,
    pub imdb_id: Option<String>,
    pub language: LanguageCode,
}

/// A downloadable subtitle offered by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCandidate {
    pub provider: String,
    /// Provider-opaque locator handed back to `download`.
    pub locator: String,
    pub language: LanguageCode,
    pub score: f64,
}

/// Provider-side failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider rate limited")]
    RateLimited,
    #[error("provider connection failed: {0}")]
    Connection(String),
    #[error("provider timed out")]
    Timeout,
    #[error("provider server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("provider rejected request {status}: {message}")]
    Client { status: u16, message: String },
    #[error("no subtitle provider configured")]
    NotConfigured,
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::RateLimited => ErrorKind::RateLimit,
            ProviderError::Connection(_) | ProviderError::Timeout | ProviderError::Server { .. } => {
                ErrorKind::TransientInfrastructure
            }
            ProviderError::Client { .. } | ProviderError::NotConfigured => {
                ErrorKind::PermanentClient
            }
        }
    }
}

/// Subtitle provider seam.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Candidates for the query's language, best first.
    async fn search(&self, query: &SubtitleQuery) -> Result<Vec<SubtitleCandidate>, ProviderError>;

    /// Fetch a candidate into provider-owned storage; returns the stored path.
    async fn download(&self, candidate: &SubtitleCandidate) -> Result<PathBuf, ProviderError>;
}

/// Placeholder gateway wired when no provider is configured.
///
/// Searches come back empty (jobs fail with `subtitle_not_found` rather than
/// hanging); download of a nonexistent candidate is a client error.
pub struct StubProviderGateway;

#[async_trait]
impl ProviderGateway for StubProviderGateway {
    async fn search(&self, query: &SubtitleQuery) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        warn!(
            title = %query.title,
            language = %query.language,
            "no subtitle provider configured, search returns nothing",
        );
        Ok(Vec::new())
    }

    async fn download(&self, _candidate: &SubtitleCandidate) -> Result<PathBuf, ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}

/// One chunk-translation request.
///
/// Built once per chunk and reused verbatim across retries, so the prompt
/// the gateway derives from it is identical on every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateChunkRequest {
    pub model: String,
    pub source_language: LanguageCode,
    pub target_language: LanguageCode,
    pub segments: Vec<SubtitleSegment>,
}

/// LLM-side failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    #[error("llm rate limited")]
    RateLimited,
    #[error("llm connection failed: {0}")]
    Connection(String),
    #[error("llm timed out")]
    Timeout,
    #[error("llm server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("llm rejected request {status}: {message}")]
    Client { status: u16, message: String },
    #[error("llm response malformed: {0}")]
    Malformed(String),
}

impl LlmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::RateLimited => ErrorKind::RateLimit,
            LlmError::Connection(_) | LlmError::Timeout | LlmError::Server { .. } => {
                ErrorKind::TransientInfrastructure
            }
            LlmError::Client { .. } => ErrorKind::PermanentClient,
            LlmError::Malformed(_) => ErrorKind::TranslationSemantic,
        }
    }
}

/// LLM translator seam.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Translate one chunk.
    ///
    /// The returned segments must align one-to-one with the request's: same
    /// count, same timestamps, only the text localized. The worker verifies
    /// and retries violations as semantic errors.
    async fn translate_chunk(
        &self,
        request: &TranslateChunkRequest,
    ) -> Result<Vec<SubtitleSegment>, LlmError>;
}

/// Placeholder gateway wired when no LLM is configured.
///
/// Every chunk fails as a client error, so translation jobs fail fast and
/// visibly instead of hanging.
pub struct StubLlmGateway;

#[async_trait]
impl LlmGateway for StubLlmGateway {
    async fn translate_chunk(
        &self,
        _request: &TranslateChunkRequest,
    ) -> Result<Vec<SubtitleSegment>, LlmError> {
        Err(LlmError::Client {
            status: 501,
            message: "no llm gateway configured".into(),
        })
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
