// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and status state machine.

use crate::language::LanguageCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a subtitle job.
    ///
    /// Assigned at ingress, immutable for the life of the job, and used to
    /// key the job store, the dedup registry, and checkpoint files.
    #[derive(Default)]
    pub struct JobId;
}

/// Lifecycle status of a job.
///
/// Transitions follow a fixed edge set; anything else is recorded in the
/// event log but leaves the status untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    DownloadQueued,
    DownloadInProgress,
    TranslateQueued,
    TranslateInProgress,
    Done,
    Failed,
}

impl JobStatus {
    /// Terminal statuses are never advanced again (TTL extension excepted).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (*self, next) {
            (Pending, DownloadQueued) => true,
            (DownloadQueued, DownloadInProgress) => true,
            (DownloadInProgress, Done) => true,
            (DownloadInProgress, TranslateQueued) => true,
            (TranslateQueued, TranslateInProgress) => true,
            (TranslateInProgress, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::DownloadQueued => "download_queued",
            JobStatus::DownloadInProgress => "download_in_progress",
            JobStatus::TranslateQueued => "translate_queued",
            JobStatus::TranslateInProgress => "translate_in_progress",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Parameters for creating a new job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub job_id: JobId,
    pub video_url: String,
    pub video_title: String,
    pub language: LanguageCode,
    pub metadata: HashMap<String, String>,
}

/// Canonical unit of work flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    /// Opaque locator of the source media.
    pub video_url: String,
    pub video_title: String,
    /// Desired subtitle language.
    pub language: LanguageCode,
    /// Set once a fallback-language artifact is being translated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<LanguageCode>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Source provenance (origin ingress, provider name, etc.).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Event ids already folded into this record. Redeliveries of the same
    /// event must not double-advance the status.
    #[serde(default)]
    pub applied_event_ids: Vec<String>,
}

impl Job {
    pub fn new(config: JobConfig, now: DateTime<Utc>) -> Self {
        Self {
            job_id: config.job_id,
            video_url: config.video_url,
            video_title: config.video_title,
            language: config.language,
            target_language: None,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            result_url: None,
            subtitle_path: None,
            error_message: None,
            metadata: config.metadata,
            applied_event_ids: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Refresh `updated_at`, keeping it monotonic even if the wall clock
    /// stepped backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = self.updated_at.max(now).max(self.created_at);
    }

    pub fn has_applied(&self, event_id: &str) -> bool {
        self.applied_event_ids.iter().any(|id| id == event_id)
    }

    pub fn mark_applied(&mut self, event_id: &str) {
        if !self.has_applied(event_id) {
            self.applied_event_ids.push(event_id.to_string());
        }
    }

    /// Attempt to advance the status.
    ///
    /// Returns `true` if the edge was legal and the status changed. An
    /// illegal edge (backward move, repeat, or transition out of a terminal
    /// state) leaves the record untouched and returns `false`.
    pub fn advance(&mut self, next: JobStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.touch(now);
        true
    }

    /// Mark the job failed with an operator-safe message.
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> bool {
        if !self.advance(JobStatus::Failed, now) {
            return false;
        }
        self.error_message = Some(message.into());
        true
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
