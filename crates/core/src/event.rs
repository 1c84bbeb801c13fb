// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event envelope and payloads for the `subtitle.events` exchange.
//!
//! Wire format (UTF-8 JSON):
//! `{ event_id, event_type, job_id, timestamp, source, payload: { … } }`
//! The routing key equals the `event_type` string. Unknown event types
//! deserialize to [`Event::Unknown`] so consumers stay forward-compatible.

use crate::error::ErrorKind;
use crate::job::JobId;
use crate::language::LanguageCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Name of the single topic exchange carrying all pipeline events.
pub const EXCHANGE_NAME: &str = "subtitle.events";

crate::define_id! {
    /// Unique identifier for a published event.
    ///
    /// State updates are idempotent on this id: a redelivered event with an
    /// already-applied id must not advance a job twice.
    pub struct EventId;
}

/// Routing keys, for queue bindings.
pub mod keys {
    pub const SUBTITLE_REQUESTED: &str = "subtitle.requested";
    pub const SUBTITLE_DOWNLOAD_REQUESTED: &str = "subtitle.download.requested";
    pub const SUBTITLE_READY: &str = "subtitle.ready";
    pub const SUBTITLE_TRANSLATE_REQUESTED: &str = "subtitle.translate.requested";
    pub const SUBTITLE_TRANSLATED: &str = "subtitle.translated";
    pub const TRANSLATION_COMPLETED: &str = "translation.completed";
    pub const MEDIA_FILE_DETECTED: &str = "media.file.detected";
    pub const JOB_FAILED: &str = "job.failed";
}

/// Typed event payload, discriminated by `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload")]
pub enum Event {
    /// Ingress → orchestrator: canonical request.
    #[serde(rename = "subtitle.requested")]
    SubtitleRequested {
        video_url: String,
        video_title: String,
        language: LanguageCode,
        /// Provenance merged into the job's metadata map.
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        metadata: HashMap<String, String>,
    },

    /// Orchestrator → observers: a download task was enqueued.
    #[serde(rename = "subtitle.download.requested")]
    DownloadRequested {
        video_url: String,
        video_title: String,
        language: LanguageCode,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        preferred_sources: Vec<String>,
    },

    /// Download worker → orchestrator: desired-language artifact exists.
    #[serde(rename = "subtitle.ready")]
    SubtitleReady {
        subtitle_path: PathBuf,
        language: LanguageCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
    },

    /// Download worker → orchestrator: fallback acquired, translation needed.
    #[serde(rename = "subtitle.translate.requested")]
    TranslateRequested {
        subtitle_path: PathBuf,
        source_language: LanguageCode,
        target_language: LanguageCode,
        /// Why the desired language was unavailable (operator tracing).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Translation worker → orchestrator: final artifact exists.
    #[serde(rename = "subtitle.translated")]
    SubtitleTranslated {
        subtitle_path: PathBuf,
        source_language: LanguageCode,
        target_language: LanguageCode,
    },

    /// Translation worker → observers: timing and chunk metadata.
    /// Often precedes `subtitle.translated`.
    #[serde(rename = "translation.completed")]
    TranslationCompleted {
        duration_seconds: f64,
        source_language: LanguageCode,
        target_language: LanguageCode,
        input_path: PathBuf,
        output_path: PathBuf,
        chunk_count: u32,
    },

    /// Filesystem watcher → observers: audit-trail only.
    #[serde(rename = "media.file.detected")]
    MediaFileDetected { path: PathBuf, title: String },

    /// Any worker → orchestrator: terminal failure with reason.
    #[serde(rename = "job.failed")]
    JobFailed {
        error_type: ErrorKind,
        error_message: String,
    },

    /// Catch-all for unknown event types (forward compatibility).
    /// Consumers acknowledge and log these; they are never NACKed.
    #[serde(other, skip_serializing)]
    Unknown,
}

impl Event {
    pub fn routing_key(&self) -> &'static str {
        match self {
            Event::SubtitleRequested { .. } => keys::SUBTITLE_REQUESTED,
            Event::DownloadRequested { .. } => keys::SUBTITLE_DOWNLOAD_REQUESTED,
            Event::SubtitleReady { .. } => keys::SUBTITLE_READY,
            Event::TranslateRequested { .. } => keys::SUBTITLE_TRANSLATE_REQUESTED,
            Event::SubtitleTranslated { .. } => keys::SUBTITLE_TRANSLATED,
            Event::TranslationCompleted { .. } => keys::TRANSLATION_COMPLETED,
            Event::MediaFileDetected { .. } => keys::MEDIA_FILE_DETECTED,
            Event::JobFailed { .. } => keys::JOB_FAILED,
            Event::Unknown => "unknown",
        }
    }
}

/// Common header wrapped around every published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event_id: EventId,
    pub job_id: JobId,
    pub timestamp: DateTime<Utc>,
    /// Emitting component ("watcher", "webhook:jellyfin", "download-worker", …).
    pub source: String,
    #[serde(flatten)]
    pub event: Event,
}

impl Envelope {
    pub fn new(
        event_id: impl Into<EventId>,
        job_id: impl Into<JobId>,
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
        event: Event,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            job_id: job_id.into(),
            timestamp,
            source: source.into(),
            event,
        }
    }

    pub fn routing_key(&self) -> &'static str {
        self.event.routing_key()
    }

    pub fn log_summary(&self) -> String {
        let t = self.routing_key();
        let job = &self.job_id;
        match &self.event {
            Event::SubtitleRequested { language, .. } => {
                format!("{t} job={job} lang={language}")
            }
            Event::DownloadRequested { language, .. } => {
                format!("{t} job={job} lang={language}")
            }
            Event::SubtitleReady { language, provider, .. } => match provider {
                Some(p) => format!("{t} job={job} lang={language} provider={p}"),
                None => format!("{t} job={job} lang={language}"),
            },
            Event::TranslateRequested {
                source_language,
                target_language,
                ..
            } => format!("{t} job={job} {source_language}->{target_language}"),
            Event::SubtitleTranslated {
                source_language,
                target_language,
                ..
            } => format!("{t} job={job} {source_language}->{target_language}"),
            Event::TranslationCompleted {
                duration_seconds,
                chunk_count,
                ..
            } => format!("{t} job={job} chunks={chunk_count} took={duration_seconds:.1}s"),
            Event::MediaFileDetected { path, .. } => {
                format!("{t} job={job} path={}", path.display())
            }
            Event::JobFailed { error_type, .. } => {
                format!("{t} job={job} kind={error_type}")
            }
            Event::Unknown => format!("{t} job={job}"),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
