// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work-queue task payloads.
//!
//! Tasks are produced only by the orchestrator and consumed by exactly one
//! worker (modulo redelivery). Bodies are persistent JSON.

use crate::job::JobId;
use crate::language::LanguageCode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Durable queue fed to download workers.
pub const DOWNLOAD_QUEUE: &str = "subtitle.download";

/// Durable queue fed to translation workers.
pub const TRANSLATION_QUEUE: &str = "subtitle.translation";

/// Directs a download worker to acquire a subtitle for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub job_id: JobId,
    pub video_url: String,
    pub video_title: String,
    pub language: LanguageCode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_sources: Vec<String>,
}

/// Directs a translation worker to localize an existing artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationTask {
    pub job_id: JobId,
    pub subtitle_file_path: PathBuf,
    pub source_language: LanguageCode,
    pub target_language: LanguageCode,
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
