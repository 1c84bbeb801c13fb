// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Translation checkpoints: per-chunk progress that survives a worker crash.
//!
//! A checkpoint is written after each successfully translated chunk and
//! deleted on success. Writes are best-effort: a failed write is logged and
//! translation proceeds. On load, a checkpoint that does not match the
//! current task (different input, languages, or chunk count) is stale and
//! discarded.

use crate::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sr_core::{JobId, LanguageCode, SubtitleSegment, TranslationTask};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Progress of a partially translated task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationCheckpoint {
    pub job_id: JobId,
    pub subtitle_file_path: PathBuf,
    pub source_language: LanguageCode,
    pub target_language: LanguageCode,
    pub total_chunks: u32,
    pub completed_chunk_indices: BTreeSet<u32>,
    pub translated_segments: Vec<SubtitleSegment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TranslationCheckpoint {
    pub fn new(task: &TranslationTask, total_chunks: u32, now: DateTime<Utc>) -> Self {
        Self {
            job_id: task.job_id.clone(),
            subtitle_file_path: task.subtitle_file_path.clone(),
            source_language: task.source_language.clone(),
            target_language: task.target_language.clone(),
            total_chunks,
            completed_chunk_indices: BTreeSet::new(),
            translated_segments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a completed chunk. Idempotent on chunk index.
    pub fn record_chunk(
        &mut self,
        chunk_index: u32,
        segments: &[SubtitleSegment],
        now: DateTime<Utc>,
    ) {
        if !self.completed_chunk_indices.insert(chunk_index) {
            return;
        }
        self.translated_segments.extend_from_slice(segments);
        self.updated_at = now;
    }

    pub fn is_chunk_done(&self, chunk_index: u32) -> bool {
        self.completed_chunk_indices.contains(&chunk_index)
    }

    /// Whether this checkpoint belongs to `task` with the same chunking.
    pub fn matches(&self, task: &TranslationTask, total_chunks: u32) -> bool {
        self.subtitle_file_path == task.subtitle_file_path
            && self.source_language == task.source_language
            && self.target_language == task.target_language
            && self.total_chunks == total_chunks
    }
}

/// The one place checkpoint file locations are derived.
pub fn checkpoint_path(root: &Path, job_id: &JobId, target_language: &LanguageCode) -> PathBuf {
    root.join(format!("{job_id}.{target_language}.checkpoint"))
}

/// Checkpoint file manager.
#[derive(Clone)]
pub struct CheckpointStore {
    root: PathBuf,
    enabled: bool,
    cleanup_on_success: bool,
}

impl CheckpointStore {
    pub fn new(root: PathBuf, enabled: bool, cleanup_on_success: bool) -> Self {
        Self {
            root,
            enabled,
            cleanup_on_success,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn path(&self, job_id: &JobId, target_language: &LanguageCode) -> PathBuf {
        checkpoint_path(&self.root, job_id, target_language)
    }

    /// Load a checkpoint if one exists.
    ///
    /// An unreadable or corrupt file is treated as absent (with a warning):
    /// checkpoint trouble must never fail the job.
    pub fn load(
        &self,
        job_id: &JobId,
        target_language: &LanguageCode,
    ) -> Option<TranslationCheckpoint> {
        if !self.enabled {
            return None;
        }
        let path = self.path(job_id, target_language);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read checkpoint");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt checkpoint, ignoring");
                None
            }
        }
    }

    /// Persist a checkpoint atomically.
    pub fn save(&self, checkpoint: &TranslationCheckpoint) -> Result<(), StoreError> {
        if !self.enabled {
            return Ok(());
        }
        std::fs::create_dir_all(&self.root)?;
        let path = self.path(&checkpoint.job_id, &checkpoint.target_language);
        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&serde_json::to_vec(checkpoint)?)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &path)?;
        debug!(
            path = %path.display(),
            chunks = checkpoint.completed_chunk_indices.len(),
            total = checkpoint.total_chunks,
            "checkpoint saved",
        );
        Ok(())
    }

    /// Remove the checkpoint after a successful translation.
    ///
    /// Honors `cleanup_on_success`; removal failures are logged, not raised.
    pub fn remove_on_success(&self, job_id: &JobId, target_language: &LanguageCode) {
        if !self.enabled || !self.cleanup_on_success {
            return;
        }
        let path = self.path(job_id, target_language);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "cannot remove checkpoint"),
        }
    }

    pub fn exists(&self, job_id: &JobId, target_language: &LanguageCode) -> bool {
        self.path(job_id, target_language).exists()
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
