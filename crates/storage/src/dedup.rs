// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duplicate-suppression registry keyed on `(video_url, language)`.
//!
//! The backend exposes one atomic operation: check-and-register. The service
//! wrapper derives keys, applies the configured window, and fails open when
//! the backend is unavailable (availability over strict dedup).

use crate::StoreError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sr_core::{Clock, DedupConfig, JobId, LanguageCode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Result of the atomic check-and-register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The key was free; `job_id` is now registered.
    Registered,
    /// The key is held by an earlier registrant.
    Existing(JobId),
}

/// Atomic check-and-register backend.
pub trait DedupStore: Send + Sync {
    /// Atomically: if `key` is live, return its holder; otherwise register
    /// `job_id` under `key` for `ttl`.
    fn check_and_register(
        &self,
        key: &str,
        job_id: &JobId,
        ttl: Duration,
    ) -> Result<CasOutcome, StoreError>;

    /// Backend liveness.
    fn ping(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DedupEntry {
    job_id: JobId,
    expires_at_epoch_ms: u64,
}

/// In-memory registry. Atomicity comes from the interior lock.
pub struct MemoryDedupStore<C: Clock> {
    clock: C,
    entries: Mutex<HashMap<String, DedupEntry>>,
}

impl<C: Clock> MemoryDedupStore<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

fn check_map(
    entries: &mut HashMap<String, DedupEntry>,
    key: &str,
    job_id: &JobId,
    ttl: Duration,
    now_ms: u64,
) -> CasOutcome {
    entries.retain(|_, e| e.expires_at_epoch_ms > now_ms);
    if let Some(existing) = entries.get(key) {
        return CasOutcome::Existing(existing.job_id.clone());
    }
    entries.insert(
        key.to_string(),
        DedupEntry {
            job_id: job_id.clone(),
            expires_at_epoch_ms: now_ms + ttl.as_millis() as u64,
        },
    );
    CasOutcome::Registered
}

impl<C: Clock> DedupStore for MemoryDedupStore<C> {
    fn check_and_register(
        &self,
        key: &str,
        job_id: &JobId,
        ttl: Duration,
    ) -> Result<CasOutcome, StoreError> {
        let now_ms = self.clock.epoch_ms();
        let mut entries = self.entries.lock();
        Ok(check_map(&mut entries, key, job_id, ttl, now_ms))
    }
}

/// File-backed registry: the window survives a daemon restart.
///
/// The whole map is small (one entry per recent request), so it is rewritten
/// on every mutation with the usual tmp → rename discipline.
pub struct FileDedupStore<C: Clock> {
    clock: C,
    path: PathBuf,
    entries: Mutex<HashMap<String, DedupEntry>>,
}

impl<C: Clock> FileDedupStore<C> {
    pub fn open(path: &Path, clock: C) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entries = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "corrupt dedup registry, starting empty");
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            clock,
            path: path.to_owned(),
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, DedupEntry>) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl<C: Clock> DedupStore for FileDedupStore<C> {
    fn check_and_register(
        &self,
        key: &str,
        job_id: &JobId,
        ttl: Duration,
    ) -> Result<CasOutcome, StoreError> {
        let now_ms = self.clock.epoch_ms();
        let mut entries = self.entries.lock();
        let outcome = check_map(&mut entries, key, job_id, ttl, now_ms);
        self.persist(&entries)?;
        Ok(outcome)
    }

    fn ping(&self) -> bool {
        self.path
            .parent()
            .map(|dir| dir.exists())
            .unwrap_or(false)
    }
}

/// Decision returned to ingress and orchestrator callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    /// First request in the window; the caller's job id is registered.
    New,
    /// A request for the same `(video_url, language)` already holds the key.
    Duplicate { existing: JobId },
    /// Dedup did not run: disabled by config, or the backend is down and the
    /// service failed open.
    Bypassed,
}

/// Dedup service: key derivation, window, fail-open policy.
pub struct DedupService<S: DedupStore> {
    store: S,
    enabled: bool,
    window: Duration,
}

impl<S: DedupStore> DedupService<S> {
    pub fn new(store: S, config: &DedupConfig) -> Self {
        Self {
            store,
            enabled: config.enabled,
            window: config.window(),
        }
    }

    /// Run the duplicate check for a request, registering `job_id` when the
    /// key is free.
    pub fn check_and_register(
        &self,
        video_url: &str,
        language: &LanguageCode,
        job_id: &JobId,
    ) -> DedupDecision {
        if !self.enabled {
            return DedupDecision::Bypassed;
        }
        let key = dedup_key(video_url, language);
        match self.store.check_and_register(&key, job_id, self.window) {
            Ok(CasOutcome::Registered) => {
                debug!(job_id = %job_id, "dedup registered");
                DedupDecision::New
            }
            Ok(CasOutcome::Existing(existing)) => DedupDecision::Duplicate { existing },
            Err(e) => {
                // Fail open: a dedup outage must not block ingress.
                warn!(error = %e, "dedup store unavailable, allowing request");
                DedupDecision::Bypassed
            }
        }
    }

    pub fn ping(&self) -> bool {
        self.store.ping()
    }
}

/// Key layout: `dedup:{sha256(video_url + ":" + language)}:{language}`.
pub fn dedup_key(video_url: &str, language: &LanguageCode) -> String {
    let digest = Sha256::digest(format!("{video_url}:{language}").as_bytes());
    format!("dedup:{digest:x}:{language}")
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;
