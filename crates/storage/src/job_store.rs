// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable job store: one JSON document per job plus an append-only
//! per-job event log.
//!
//! Layout under the state root:
//! - `jobs/{job_id}.json` — the job record, written atomically
//!   (tmp → fsync → rename → fsync dir).
//! - `events/{job_id}.jsonl` — the ordered event log, append-only.
//!
//! Status advances go through [`JobStore::advance`], which enforces the
//! state-machine edges and is idempotent on event id. Writers race only on
//! non-status fields, where last-writer-wins is acceptable.

use crate::StoreError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sr_core::{Envelope, Job, JobId, JobStatus, TtlConfig};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a guarded status advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The edge was legal; the status changed.
    Advanced,
    /// This event id was already applied; nothing changed.
    Duplicate,
    /// The edge is not legal from the current status. The event is still
    /// recorded as applied so a redelivery stays a no-op.
    OutOfOrder,
    /// No job record exists for this id.
    Unknown,
}

/// File-backed job store. Cheap to clone; clones share one write lock.
#[derive(Clone)]
pub struct JobStore {
    jobs_dir: PathBuf,
    events_dir: PathBuf,
    /// Serializes read-modify-write cycles across clones.
    write_lock: Arc<Mutex<()>>,
}

impl JobStore {
    /// Open or create the store under `state_dir`.
    pub fn open(state_dir: &Path) -> Result<Self, StoreError> {
        let jobs_dir = state_dir.join("jobs");
        let events_dir = state_dir.join("events");
        std::fs::create_dir_all(&jobs_dir)?;
        std::fs::create_dir_all(&events_dir)?;
        Ok(Self {
            jobs_dir,
            events_dir,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn job_path(&self, job_id: &JobId) -> PathBuf {
        self.jobs_dir.join(format!("{job_id}.json"))
    }

    fn events_path(&self, job_id: &JobId) -> PathBuf {
        self.events_dir.join(format!("{job_id}.jsonl"))
    }

    /// Fetch a job record.
    pub fn get(&self, job_id: &JobId) -> Result<Option<Job>, StoreError> {
        let path = self.job_path(job_id);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a job record atomically.
    pub fn put(&self, job: &Job) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        self.write_job(job)
    }

    fn write_job(&self, job: &Job) -> Result<(), StoreError> {
        let path = self.job_path(&job.job_id);
        let tmp = path.with_extension("tmp");

        let bytes = serde_json::to_vec_pretty(job)?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &path)?;
        if let Ok(dir) = File::open(&self.jobs_dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    /// Read-modify-write under the store lock.
    ///
    /// The mutator sees the latest record; the result is written atomically.
    pub fn update<F>(&self, job_id: &JobId, mutate: F) -> Result<Job, StoreError>
    where
        F: FnOnce(&mut Job),
    {
        let _guard = self.write_lock.lock();
        let mut job = self
            .get(job_id)?
            .ok_or_else(|| StoreError::UnknownJob(job_id.to_string()))?;
        mutate(&mut job);
        self.write_job(&job)?;
        Ok(job)
    }

    /// Guarded, idempotent status advance.
    ///
    /// `event_id` identifies the triggering event or task delivery; a repeat
    /// of an already-applied id never advances twice. An illegal edge is
    /// recorded (so redeliveries stay no-ops) but leaves the status alone.
    pub fn advance(
        &self,
        job_id: &JobId,
        next: JobStatus,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AdvanceOutcome, StoreError> {
        let _guard = self.write_lock.lock();
        let Some(mut job) = self.get(job_id)? else {
            return Ok(AdvanceOutcome::Unknown);
        };

        if job.has_applied(event_id) {
            debug!(job_id = %job_id, event_id, "event already applied");
            return Ok(AdvanceOutcome::Duplicate);
        }
        job.mark_applied(event_id);

        let outcome = if job.advance(next, now) {
            AdvanceOutcome::Advanced
        } else {
            warn!(
                job_id = %job_id,
                from = %job.status,
                to = %next,
                event_id,
                "transition rejected, status unchanged",
            );
            job.touch(now);
            AdvanceOutcome::OutOfOrder
        };
        self.write_job(&job)?;
        Ok(outcome)
    }

    /// Append an envelope to the job's event log. Insertion order preserved.
    pub fn record_event(&self, envelope: &Envelope) -> Result<(), StoreError> {
        let path = self.events_path(&envelope.job_id);
        let mut bytes = serde_json::to_vec(envelope)?;
        bytes.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// The job's ordered event log.
    pub fn events(&self, job_id: &JobId) -> Result<Vec<Envelope>, StoreError> {
        let path = self.events_path(job_id);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str(trimmed) {
                Ok(envelope) => events.push(envelope),
                Err(e) => {
                    warn!(
                        job_id = %job_id,
                        error = %e,
                        "skipping corrupt event log line",
                    );
                }
            }
        }
        Ok(events)
    }

    /// All stored job ids, unordered.
    pub fn list_ids(&self) -> Result<Vec<JobId>, StoreError> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.jobs_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(JobId::new(stem));
            }
        }
        Ok(ids)
    }

    /// Remove terminal jobs whose retention window has passed.
    ///
    /// Active jobs never expire. Returns the number of jobs removed.
    pub fn sweep_expired(&self, ttl: &TtlConfig, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock();
        let mut removed = 0;
        for job_id in self.list_ids()? {
            let Some(job) = self.get(&job_id)? else {
                continue;
            };
            let retention = match job.status {
                JobStatus::Done => ttl.completed(),
                JobStatus::Failed => ttl.failed(),
                _ => continue,
            };
            let Ok(retention) = chrono::Duration::from_std(retention) else {
                continue;
            };
            if job.updated_at + retention <= now {
                debug!(job_id = %job_id, status = %job.status, "expiring job");
                std::fs::remove_file(self.job_path(&job_id))?;
                let events = self.events_path(&job_id);
                if events.exists() {
                    std::fs::remove_file(events)?;
                }
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Liveness probe: verify the jobs directory still accepts writes.
    pub fn ping(&self) -> bool {
        let probe = self.jobs_dir.join(".ping");
        std::fs::write(&probe, b"ok").is_ok()
    }
}

#[cfg(test)]
#[path = "job_store_tests.rs"]
mod tests;
