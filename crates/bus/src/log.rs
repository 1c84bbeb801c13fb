// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL message log backing each queue.
//!
//! Each line records one operation:
//! `{"op":"push","id":…,"body":…}`, `{"op":"ack","id":…}`, or
//! `{"op":"nack","id":…,"requeue":…}`. Replaying the log yields the live
//! (pushed but not settled) messages in push order, which is how
//! unacknowledged work survives a restart.
//!
//! Push records are fsynced before `push` returns (the publish durability
//! point). Ack/nack records are written without fsync: losing one merely
//! causes a redelivery, which at-least-once semantics already permit.

use crate::BusError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Compact once the log holds this many records with under half of them live.
const COMPACT_THRESHOLD: usize = 1_024;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum LogRecord {
    Push {
        id: String,
        body: Value,
    },
    Ack {
        id: String,
    },
    Nack {
        id: String,
        requeue: bool,
    },
}

/// A message recovered from or held by the log.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: String,
    pub body: Value,
    /// True once the message has been returned to the queue by a
    /// nack-with-requeue (including one recovered from the log).
    pub redelivered: bool,
}

/// Append-only message log with replay and compaction.
pub struct MessageLog {
    file: File,
    path: PathBuf,
    record_count: usize,
    live_count: usize,
}

impl MessageLog {
    /// Open or create the log, returning live messages in push order.
    pub fn open(path: &Path) -> Result<(Self, Vec<StoredMessage>), BusError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let (live, record_count) = Self::replay(&file, path)?;
        let live_count = live.len();

        Ok((
            Self {
                file,
                path: path.to_owned(),
                record_count,
                live_count,
            },
            live,
        ))
    }

    /// Replay all records, folding settles into the pending set.
    fn replay(file: &File, path: &Path) -> Result<(Vec<StoredMessage>, usize), BusError> {
        let mut reader = BufReader::new(file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut order: Vec<String> = Vec::new();
        let mut live: HashMap<String, StoredMessage> = HashMap::new();
        let mut record_count = 0usize;
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => break,
                Err(e) => return Err(e.into()),
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let record: LogRecord = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(e) => {
                    // A torn tail write is expected after a crash; anything
                    // beyond the first bad line is dropped with it.
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "corrupt queue log entry, truncating replay",
                    );
                    break;
                }
            };
            record_count += 1;

            match record {
                LogRecord::Push { id, body } => {
                    order.push(id.clone());
                    live.insert(
                        id.clone(),
                        StoredMessage {
                            id,
                            body,
                            redelivered: false,
                        },
                    );
                }
                LogRecord::Ack { id } => {
                    live.remove(&id);
                }
                LogRecord::Nack { id, requeue } => {
                    if requeue {
                        if let Some(msg) = live.get_mut(&id) {
                            msg.redelivered = true;
                        }
                    } else {
                        live.remove(&id);
                    }
                }
            }
        }

        let live_ordered = order
            .into_iter()
            .filter_map(|id| live.remove(&id))
            .collect();
        Ok((live_ordered, record_count))
    }

    /// Append a push record. Durable before return.
    pub fn append_push(&mut self, id: &str, body: &Value) -> Result<(), BusError> {
        self.append(&LogRecord::Push {
            id: id.to_string(),
            body: body.clone(),
        })?;
        self.file.sync_data()?;
        self.live_count += 1;
        Ok(())
    }

    /// Append an ack record (no fsync).
    pub fn append_ack(&mut self, id: &str) -> Result<(), BusError> {
        self.append(&LogRecord::Ack { id: id.to_string() })?;
        self.live_count = self.live_count.saturating_sub(1);
        Ok(())
    }

    /// Append a nack record (no fsync).
    pub fn append_nack(&mut self, id: &str, requeue: bool) -> Result<(), BusError> {
        self.append(&LogRecord::Nack {
            id: id.to_string(),
            requeue,
        })?;
        if !requeue {
            self.live_count = self.live_count.saturating_sub(1);
        }
        Ok(())
    }

    fn append(&mut self, record: &LogRecord) -> Result<(), BusError> {
        let mut bytes = serde_json::to_vec(record)?;
        bytes.push(b'\n');
        self.file.write_all(&bytes)?;
        self.record_count += 1;
        Ok(())
    }

    /// Whether the log has accumulated enough dead records to rewrite.
    pub fn needs_compaction(&self) -> bool {
        self.record_count >= COMPACT_THRESHOLD && self.live_count * 2 < self.record_count
    }

    /// Rewrite the log to contain only the given live messages.
    pub fn compact(&mut self, live: &[StoredMessage]) -> Result<(), BusError> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            for msg in live {
                let mut bytes = serde_json::to_vec(&LogRecord::Push {
                    id: msg.id.clone(),
                    body: msg.body.clone(),
                })?;
                bytes.push(b'\n');
                tmp.write_all(&bytes)?;
            }
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        self.record_count = live.len();
        self.live_count = live.len();
        Ok(())
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
