// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem watcher ingress.
//!
//! Observes a media root with `notify`, debounces each file until its size
//! has been stable for the configured window (so half-copied files are
//! never submitted), filters by extension whitelist, derives a display
//! title from the path, and submits the canonical request.

use crate::ingress::{IngressContext, MediaRequest};
use notify::{RecursiveMode, Watcher};
use sr_core::{Clock, Event, IdGen, WatcherConfig};
use sr_storage::DedupStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Start watching the configured media root. Returns a shutdown sender.
pub fn start_watcher<S, C, I>(
    config: WatcherConfig,
    ingress: Arc<IngressContext<S, C, I>>,
) -> oneshot::Sender<()>
where
    S: DedupStore + 'static,
    C: Clock + 'static,
    I: IdGen + 'static,
{
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(watch_media(config, ingress, shutdown_rx));
    shutdown_tx
}

async fn watch_media<S, C, I>(
    config: WatcherConfig,
    ingress: Arc<IngressContext<S, C, I>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) where
    S: DedupStore + 'static,
    C: Clock + 'static,
    I: IdGen + 'static,
{
    if !config.enabled {
        return;
    }
    let Some(root) = config.media_root.clone() else {
        warn!("watcher enabled without media_root, not starting");
        return;
    };
    let Some(language) = config.language.clone() else {
        warn!("watcher enabled without language, not starting");
        return;
    };

    let (fs_tx, mut fs_rx) = mpsc::channel::<PathBuf>(64);
    let _watcher_guard = match create_fs_watcher(&root, config.recursive, fs_tx) {
        Ok(watcher) => watcher,
        Err(e) => {
            error!(root = %root.display(), error = %e, "cannot watch media root");
            return;
        }
    };
    info!(root = %root.display(), recursive = config.recursive, "watching media root");

    let mut debouncer = Debouncer::new(config.debounce());
    let poll = poll_interval(config.debounce());

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,

            changed = fs_rx.recv() => {
                let Some(path) = changed else { break };
                if is_candidate(&path, &config.extensions) {
                    debouncer.observe(&path, file_size(&path), Instant::now());
                }
            }

            _ = tokio::time::sleep(poll) => {
                // Re-stat pending files so growth resets their window.
                for path in debouncer.pending_paths() {
                    debouncer.observe(&path, file_size(&path), Instant::now());
                }
                for path in debouncer.take_ready(Instant::now()) {
                    submit_detected(&config, &ingress, &language, &path);
                }
            }
        }
    }
    info!("watcher stopped");
}

fn submit_detected<S, C, I>(
    config: &WatcherConfig,
    ingress: &IngressContext<S, C, I>,
    language: &sr_core::LanguageCode,
    path: &Path,
) where
    S: DedupStore,
    C: Clock,
    I: IdGen,
{
    let title = derive_title(path);
    let url = format!("file://{}", path.display());

    let mut metadata = HashMap::new();
    metadata.insert("origin".to_string(), "watcher".to_string());
    metadata.insert(
        "auto_translate".to_string(),
        config.auto_translate.to_string(),
    );

    let request = MediaRequest {
        video_url: url,
        video_title: title.clone(),
        language: language.clone(),
        metadata,
    };
    match ingress.submit(request) {
        Ok(outcome) => {
            debug!(path = %path.display(), ?outcome, "media file submitted");
            if let crate::ingress::IngressOutcome::Received { job_id } = outcome {
                // Audit-trail event for observers.
                let detected = Event::MediaFileDetected {
                    path: path.to_owned(),
                    title,
                };
                if let Err(e) = ingress.emit(&job_id, detected) {
                    warn!(error = %e, "cannot publish media.file.detected");
                }
            }
        }
        Err(e) => warn!(path = %path.display(), error = %e, "cannot submit detected file"),
    }
}

fn create_fs_watcher(
    root: &Path,
    recursive: bool,
    tx: mpsc::Sender<PathBuf>,
) -> notify::Result<notify::RecommendedWatcher> {
    let mut watcher =
        notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            if let Ok(event) = result {
                for path in event.paths {
                    let _ = tx.blocking_send(path);
                }
            }
        })?;
    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher.watch(root, mode)?;
    Ok(watcher)
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).map(|m| m.len()).ok()
}

fn poll_interval(debounce: Duration) -> Duration {
    (debounce / 2).clamp(Duration::from_millis(100), Duration::from_secs(1))
}

/// Extension whitelist check (case-insensitive).
pub(crate) fn is_candidate(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext))
}

/// Display title from the file name: separators become spaces.
pub(crate) fn derive_title(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.replace(['.', '_'], " ").trim().to_string()
}

/// Size-stabilization debounce: a file is ready once its size has not
/// changed for the full window. A vanished file is forgotten.
pub(crate) struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, PendingFile>,
}

struct PendingFile {
    size: u64,
    stable_since: Instant,
}

impl Debouncer {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    /// Record an observation of the file's current size.
    pub(crate) fn observe(&mut self, path: &Path, size: Option<u64>, now: Instant) {
        let Some(size) = size else {
            self.pending.remove(path);
            return;
        };
        match self.pending.get_mut(path) {
            Some(entry) if entry.size == size => {}
            Some(entry) => {
                entry.size = size;
                entry.stable_since = now;
            }
            None => {
                self.pending.insert(
                    path.to_owned(),
                    PendingFile {
                        size,
                        stable_since: now,
                    },
                );
            }
        }
    }

    pub(crate) fn pending_paths(&self) -> Vec<PathBuf> {
        self.pending.keys().cloned().collect()
    }

    /// Files whose size has been stable for the window, removed from
    /// tracking.
    pub(crate) fn take_ready(&mut self, now: Instant) -> Vec<PathBuf> {
        let window = self.window;
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.stable_since) >= window)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &ready {
            self.pending.remove(path);
        }
        ready
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
