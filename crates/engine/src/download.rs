// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Download worker: acquires a subtitle artifact for each task.
//!
//! Desired language first; when it is unavailable the worker falls back to
//! the configured fallback language and hands the job to the translation
//! path via `subtitle.translate.requested`. The worker never writes queues
//! directly; the orchestrator turns its events into queue messages.

use crate::gateway::{ProviderError, ProviderGateway, SubtitleCandidate, SubtitleQuery};
use crate::orchestrator::settle;
use crate::Disposition;
use sr_bus::{Broker, Consumer, Delivery};
use sr_core::{Clock, DownloadTask, Envelope, ErrorKind, Event, IdGen, JobStatus, LanguageCode};
use sr_storage::{AdvanceOutcome, JobStore};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

const SOURCE: &str = "download-worker";

/// Consumes `subtitle.download` tasks.
pub struct DownloadWorker<P: ProviderGateway, C: Clock, I: IdGen> {
    broker: Broker,
    jobs: JobStore,
    gateway: Arc<P>,
    fallback_language: LanguageCode,
    clock: C,
    ids: I,
}

impl<P: ProviderGateway, C: Clock, I: IdGen> DownloadWorker<P, C, I> {
    pub fn new(
        broker: Broker,
        jobs: JobStore,
        gateway: Arc<P>,
        fallback_language: LanguageCode,
        clock: C,
        ids: I,
    ) -> Self {
        Self {
            broker,
            jobs,
            gateway,
            fallback_language,
            clock,
            ids,
        }
    }

    /// Consume download tasks until shutdown fires.
    pub async fn run(self, mut consumer: Consumer, mut shutdown: oneshot::Receiver<()>) {
        info!("download worker started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                delivery = consumer.recv() => match delivery {
                    Ok(delivery) => self.handle_delivery(delivery).await,
                    Err(e) => {
                        error!(error = %e, "download worker receive failed");
                        break;
                    }
                },
            }
        }
        info!("download worker stopped");
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let task: DownloadTask = match delivery.decode() {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, "undecodable download task, dropping");
                settle(delivery, Disposition::Drop);
                return;
            }
        };
        let disposition = self
            .process(&task, delivery.message_id(), delivery.redelivered())
            .await;
        settle(delivery, disposition);
    }

    pub(crate) async fn process(
        &self,
        task: &DownloadTask,
        message_id: &str,
        redelivered: bool,
    ) -> Disposition {
        debug!(job_id = %task.job_id, language = %task.language, redelivered, "download task");

        // Worker pickup: DOWNLOAD_QUEUED → DOWNLOAD_IN_PROGRESS, idempotent
        // on the task's message id so a redelivery cannot double-advance.
        let pickup = self.jobs.advance(
            &task.job_id,
            JobStatus::DownloadInProgress,
            &format!("task:{message_id}"),
            self.clock.now_utc(),
        );
        match pickup {
            Err(e) => {
                warn!(job_id = %task.job_id, error = %e, "cannot record pickup");
                return Disposition::Requeue;
            }
            Ok(AdvanceOutcome::Unknown) => {
                warn!(job_id = %task.job_id, "download task for unknown job, dropping");
                return Disposition::Drop;
            }
            Ok(_) => {}
        }

        // Desired language first.
        let desired_failure = match self.try_language(task, &task.language).await {
            Ok(Some(path)) => {
                return self.emit(
                    task,
                    Event::SubtitleReady {
                        subtitle_path: path,
                        language: task.language.clone(),
                        provider: None,
                    },
                );
            }
            Ok(None) => "no candidates for desired language".to_string(),
            Err(e) if e.kind() == ErrorKind::RateLimit => {
                return self.emit_failure(task, ErrorKind::RateLimit, &e.to_string());
            }
            // Other provider errors fall through to the translation
            // fallback, carrying the cause for the event log.
            Err(e) => e.to_string(),
        };

        if !self.auto_translate_allowed(task) {
            return self.emit_failure(task, ErrorKind::PermanentClient, "subtitle_not_found");
        }
        if self.fallback_language == task.language {
            return self.emit_failure(task, ErrorKind::PermanentClient, "subtitle_not_found");
        }

        // Fallback language; success routes into the translation path.
        match self.try_language(task, &self.fallback_language).await {
            Ok(Some(path)) => self.emit(
                task,
                Event::TranslateRequested {
                    subtitle_path: path,
                    source_language: self.fallback_language.clone(),
                    target_language: task.language.clone(),
                    reason: Some(desired_failure),
                },
            ),
            Ok(None) => self.emit_failure(task, ErrorKind::PermanentClient, "subtitle_not_found"),
            Err(e) if e.kind() == ErrorKind::RateLimit => {
                self.emit_failure(task, ErrorKind::RateLimit, &e.to_string())
            }
            Err(e) => self.emit_failure(task, e.kind(), &e.to_string()),
        }
    }

    /// Search and download the best candidate for one language.
    ///
    /// `Ok(None)` means the provider answered but offered nothing.
    async fn try_language(
        &self,
        task: &DownloadTask,
        language: &LanguageCode,
    ) -> Result<Option<std::path::PathBuf>, ProviderError> {
        let query = SubtitleQuery {
            title: task.video_title.clone(),
            imdb_id: None,
            language: language.clone(),
        };
        let candidates = self.gateway.search(&query).await?;
        let Some(best) = best_candidate(&candidates) else {
            return Ok(None);
        };
        debug!(
            job_id = %task.job_id,
            provider = %best.provider,
            score = best.score,
            "downloading candidate",
        );
        let path = self.gateway.download(best).await?;
        Ok(Some(path))
    }

    fn auto_translate_allowed(&self, task: &DownloadTask) -> bool {
        match self.jobs.get(&task.job_id) {
            Ok(Some(job)) => job
                .metadata
                .get("auto_translate")
                .map(|v| v != "false")
                .unwrap_or(true),
            _ => true,
        }
    }

    fn emit(&self, task: &DownloadTask, event: Event) -> Disposition {
        let envelope = Envelope::new(
            self.ids.next(),
            task.job_id.clone(),
            self.clock.now_utc(),
            SOURCE,
            event,
        );
        match self.broker.publish(&envelope) {
            Ok(()) => Disposition::Ack,
            Err(e) => {
                warn!(job_id = %task.job_id, error = %e, "cannot publish, requeueing task");
                Disposition::Requeue
            }
        }
    }

    fn emit_failure(&self, task: &DownloadTask, kind: ErrorKind, message: &str) -> Disposition {
        info!(job_id = %task.job_id, %kind, message, "download failed");
        let disposition = self.emit(
            task,
            Event::JobFailed {
                error_type: kind,
                error_message: message.to_string(),
            },
        );
        match disposition {
            // Terminal outcome: the task must not redeliver.
            Disposition::Ack => Disposition::Ack,
            other => other,
        }
    }
}

/// Highest-scoring candidate.
fn best_candidate(candidates: &[SubtitleCandidate]) -> Option<&SubtitleCandidate> {
    candidates
        .iter()
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
}

#[cfg(test)]
#[path = "download_tests.rs"]
mod tests;
