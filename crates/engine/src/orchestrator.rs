// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator: converts requests into work items and reconciles
//! worker-published events into job-store state.
//!
//! This is the only component that writes task-queue messages and the only
//! one that mirrors events into job event logs. Several instances may run
//! concurrently: the broker provides competitive consumption, and the dedup
//! service plus idempotent transitions make concurrent advancement safe.

use crate::Disposition;
use serde::Serialize;
use sr_bus::{Broker, BusError, Consumer, Delivery};
use sr_core::{
    keys, Clock, DownloadTask, Envelope, Event, IdGen, Job, JobConfig, JobStatus, RetryPolicy,
    TranslationTask, DOWNLOAD_QUEUE, TRANSLATION_QUEUE,
};
use sr_storage::{AdvanceOutcome, DedupDecision, DedupService, DedupStore, JobStore, StoreError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Queue the orchestrator consumes its event subscriptions from.
pub const ORCHESTRATOR_QUEUE: &str = "orchestrator";

const SOURCE: &str = "orchestrator";

/// Routing keys the orchestrator reconciles into job state.
///
/// Audit-only keys (`subtitle.download.requested`, `media.file.detected`)
/// are deliberately absent so they never inflate job event logs.
pub const BINDINGS: [&str; 6] = [
    keys::SUBTITLE_REQUESTED,
    keys::SUBTITLE_READY,
    keys::SUBTITLE_TRANSLATE_REQUESTED,
    keys::SUBTITLE_TRANSLATED,
    keys::TRANSLATION_COMPLETED,
    keys::JOB_FAILED,
];

/// The single queue producer and job-state reconciler.
pub struct Orchestrator<S: DedupStore, C: Clock, I: IdGen> {
    broker: Broker,
    jobs: JobStore,
    dedup: Arc<DedupService<S>>,
    clock: C,
    ids: I,
    preferred_sources: Vec<String>,
    publish_retry: RetryPolicy,
}

impl<S: DedupStore, C: Clock, I: IdGen> Orchestrator<S, C, I> {
    pub fn new(
        broker: Broker,
        jobs: JobStore,
        dedup: Arc<DedupService<S>>,
        clock: C,
        ids: I,
    ) -> Self {
        Self {
            broker,
            jobs,
            dedup,
            clock,
            ids,
            preferred_sources: Vec::new(),
            publish_retry: RetryPolicy::default(),
        }
    }

    /// Providers listed on produced download tasks.
    pub fn with_preferred_sources(mut self, sources: Vec<String>) -> Self {
        self.preferred_sources = sources;
        self
    }

    /// Backoff for task enqueues (tests shrink the delays).
    pub fn with_publish_retry(mut self, policy: RetryPolicy) -> Self {
        self.publish_retry = policy;
        self
    }

    /// Declare the queues and bindings the pipeline relies on. Idempotent.
    pub fn declare_topology(broker: &Broker) -> Result<(), BusError> {
        broker.declare_queue(ORCHESTRATOR_QUEUE)?;
        broker.declare_queue(DOWNLOAD_QUEUE)?;
        broker.declare_queue(TRANSLATION_QUEUE)?;
        for key in BINDINGS {
            broker.bind(ORCHESTRATOR_QUEUE, key)?;
        }
        Ok(())
    }

    /// Consume events until shutdown fires.
    pub async fn run(self, mut consumer: Consumer, mut shutdown: oneshot::Receiver<()>) {
        info!("orchestrator started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                delivery = consumer.recv() => match delivery {
                    Ok(delivery) => self.handle_delivery(delivery).await,
                    Err(e) => {
                        error!(error = %e, "orchestrator receive failed");
                        break;
                    }
                },
            }
        }
        info!("orchestrator stopped");
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let envelope: Envelope = match delivery.decode() {
            Ok(envelope) => envelope,
            Err(e) => {
                // A body that cannot even decode would poison the queue.
                warn!(error = %e, "undecodable event, dropping");
                settle(delivery, Disposition::Drop);
                return;
            }
        };
        debug!(event = %envelope.log_summary(), "orchestrator event");
        let disposition = self.handle_event(&envelope).await;
        settle(delivery, disposition);
    }

    pub(crate) async fn handle_event(&self, envelope: &Envelope) -> Disposition {
        match &envelope.event {
            Event::SubtitleRequested {
                video_url,
                video_title,
                language,
                metadata,
            } => {
                self.on_requested(envelope, video_url, video_title, language, metadata)
                    .await
            }
            Event::SubtitleReady {
                subtitle_path,
                provider,
                ..
            } => self.on_ready(envelope, subtitle_path, provider.as_deref()),
            Event::TranslateRequested {
                subtitle_path,
                source_language,
                target_language,
                reason,
            } => {
                self.on_translate_requested(
                    envelope,
                    subtitle_path,
                    source_language,
                    target_language,
                    reason.as_deref(),
                )
                .await
            }
            Event::TranslationCompleted {
                duration_seconds, ..
            } => self.on_completed(envelope, *duration_seconds),
            Event::SubtitleTranslated { subtitle_path, .. } => {
                self.on_translated(envelope, subtitle_path)
            }
            Event::JobFailed {
                error_type,
                error_message,
            } => self.on_failed(envelope, &error_type.to_string(), error_message),
            Event::DownloadRequested { .. } | Event::MediaFileDetected { .. } => {
                // Audit-only traffic; nothing to reconcile.
                Disposition::Ack
            }
            Event::Unknown => {
                // Unknown types are forward-compatible noise: never NACK.
                info!(job_id = %envelope.job_id, "ignoring unknown event type");
                Disposition::Ack
            }
        }
    }

    async fn on_requested(
        &self,
        envelope: &Envelope,
        video_url: &str,
        video_title: &str,
        language: &sr_core::LanguageCode,
        metadata: &std::collections::HashMap<String, String>,
    ) -> Disposition {
        // Defense-in-depth: ingress already ran this check. The ingress
        // registration stored our own job id, which is not a duplicate.
        if let DedupDecision::Duplicate { existing } =
            self.dedup
                .check_and_register(video_url, language, &envelope.job_id)
        {
            if existing != envelope.job_id {
                warn!(
                    job_id = %envelope.job_id,
                    existing = %existing,
                    "duplicate request reached orchestrator (ingress dedup bypassed)",
                );
                return Disposition::Ack;
            }
        }

        let now = self.clock.now_utc();
        let upsert = (|| -> Result<AdvanceOutcome, StoreError> {
            if self.jobs.get(&envelope.job_id)?.is_none() {
                let mut job = Job::new(
                    JobConfig {
                        job_id: envelope.job_id.clone(),
                        video_url: video_url.to_string(),
                        video_title: video_title.to_string(),
                        language: language.clone(),
                        metadata: metadata.clone(),
                    },
                    now,
                );
                job.metadata
                    .entry("source".to_string())
                    .or_insert_with(|| envelope.source.clone());
                self.jobs.put(&job)?;
            }
            self.jobs.advance(
                &envelope.job_id,
                JobStatus::DownloadQueued,
                envelope.event_id.as_str(),
                now,
            )
        })();

        let outcome = match upsert {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(job_id = %envelope.job_id, error = %e, "job upsert failed");
                return Disposition::Requeue;
            }
        };

        match outcome {
            AdvanceOutcome::Duplicate => return Disposition::Ack,
            AdvanceOutcome::Advanced => {
                let task = DownloadTask {
                    job_id: envelope.job_id.clone(),
                    video_url: video_url.to_string(),
                    video_title: video_title.to_string(),
                    language: language.clone(),
                    preferred_sources: self.preferred_sources.clone(),
                };
                if !self.enqueue_with_retry(DOWNLOAD_QUEUE, &task).await {
                    return self.fail_job_internal(envelope, "download task enqueue failed");
                }

                let observer = Envelope::new(
                    self.ids.next(),
                    envelope.job_id.clone(),
                    now,
                    SOURCE,
                    Event::DownloadRequested {
                        video_url: video_url.to_string(),
                        video_title: video_title.to_string(),
                        language: language.clone(),
                        preferred_sources: self.preferred_sources.clone(),
                    },
                );
                if let Err(e) = self.broker.publish(&observer) {
                    warn!(error = %e, "cannot publish download.requested");
                }
            }
            AdvanceOutcome::OutOfOrder | AdvanceOutcome::Unknown => {}
        }

        self.record(envelope);
        Disposition::Ack
    }

    fn on_ready(
        &self,
        envelope: &Envelope,
        subtitle_path: &Path,
        provider: Option<&str>,
    ) -> Disposition {
        let now = self.clock.now_utc();
        match self.jobs.advance(
            &envelope.job_id,
            JobStatus::Done,
            envelope.event_id.as_str(),
            now,
        ) {
            Err(e) => {
                warn!(job_id = %envelope.job_id, error = %e, "state update failed");
                Disposition::Requeue
            }
            Ok(AdvanceOutcome::Unknown) => {
                warn!(job_id = %envelope.job_id, "subtitle.ready for unknown job");
                Disposition::Ack
            }
            Ok(AdvanceOutcome::Duplicate) => Disposition::Ack,
            Ok(AdvanceOutcome::Advanced) | Ok(AdvanceOutcome::OutOfOrder) => {
                self.set_artifact(envelope, subtitle_path, provider);
                self.record(envelope);
                Disposition::Ack
            }
        }
    }

    async fn on_translate_requested(
        &self,
        envelope: &Envelope,
        subtitle_path: &Path,
        source_language: &sr_core::LanguageCode,
        target_language: &sr_core::LanguageCode,
        reason: Option<&str>,
    ) -> Disposition {
        let now = self.clock.now_utc();
        match self.jobs.advance(
            &envelope.job_id,
            JobStatus::TranslateQueued,
            envelope.event_id.as_str(),
            now,
        ) {
            Err(e) => {
                warn!(job_id = %envelope.job_id, error = %e, "state update failed");
                Disposition::Requeue
            }
            Ok(AdvanceOutcome::Unknown) => {
                warn!(job_id = %envelope.job_id, "translate.requested for unknown job");
                Disposition::Ack
            }
            Ok(AdvanceOutcome::Duplicate) => Disposition::Ack,
            Ok(AdvanceOutcome::OutOfOrder) => {
                self.record(envelope);
                Disposition::Ack
            }
            Ok(AdvanceOutcome::Advanced) => {
                let target = target_language.clone();
                let reason = reason.map(str::to_string);
                let update = self.jobs.update(&envelope.job_id, |job| {
                    job.target_language = Some(target);
                    if let Some(reason) = reason {
                        job.metadata.insert("translate_reason".to_string(), reason);
                    }
                });
                if let Err(e) = update {
                    warn!(job_id = %envelope.job_id, error = %e, "cannot store target language");
                }

                let task = TranslationTask {
                    job_id: envelope.job_id.clone(),
                    subtitle_file_path: subtitle_path.to_owned(),
                    source_language: source_language.clone(),
                    target_language: target_language.clone(),
                };
                if !self.enqueue_with_retry(TRANSLATION_QUEUE, &task).await {
                    return self.fail_job_internal(envelope, "translation task enqueue failed");
                }
                self.record(envelope);
                Disposition::Ack
            }
        }
    }

    fn on_completed(&self, envelope: &Envelope, duration_seconds: f64) -> Disposition {
        let now = self.clock.now_utc();
        match self.jobs.advance(
            &envelope.job_id,
            JobStatus::Done,
            envelope.event_id.as_str(),
            now,
        ) {
            Err(e) => {
                warn!(job_id = %envelope.job_id, error = %e, "state update failed");
                Disposition::Requeue
            }
            Ok(AdvanceOutcome::Unknown) => {
                warn!(job_id = %envelope.job_id, "translation.completed for unknown job");
                Disposition::Ack
            }
            Ok(AdvanceOutcome::Duplicate) => Disposition::Ack,
            Ok(AdvanceOutcome::Advanced) | Ok(AdvanceOutcome::OutOfOrder) => {
                let update = self.jobs.update(&envelope.job_id, |job| {
                    job.metadata.insert(
                        "duration_seconds".to_string(),
                        format!("{duration_seconds:.3}"),
                    );
                });
                if let Err(e) = update {
                    warn!(job_id = %envelope.job_id, error = %e, "cannot store timing metadata");
                }
                self.record(envelope);
                Disposition::Ack
            }
        }
    }

    fn on_translated(&self, envelope: &Envelope, subtitle_path: &Path) -> Disposition {
        let now = self.clock.now_utc();
        match self.jobs.advance(
            &envelope.job_id,
            JobStatus::Done,
            envelope.event_id.as_str(),
            now,
        ) {
            Err(e) => {
                warn!(job_id = %envelope.job_id, error = %e, "state update failed");
                Disposition::Requeue
            }
            Ok(AdvanceOutcome::Unknown) => {
                warn!(job_id = %envelope.job_id, "subtitle.translated for unknown job");
                Disposition::Ack
            }
            Ok(AdvanceOutcome::Duplicate) => Disposition::Ack,
            Ok(AdvanceOutcome::Advanced) | Ok(AdvanceOutcome::OutOfOrder) => {
                // translation.completed may have finished the job already;
                // the artifact path still lands (last-writer-wins field).
                self.set_artifact(envelope, subtitle_path, None);
                self.record(envelope);
                Disposition::Ack
            }
        }
    }

    fn on_failed(&self, envelope: &Envelope, error_type: &str, error_message: &str) -> Disposition {
        let now = self.clock.now_utc();
        match self.jobs.advance(
            &envelope.job_id,
            JobStatus::Failed,
            envelope.event_id.as_str(),
            now,
        ) {
            Err(e) => {
                warn!(job_id = %envelope.job_id, error = %e, "state update failed");
                Disposition::Requeue
            }
            Ok(AdvanceOutcome::Unknown) => {
                warn!(job_id = %envelope.job_id, "job.failed for unknown job");
                Disposition::Ack
            }
            Ok(AdvanceOutcome::Duplicate) => Disposition::Ack,
            Ok(outcome) => {
                if outcome == AdvanceOutcome::Advanced {
                    let message = error_message.to_string();
                    let kind = error_type.to_string();
                    let update = self.jobs.update(&envelope.job_id, |job| {
                        job.error_message = Some(message);
                        job.metadata.insert("error_type".to_string(), kind);
                    });
                    if let Err(e) = update {
                        warn!(job_id = %envelope.job_id, error = %e, "cannot store failure");
                    }
                }
                self.record(envelope);
                Disposition::Ack
            }
        }
    }

    fn set_artifact(&self, envelope: &Envelope, subtitle_path: &Path, provider: Option<&str>) {
        let path: PathBuf = subtitle_path.to_owned();
        let provider = provider.map(str::to_string);
        let update = self.jobs.update(&envelope.job_id, |job| {
            job.result_url = Some(path.display().to_string());
            job.subtitle_path = Some(path);
            if let Some(provider) = provider {
                job.metadata.insert("provider".to_string(), provider);
            }
        });
        if let Err(e) = update {
            warn!(job_id = %envelope.job_id, error = %e, "cannot store artifact path");
        }
    }

    fn record(&self, envelope: &Envelope) {
        if let Err(e) = self.jobs.record_event(envelope) {
            warn!(job_id = %envelope.job_id, error = %e, "cannot append to event log");
        }
    }

    async fn enqueue_with_retry<T: Serialize>(&self, queue: &str, body: &T) -> bool {
        for attempt in 0..=self.publish_retry.max_retries {
            match self.broker.enqueue(queue, body) {
                Ok(_) => return true,
                Err(e) => {
                    warn!(queue, attempt, error = %e, "task enqueue failed");
                    if attempt < self.publish_retry.max_retries {
                        tokio::time::sleep(self.publish_retry.jittered_delay(attempt + 1)).await;
                    }
                }
            }
        }
        false
    }

    /// Enqueue retries exhausted: fail the job and drop the trigger.
    fn fail_job_internal(&self, envelope: &Envelope, message: &str) -> Disposition {
        let now = self.clock.now_utc();
        let message_owned = message.to_string();
        let update = self.jobs.update(&envelope.job_id, |job| {
            job.fail(message_owned, now);
            job.metadata
                .insert("error_type".to_string(), "transient_infrastructure".to_string());
        });
        if let Err(e) = update {
            warn!(job_id = %envelope.job_id, error = %e, "cannot mark job failed");
        }
        Disposition::Drop
    }
}

pub(crate) fn settle(delivery: Delivery, disposition: Disposition) {
    let result = match disposition {
        Disposition::Ack => delivery.ack(),
        Disposition::Requeue => delivery.nack(true),
        Disposition::Drop => delivery.nack(false),
    };
    if let Err(e) = result {
        warn!(error = %e, "cannot settle delivery");
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
