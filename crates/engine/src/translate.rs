// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Translation worker: parse → chunk → translate with retry → merge,
//! checkpointing after every completed chunk.
//!
//! The worker holds one task at a time (prefetch 1). On restart it re-parses
//! and re-chunks the input (chunking is deterministic) and skips chunks the
//! checkpoint already covers. The task is acknowledged only after both
//! completion events are published.

pub mod chunker;
pub mod merge;
pub mod token;

pub use token::{HeuristicTokenizer, TokenCounter};

use crate::gateway::{LlmError, LlmGateway, TranslateChunkRequest};
use crate::orchestrator::settle;
use crate::Disposition;
use sr_bus::{Broker, Consumer, Delivery};
use sr_core::{
    format_elapsed_ms, srt, Clock, Envelope, ErrorKind, Event, IdGen, JobStatus, LanguageCode,
    LlmConfig, RetryPolicy, SubtitleSegment, TokenBudgetConfig, TranslationTask,
};
use sr_storage::{AdvanceOutcome, CheckpointStore, JobStore, TranslationCheckpoint};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

const SOURCE: &str = "translation-worker";

/// Consumes `subtitle.translation` tasks.
pub struct TranslationWorker<L: LlmGateway, C: Clock, I: IdGen> {
    broker: Broker,
    jobs: JobStore,
    llm: Arc<L>,
    checkpoints: CheckpointStore,
    counter: Arc<dyn TokenCounter>,
    tokens: TokenBudgetConfig,
    model: String,
    retry: RetryPolicy,
    call_timeout: std::time::Duration,
    clock: C,
    ids: I,
}

impl<L: LlmGateway, C: Clock, I: IdGen> TranslationWorker<L, C, I> {
    pub fn new(
        broker: Broker,
        jobs: JobStore,
        llm: Arc<L>,
        checkpoints: CheckpointStore,
        llm_config: &LlmConfig,
        tokens: &TokenBudgetConfig,
        clock: C,
        ids: I,
    ) -> Self {
        Self {
            broker,
            jobs,
            llm,
            checkpoints,
            counter: Arc::new(HeuristicTokenizer),
            tokens: tokens.clone(),
            model: llm_config.model.clone(),
            retry: llm_config.retry_policy(),
            call_timeout: llm_config.timeout(),
            clock,
            ids,
        }
    }

    /// Swap in a model-specific tokenizer.
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Override the retry policy (tests shrink the delays).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Consume translation tasks until shutdown fires.
    pub async fn run(self, mut consumer: Consumer, mut shutdown: oneshot::Receiver<()>) {
        info!("translation worker started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                delivery = consumer.recv() => match delivery {
                    Ok(delivery) => self.handle_delivery(delivery).await,
                    Err(e) => {
                        error!(error = %e, "translation worker receive failed");
                        break;
                    }
                },
            }
        }
        info!("translation worker stopped");
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let task: TranslationTask = match delivery.decode() {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, "undecodable translation task, dropping");
                settle(delivery, Disposition::Drop);
                return;
            }
        };
        let disposition = self.process(&task, delivery.message_id()).await;
        settle(delivery, disposition);
    }

    pub(crate) async fn process(&self, task: &TranslationTask, message_id: &str) -> Disposition {
        debug!(
            job_id = %task.job_id,
            source = %task.source_language,
            target = %task.target_language,
            "translation task",
        );

        match self.jobs.advance(
            &task.job_id,
            JobStatus::TranslateInProgress,
            &format!("task:{message_id}"),
            self.clock.now_utc(),
        ) {
            Err(e) => {
                warn!(job_id = %task.job_id, error = %e, "cannot record pickup");
                return Disposition::Requeue;
            }
            Ok(AdvanceOutcome::Unknown) => {
                warn!(job_id = %task.job_id, "translation task for unknown job, dropping");
                return Disposition::Drop;
            }
            Ok(_) => {}
        }

        let started = self.clock.now();

        let raw = match std::fs::read_to_string(&task.subtitle_file_path) {
            Ok(raw) => raw,
            Err(e) => {
                return self.fail(
                    task,
                    ErrorKind::ParseError,
                    &format!("cannot read subtitle artifact: {e}"),
                    Disposition::Ack,
                );
            }
        };
        let segments = match srt::parse(&raw) {
            Ok(segments) => segments,
            Err(e) => {
                return self.fail(task, ErrorKind::ParseError, &e.to_string(), Disposition::Ack);
            }
        };

        let chunks =
            chunker::chunk_segments(&segments, &self.tokens, &self.model, self.counter.as_ref());
        let total_chunks = chunks.len() as u32;

        let mut checkpoint = match self.checkpoints.load(&task.job_id, &task.target_language) {
            Some(existing) if existing.matches(task, total_chunks) => {
                info!(
                    job_id = %task.job_id,
                    done = existing.completed_chunk_indices.len(),
                    total = total_chunks,
                    "resuming from checkpoint",
                );
                existing
            }
            Some(_) => {
                info!(job_id = %task.job_id, "stale checkpoint discarded");
                TranslationCheckpoint::new(task, total_chunks, self.clock.now_utc())
            }
            None => TranslationCheckpoint::new(task, total_chunks, self.clock.now_utc()),
        };

        for (index, chunk) in chunks.iter().enumerate() {
            let index = index as u32;
            if checkpoint.is_chunk_done(index) {
                debug!(job_id = %task.job_id, chunk = index, "chunk already translated, skipping");
                continue;
            }

            // Built once; retries reuse the identical request.
            let request = TranslateChunkRequest {
                model: self.model.clone(),
                source_language: task.source_language.clone(),
                target_language: task.target_language.clone(),
                segments: chunk.clone(),
            };

            match self.translate_with_retry(&request).await {
                Ok(translated) => {
                    checkpoint.record_chunk(index, &translated, self.clock.now_utc());
                    if let Err(e) = self.checkpoints.save(&checkpoint) {
                        // Checkpoint trouble never fails the job.
                        warn!(job_id = %task.job_id, error = %e, "checkpoint write failed, continuing");
                    }
                }
                Err((kind, message)) => {
                    return self.fail(task, kind, &message, Disposition::Drop);
                }
            }
        }

        let merged = merge::merge_chunks(checkpoint.translated_segments.clone());
        let output = output_path(
            &task.subtitle_file_path,
            &task.source_language,
            &task.target_language,
        );
        if let Err(e) = std::fs::write(&output, srt::serialize(&merged)) {
            warn!(job_id = %task.job_id, error = %e, "cannot write artifact, requeueing");
            return Disposition::Requeue;
        }

        let elapsed = self.clock.now().saturating_duration_since(started);
        let completed = Envelope::new(
            self.ids.next(),
            task.job_id.clone(),
            self.clock.now_utc(),
            SOURCE,
            Event::TranslationCompleted {
                duration_seconds: elapsed.as_secs_f64(),
                source_language: task.source_language.clone(),
                target_language: task.target_language.clone(),
                input_path: task.subtitle_file_path.clone(),
                output_path: output.clone(),
                chunk_count: total_chunks,
            },
        );
        if let Err(e) = self.broker.publish(&completed) {
            warn!(job_id = %task.job_id, error = %e, "cannot publish completion, requeueing");
            return Disposition::Requeue;
        }
        let translated = Envelope::new(
            self.ids.next(),
            task.job_id.clone(),
            self.clock.now_utc(),
            SOURCE,
            Event::SubtitleTranslated {
                subtitle_path: output,
                source_language: task.source_language.clone(),
                target_language: task.target_language.clone(),
            },
        );
        if let Err(e) = self.broker.publish(&translated) {
            warn!(job_id = %task.job_id, error = %e, "cannot publish artifact event, requeueing");
            return Disposition::Requeue;
        }

        info!(
            job_id = %task.job_id,
            chunks = total_chunks,
            took = %format_elapsed_ms(elapsed.as_millis() as u64),
            "translation complete",
        );
        self.checkpoints
            .remove_on_success(&task.job_id, &task.target_language);
        Disposition::Ack
    }

    /// One chunk through the LLM, retrying transient and semantic failures.
    async fn translate_with_retry(
        &self,
        request: &TranslateChunkRequest,
    ) -> Result<Vec<SubtitleSegment>, (ErrorKind, String)> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            // No unbounded waits: a hung gateway call becomes a timeout.
            let result = tokio::time::timeout(self.call_timeout, self.llm.translate_chunk(request))
                .await
                .unwrap_or(Err(LlmError::Timeout));
            let (kind, message) = match result {
                Ok(translated) => match validate_translation(&request.segments, &translated) {
                    Ok(()) => return Ok(translated),
                    Err(problem) => (ErrorKind::TranslationSemantic, problem),
                },
                Err(e) => (e.kind(), e.to_string()),
            };

            if !kind.is_transient() || attempt > self.retry.max_retries {
                return Err((kind, message));
            }
            let delay = self.retry.jittered_delay(attempt);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                %kind,
                message,
                "chunk translation failed, retrying",
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn fail(
        &self,
        task: &TranslationTask,
        kind: ErrorKind,
        message: &str,
        on_published: Disposition,
    ) -> Disposition {
        info!(job_id = %task.job_id, %kind, message, "translation failed");
        let envelope = Envelope::new(
            self.ids.next(),
            task.job_id.clone(),
            self.clock.now_utc(),
            SOURCE,
            Event::JobFailed {
                error_type: kind,
                error_message: message.to_string(),
            },
        );
        match self.broker.publish(&envelope) {
            Ok(()) => on_published,
            Err(e) => {
                warn!(job_id = %task.job_id, error = %e, "cannot publish failure, requeueing");
                Disposition::Requeue
            }
        }
    }
}

/// The response must mirror the chunk: same count, same indices, same
/// timestamps; only the text is localized.
fn validate_translation(
    input: &[SubtitleSegment],
    output: &[SubtitleSegment],
) -> Result<(), String> {
    if input.len() != output.len() {
        return Err(format!(
            "expected {} translated segments, got {}",
            input.len(),
            output.len()
        ));
    }
    for (original, translated) in input.iter().zip(output) {
        if original.index != translated.index {
            return Err(format!(
                "segment index changed: {} became {}",
                original.index, translated.index
            ));
        }
        if original.start != translated.start || original.end != translated.end {
            return Err(format!("timestamps altered at segment {}", original.index));
        }
    }
    Ok(())
}

/// Output artifact location: the input's name with the source-language
/// suffix (if present) replaced by the target language.
pub fn output_path(input: &Path, source: &LanguageCode, target: &LanguageCode) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = format!(".{source}");
    let base = stem.strip_suffix(&suffix).unwrap_or(&stem);
    input.with_file_name(format!("{base}.{target}.srt"))
}

#[cfg(test)]
#[path = "translate_tests.rs"]
mod tests;
