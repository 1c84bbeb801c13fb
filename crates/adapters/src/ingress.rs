// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared ingress path: dedup check, then a canonical request envelope.
//!
//! Every adapter calls [`IngressContext::submit`]; the orchestrator runs
//! the same dedup check again (defense-in-depth), so a request slipping
//! past an adapter is still collapsed downstream.

use sr_bus::{Broker, BusError};
use sr_core::{Clock, Envelope, Event, IdGen, JobId, LanguageCode};
use sr_storage::{DedupDecision, DedupService, DedupStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Canonical form every adapter normalizes its input into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub video_url: String,
    pub video_title: String,
    pub language: LanguageCode,
    pub metadata: HashMap<String, String>,
}

/// What happened to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressOutcome {
    /// A new job id was allocated and the request published.
    Received { job_id: JobId },
    /// An earlier job within the dedup window already covers this request.
    Duplicate { job_id: JobId },
}

/// Adapter-facing handle on the pipeline.
pub struct IngressContext<S: DedupStore, C: Clock, I: IdGen> {
    broker: Broker,
    dedup: Arc<DedupService<S>>,
    clock: C,
    ids: I,
    source: String,
}

impl<S: DedupStore, C: Clock, I: IdGen> IngressContext<S, C, I> {
    pub fn new(
        broker: Broker,
        dedup: Arc<DedupService<S>>,
        clock: C,
        ids: I,
        source: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            dedup,
            clock,
            ids,
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Dedup-check and publish a canonical `subtitle.requested` event.
    pub fn submit(&self, request: MediaRequest) -> Result<IngressOutcome, BusError> {
        let job_id = JobId::new(self.ids.next());

        match self
            .dedup
            .check_and_register(&request.video_url, &request.language, &job_id)
        {
            DedupDecision::Duplicate { existing } => {
                debug!(
                    source = %self.source,
                    job_id = %existing,
                    url = %request.video_url,
                    "duplicate request collapsed at ingress",
                );
                return Ok(IngressOutcome::Duplicate { job_id: existing });
            }
            DedupDecision::New | DedupDecision::Bypassed => {}
        }

        let envelope = Envelope::new(
            self.ids.next(),
            job_id.clone(),
            self.clock.now_utc(),
            self.source.clone(),
            Event::SubtitleRequested {
                video_url: request.video_url,
                video_title: request.video_title,
                language: request.language,
                metadata: request.metadata,
            },
        );
        self.broker.publish(&envelope)?;
        info!(source = %self.source, job_id = %job_id, "subtitle requested");
        Ok(IngressOutcome::Received { job_id })
    }

    /// Publish a side-channel event (audit trail) for this adapter.
    pub fn emit(&self, job_id: &JobId, event: Event) -> Result<(), BusError> {
        let envelope = Envelope::new(
            self.ids.next(),
            job_id.clone(),
            self.clock.now_utc(),
            self.source.clone(),
            event,
        );
        self.broker.publish(&envelope)
    }
}

#[cfg(test)]
#[path = "ingress_tests.rs"]
mod tests;
