// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Media-server webhook ingress.
//!
//! `POST /webhooks/{source}` accepts a schema-validated payload and maps it
//! onto the canonical request path. Response matrix:
//! 200 received/duplicate/ignored, 401 bad shared secret, 422 schema
//! violation, 503 when the bus or store is unhealthy.

use crate::ingress::{IngressContext, IngressOutcome, MediaRequest};
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sr_core::{Clock, IdGen, LanguageCode, WebhookConfig};
use sr_storage::DedupStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const TOKEN_HEADER: &str = "x-webhook-token";

/// Readiness view the handler consults before accepting work.
#[async_trait]
pub trait HealthGate: Send + Sync {
    async fn healthy(&self) -> bool;
}

/// Gate that is always open (tests, setups without supervision).
pub struct AlwaysHealthy;

#[async_trait]
impl HealthGate for AlwaysHealthy {
    async fn healthy(&self) -> bool {
        true
    }
}

/// Shared state behind the webhook routes.
pub struct WebhookState<S: DedupStore, C: Clock, I: IdGen> {
    pub ingress: Arc<IngressContext<S, C, I>>,
    pub config: Arc<WebhookConfig>,
    pub health: Arc<dyn HealthGate>,
}

impl<S: DedupStore, C: Clock, I: IdGen> Clone for WebhookState<S, C, I> {
    fn clone(&self) -> Self {
        Self {
            ingress: Arc::clone(&self.ingress),
            config: Arc::clone(&self.config),
            health: Arc::clone(&self.health),
        }
    }
}

/// Incoming payload. Unknown fields are forward-compatible noise.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub event_type: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_path: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl WebhookResponse {
    fn status_only(status: &'static str) -> Self {
        Self {
            status,
            job_id: None,
            detail: None,
        }
    }

    fn with_job(status: &'static str, job_id: String) -> Self {
        Self {
            status,
            job_id: Some(job_id),
            detail: None,
        }
    }

    fn error(detail: impl Into<String>) -> Self {
        Self {
            status: "error",
            job_id: None,
            detail: Some(detail.into()),
        }
    }
}

/// Build the webhook router.
pub fn router<S, C, I>(state: WebhookState<S, C, I>) -> Router
where
    S: DedupStore + 'static,
    C: Clock + 'static,
    I: IdGen + 'static,
{
    Router::new()
        .route("/webhooks/:source", post(handle_webhook::<S, C, I>))
        .with_state(state)
}

async fn handle_webhook<S, C, I>(
    State(state): State<WebhookState<S, C, I>>,
    Path(source): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> Response
where
    S: DedupStore + 'static,
    C: Clock + 'static,
    I: IdGen + 'static,
{
    if let Some(expected) = &state.config.secret {
        let presented = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(WebhookResponse::error("bad shared secret")),
            )
                .into_response();
        }
    }

    if !state.health.healthy().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(WebhookResponse::error("pipeline unavailable")),
        )
            .into_response();
    }

    if !state.config.accepted_events.contains(&payload.event_type) {
        debug!(source, event_type = payload.event_type, "non-actionable webhook event");
        return (StatusCode::OK, Json(WebhookResponse::status_only("ignored"))).into_response();
    }

    let request = match validate(&state.config, &source, &payload) {
        Ok(request) => request,
        Err(detail) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(WebhookResponse::error(detail)),
            )
                .into_response();
        }
    };

    match state.ingress.submit(request) {
        Ok(IngressOutcome::Received { job_id }) => (
            StatusCode::OK,
            Json(WebhookResponse::with_job("received", job_id.to_string())),
        )
            .into_response(),
        Ok(IngressOutcome::Duplicate { job_id }) => (
            StatusCode::OK,
            Json(WebhookResponse::with_job("duplicate", job_id.to_string())),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "webhook submission failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(WebhookResponse::error("pipeline unavailable")),
            )
                .into_response()
        }
    }
}

fn validate(
    config: &WebhookConfig,
    source: &str,
    payload: &WebhookPayload,
) -> Result<MediaRequest, String> {
    let url = payload
        .media_url
        .clone()
        .or_else(|| payload.media_path.clone())
        .filter(|u| !u.trim().is_empty())
        .ok_or("media_url or media_path is required")?;

    let language = match &payload.language {
        Some(raw) => LanguageCode::parse(raw).map_err(|e| e.to_string())?,
        None => config
            .default_language
            .clone()
            .ok_or("language is required (no default configured)")?,
    };

    let title = payload
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .ok_or("title is required")?;

    let mut metadata = HashMap::new();
    metadata.insert("origin".to_string(), format!("webhook:{source}"));
    metadata.insert("webhook_event".to_string(), payload.event_type.clone());

    Ok(MediaRequest {
        video_url: url,
        video_title: title,
        language,
        metadata,
    })
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
