// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Media-server realtime push ingress.
//!
//! Connects to the server's websocket notification channel, translates push
//! notifications into canonical requests, and reconnects with exponential
//! backoff when the channel drops.

use crate::ingress::{IngressContext, MediaRequest};
use futures_util::StreamExt;
use serde::Deserialize;
use sr_core::{Clock, IdGen, LanguageCode, PushConfig, RetryPolicy};
use sr_storage::DedupStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Notification types that create jobs.
const ACTIONABLE: [&str; 2] = ["item.added", "library.new"];

/// A push notification from the media server's realtime channel.
#[derive(Debug, Deserialize)]
pub struct PushNotification {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub item_url: Option<String>,
    #[serde(default)]
    pub item_path: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Start the push client. Returns a shutdown sender.
pub fn start_push_client<S, C, I>(
    config: PushConfig,
    ingress: Arc<IngressContext<S, C, I>>,
) -> oneshot::Sender<()>
where
    S: DedupStore + 'static,
    C: Clock + 'static,
    I: IdGen + 'static,
{
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(run_push_client(config, ingress, shutdown_rx));
    shutdown_tx
}

async fn run_push_client<S, C, I>(
    config: PushConfig,
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
    let Some(url) = config.url.clone() else {
        warn!("push client enabled without url, not starting");
        return;
    };

    let reconnect = RetryPolicy::default();
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            result = pump(&url, &config, &ingress) => {
                match result {
                    Ok(()) => {
                        // Channel closed cleanly; reconnect from scratch.
                        attempt = 0;
                    }
                    Err(e) => {
                        attempt = attempt.saturating_add(1);
                        warn!(error = %e, attempt, "push channel lost");
                    }
                }
                let delay = reconnect.jittered_delay(attempt.max(1));
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    info!("push client stopped");
}

/// One connection lifetime: read notifications until the stream ends.
async fn pump<S, C, I>(
    url: &str,
    config: &PushConfig,
    ingress: &IngressContext<S, C, I>,
) -> Result<(), tokio_tungstenite::tungstenite::Error>
where
    S: DedupStore,
    C: Clock,
    I: IdGen,
{
    let (stream, _) = tokio_tungstenite::connect_async(url).await?;
    info!(url, "push channel connected");
    let (_write, mut read) = stream.split();

    while let Some(message) = read.next().await {
        match message? {
            Message::Text(text) => {
                let Some(request) =
                    translate_notification(&text, config.default_language.as_ref())
                else {
                    continue;
                };
                match ingress.submit(request) {
                    Ok(outcome) => debug!(?outcome, "push notification submitted"),
                    Err(e) => warn!(error = %e, "cannot submit push notification"),
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

/// Translate one push notification into canonical form.
///
/// Returns `None` for non-actionable kinds and payloads missing required
/// fields (logged, never fatal: a realtime channel carries plenty of
/// traffic this adapter does not care about).
pub(crate) fn translate_notification(
    text: &str,
    default_language: Option<&LanguageCode>,
) -> Option<MediaRequest> {
    let notification: PushNotification = match serde_json::from_str(text) {
        Ok(n) => n,
        Err(e) => {
            debug!(error = %e, "unparseable push notification");
            return None;
        }
    };
    if !ACTIONABLE.contains(&notification.kind.as_str()) {
        return None;
    }

    let url = notification
        .item_url
        .or(notification.item_path)
        .filter(|u| !u.trim().is_empty())?;
    let title = notification.title.filter(|t| !t.trim().is_empty())?;
    let language = match notification.language {
        Some(raw) => LanguageCode::parse(&raw).ok()?,
        None => default_language?.clone(),
    };

    let mut metadata = HashMap::new();
    metadata.insert("origin".to_string(), "push".to_string());

    Some(MediaRequest {
        video_url: url,
        video_title: title,
        language,
        metadata,
    })
}

#[cfg(test)]
#[path = "push_tests.rs"]
mod tests;
