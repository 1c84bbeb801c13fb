// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sr-adapters: ingress paths into the subtitle pipeline.
//!
//! Three equivalent front doors (filesystem watcher, media-server webhook,
//! media-server realtime push) all funnel into the shared ingress path:
//! dedup check, then a canonical `subtitle.requested` envelope on the bus.
//! Each adapter honors its own kill-switch config option.

pub mod ingress;
pub mod push;
pub mod watcher;
pub mod webhook;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use ingress::{IngressContext, IngressOutcome, MediaRequest};
pub use push::start_push_client;
pub use watcher::start_watcher;
pub use webhook::{router as webhook_router, HealthGate, WebhookState};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLlmGateway, FakeProviderGateway};
