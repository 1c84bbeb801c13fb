// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection supervision: cached health checks, reconnect backoff, and the
//! shared reconnection-detection helper.
//!
//! Every long-lived dependency (broker, job store, dedup store, gateways)
//! is wrapped in a [`HealthMonitor`]. Callers get a cheap, cached answer;
//! active probes run at most once per cache window. Down→up transitions are
//! logged exactly once by [`ReconnectTracker`], the one helper all services
//! share.

use async_trait::async_trait;
use parking_lot::Mutex;
use sr_core::{Clock, RetryPolicy};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Default gap between active probes.
pub const DEFAULT_PROBE_CACHE: Duration = Duration::from_secs(30);

/// A pingable dependency.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;
    async fn ping(&self) -> bool;
}

/// One-shot logging of connection-state transitions.
///
/// `observe` returns true exactly when a down→up transition happened.
#[derive(Debug, Default)]
pub struct ReconnectTracker {
    disconnected: bool,
}

impl ReconnectTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, service: &str, connected: bool) -> bool {
        if connected {
            if self.disconnected {
                self.disconnected = false;
                info!(service, "connection restored");
                return true;
            }
            false
        } else {
            if !self.disconnected {
                warn!(service, "connection lost");
            }
            self.disconnected = true;
            false
        }
    }
}

struct MonitorState {
    healthy: bool,
    last_probe: Option<Instant>,
    tracker: ReconnectTracker,
}

/// Cached health view over a [`HealthProbe`].
#[derive(Clone)]
pub struct HealthMonitor<C: Clock> {
    probe: Arc<dyn HealthProbe>,
    clock: C,
    cache_ttl: Duration,
    state: Arc<Mutex<MonitorState>>,
}

impl<C: Clock> HealthMonitor<C> {
    pub fn new(probe: Arc<dyn HealthProbe>, clock: C) -> Self {
        Self::with_cache_ttl(probe, clock, DEFAULT_PROBE_CACHE)
    }

    pub fn with_cache_ttl(probe: Arc<dyn HealthProbe>, clock: C, cache_ttl: Duration) -> Self {
        Self {
            probe,
            clock,
            cache_ttl,
            state: Arc::new(Mutex::new(MonitorState {
                healthy: true,
                last_probe: None,
                tracker: ReconnectTracker::new(),
            })),
        }
    }

    pub fn name(&self) -> &str {
        self.probe.name()
    }

    /// Health status, served from cache within the probe window.
    pub async fn healthy(&self) -> bool {
        {
            let state = self.state.lock();
            if let Some(last) = state.last_probe {
                if self.clock.now().saturating_duration_since(last) < self.cache_ttl {
                    return state.healthy;
                }
            }
        }
        self.probe_now().await
    }

    /// Run an active probe, bypassing the cache.
    pub async fn probe_now(&self) -> bool {
        let ok = self.probe.ping().await;
        let mut state = self.state.lock();
        state.tracker.observe(self.probe.name(), ok);
        state.healthy = ok;
        state.last_probe = Some(self.clock.now());
        ok
    }

    /// Probe with exponential backoff until healthy or retries exhaust.
    ///
    /// Returns true once the dependency answers; the down→up log comes from
    /// the shared tracker.
    pub async fn await_healthy(&self, policy: &RetryPolicy) -> bool {
        if self.probe_now().await {
            return true;
        }
        for attempt in 1..=policy.max_retries {
            tokio::time::sleep(policy.jittered_delay(attempt)).await;
            if self.probe_now().await {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
