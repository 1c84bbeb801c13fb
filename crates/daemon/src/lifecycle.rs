// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

use crate::audit;
use async_trait::async_trait;
use fs2::FileExt;
use sr_adapters::webhook::{HealthGate, WebhookState};
use sr_adapters::{start_push_client, start_watcher, webhook_router, IngressContext};
use sr_bus::{Broker, BusError};
use sr_core::{
    Clock, PipelineConfig, SystemClock, TtlConfig, UuidIdGen, DOWNLOAD_QUEUE, TRANSLATION_QUEUE,
};
use sr_engine::{
    DownloadWorker, HealthMonitor, HealthProbe, LlmGateway, Orchestrator, ProviderGateway,
    TranslationWorker, ORCHESTRATOR_QUEUE,
};
use sr_storage::{CheckpointStore, DedupService, FileDedupStore, JobStore, StoreError};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Interval between TTL sweeps of terminal jobs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3_600);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] sr_core::ConfigError),
    #[error("another daemon holds the lock at {0}")]
    LockFailed(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Daemon configuration: filesystem layout plus the pipeline options.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. `~/.local/state/subrelay`).
    pub state_dir: PathBuf,
    /// Path to the daemon log file.
    pub log_path: PathBuf,
    /// Path to the lock/PID file.
    pub lock_path: PathBuf,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load using the environment defaults (`SR_STATE_DIR`, `SR_CONFIG`).
    pub fn load() -> Result<Self, LifecycleError> {
        Self::load_from(crate::env::state_dir(), crate::env::config_path())
    }

    /// Load from an explicit state dir and optional config file.
    ///
    /// Without an explicit config file, `<state_dir>/subrelay.toml` is used
    /// when present; defaults otherwise.
    pub fn load_from(
        state_dir: PathBuf,
        config_path: Option<PathBuf>,
    ) -> Result<Self, LifecycleError> {
        let pipeline = match config_path {
            Some(path) => PipelineConfig::load(&path)?,
            None => {
                let default_path = state_dir.join("subrelay.toml");
                if default_path.exists() {
                    PipelineConfig::load(&default_path)?
                } else {
                    PipelineConfig::default()
                }
            }
        };
        Ok(Self {
            log_path: state_dir.join("daemon.log"),
            lock_path: state_dir.join("daemon.pid"),
            state_dir,
            pipeline,
        })
    }

    pub fn checkpoint_root(&self) -> PathBuf {
        self.pipeline
            .checkpoints
            .storage_path
            .clone()
            .unwrap_or_else(|| self.state_dir.join("checkpoints"))
    }
}

/// A running daemon; dropping without `shutdown` aborts nothing, so call it.
pub struct Daemon {
    pub config: Config,
    // NOTE(lifetime): Held to maintain the exclusive lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    broker: Broker,
    jobs: JobStore,
    shutdowns: Vec<oneshot::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl Daemon {
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Stop every component and wait for the tasks to finish.
    ///
    /// Workers holding a task nack-with-requeue on their way out, so no
    /// message is stranded.
    pub async fn shutdown(mut self) {
        info!("daemon shutting down");
        for shutdown in self.shutdowns.drain(..) {
            let _ = shutdown.send(());
        }
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "component task ended abnormally");
            }
        }
        info!("daemon stopped");
    }
}

struct BrokerProbe(Broker);

#[async_trait]
impl HealthProbe for BrokerProbe {
    fn name(&self) -> &str {
        "broker"
    }

    async fn ping(&self) -> bool {
        self.0.ping()
    }
}

struct StoreProbe(JobStore);

#[async_trait]
impl HealthProbe for StoreProbe {
    fn name(&self) -> &str {
        "job-store"
    }

    async fn ping(&self) -> bool {
        self.0.ping()
    }
}

/// Webhook readiness: bus and store must both answer.
struct PipelineGate {
    broker: HealthMonitor<SystemClock>,
    store: HealthMonitor<SystemClock>,
}

#[async_trait]
impl HealthGate for PipelineGate {
    async fn healthy(&self) -> bool {
        self.broker.healthy().await && self.store.healthy().await
    }
}

/// Bring the whole pipeline up.
pub async fn startup<P, L>(
    config: Config,
    provider: Arc<P>,
    llm: Arc<L>,
) -> Result<Daemon, LifecycleError>
where
    P: ProviderGateway + 'static,
    L: LlmGateway + 'static,
{
    std::fs::create_dir_all(&config.state_dir)?;

    // Open without truncating: a losing contender must not clobber the
    // holder's pid.
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::LockFailed(config.lock_path.clone()))?;
    lock_file.set_len(0)?;
    (&lock_file).write_all(std::process::id().to_string().as_bytes())?;

    let clock = SystemClock;
    let ids = UuidIdGen;

    let broker = Broker::open(&config.state_dir.join("bus"))?;
    let jobs = JobStore::open(&config.state_dir)?;
    let dedup_store = FileDedupStore::open(&config.state_dir.join("dedup.json"), clock.clone())?;
    let dedup = Arc::new(DedupService::new(dedup_store, &config.pipeline.dedup));
    let checkpoints = CheckpointStore::new(
        config.checkpoint_root(),
        config.pipeline.checkpoints.enabled,
        config.pipeline.checkpoints.cleanup_on_success,
    );

    type DaemonOrchestrator = Orchestrator<FileDedupStore<SystemClock>, SystemClock, UuidIdGen>;
    DaemonOrchestrator::declare_topology(&broker)?;
    broker.declare_queue(audit::AUDIT_QUEUE)?;
    broker.bind(audit::AUDIT_QUEUE, "#")?;

    for queue in broker.queue_names() {
        let depth = broker.depth(&queue)?;
        if depth > 0 {
            info!(queue, depth, "recovered queue backlog");
        }
    }

    let broker_monitor = HealthMonitor::new(Arc::new(BrokerProbe(broker.clone())), clock.clone());
    let store_monitor = HealthMonitor::new(Arc::new(StoreProbe(jobs.clone())), clock.clone());

    let mut shutdowns = Vec::new();
    let mut handles = Vec::new();

    // Orchestrator
    let orchestrator = Orchestrator::new(
        broker.clone(),
        jobs.clone(),
        Arc::clone(&dedup),
        clock.clone(),
        ids.clone(),
    )
    .with_preferred_sources(config.pipeline.provider.preferred_sources.clone());
    let consumer = broker.consumer(ORCHESTRATOR_QUEUE)?;
    let (tx, rx) = oneshot::channel();
    shutdowns.push(tx);
    handles.push(tokio::spawn(orchestrator.run(consumer, rx)));

    // Download worker
    let download = DownloadWorker::new(
        broker.clone(),
        jobs.clone(),
        provider,
        config.pipeline.provider.fallback_language.clone(),
        clock.clone(),
        ids.clone(),
    );
    let consumer = broker.consumer(DOWNLOAD_QUEUE)?;
    let (tx, rx) = oneshot::channel();
    shutdowns.push(tx);
    handles.push(tokio::spawn(download.run(consumer, rx)));

    // Translation worker
    let translation = TranslationWorker::new(
        broker.clone(),
        jobs.clone(),
        llm,
        checkpoints,
        &config.pipeline.llm,
        &config.pipeline.tokens,
        clock.clone(),
        ids.clone(),
    );
    let consumer = broker.consumer(TRANSLATION_QUEUE)?;
    let (tx, rx) = oneshot::channel();
    shutdowns.push(tx);
    handles.push(tokio::spawn(translation.run(consumer, rx)));

    // Audit trail
    let (audit_shutdown, audit_handle) = audit::start_audit_logger(&broker)?;
    shutdowns.push(audit_shutdown);
    handles.push(audit_handle);

    // TTL sweeper
    let (tx, rx) = oneshot::channel();
    shutdowns.push(tx);
    handles.push(tokio::spawn(ttl_sweeper(
        jobs.clone(),
        config.pipeline.ttl.clone(),
        clock.clone(),
        rx,
    )));

    // Ingress adapters, each behind its kill switch.
    if config.pipeline.watcher.enabled {
        let ingress = Arc::new(IngressContext::new(
            broker.clone(),
            Arc::clone(&dedup),
            clock.clone(),
            ids.clone(),
            "watcher",
        ));
        shutdowns.push(start_watcher(config.pipeline.watcher.clone(), ingress));
    }

    if config.pipeline.push.enabled {
        let ingress = Arc::new(IngressContext::new(
            broker.clone(),
            Arc::clone(&dedup),
            clock.clone(),
            ids.clone(),
            "push",
        ));
        shutdowns.push(start_push_client(config.pipeline.push.clone(), ingress));
    }

    if config.pipeline.webhook.enabled {
        let ingress = Arc::new(IngressContext::new(
            broker.clone(),
            Arc::clone(&dedup),
            clock.clone(),
            ids.clone(),
            "webhook",
        ));
        let state = WebhookState {
            ingress,
            config: Arc::new(config.pipeline.webhook.clone()),
            health: Arc::new(PipelineGate {
                broker: broker_monitor,
                store: store_monitor,
            }),
        };
        let listener = tokio::net::TcpListener::bind(&config.pipeline.webhook.bind_addr).await?;
        info!(addr = %listener.local_addr()?, "webhook listening");
        let app = webhook_router(state);
        let (tx, rx) = oneshot::channel::<()>();
        shutdowns.push(tx);
        handles.push(tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "webhook server failed");
            }
        }));
    }

    info!("daemon started");
    Ok(Daemon {
        config,
        lock_file,
        broker,
        jobs,
        shutdowns,
        handles,
    })
}

async fn ttl_sweeper(
    jobs: JobStore,
    ttl: TtlConfig,
    clock: SystemClock,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = interval.tick() => {
                match jobs.sweep_expired(&ttl, clock.now_utc()) {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "expired jobs swept"),
                    Err(e) => warn!(error = %e, "ttl sweep failed"),
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
