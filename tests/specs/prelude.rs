//! Shared harness: an in-process pipeline over tempdir-backed state.

use sr_adapters::{FakeLlmGateway, FakeProviderGateway, IngressContext, IngressOutcome, MediaRequest};
use sr_bus::Broker;
use sr_core::{
    DedupConfig, Job, JobId, JobStatus, LanguageCode, LlmConfig, SystemClock, TokenBudgetConfig,
    UuidIdGen, DOWNLOAD_QUEUE, TRANSLATION_QUEUE,
};
use sr_engine::{
    DownloadWorker, Orchestrator, TranslationWorker, ORCHESTRATOR_QUEUE,
};
use sr_storage::{CheckpointStore, DedupService, JobStore, MemoryDedupStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type SpecDedup = MemoryDedupStore<SystemClock>;
type SpecIngress = IngressContext<SpecDedup, SystemClock, UuidIdGen>;

pub struct Pipeline {
    pub dir: tempfile::TempDir,
    pub broker: Broker,
    pub jobs: JobStore,
    pub checkpoints: CheckpointStore,
    pub provider: Arc<FakeProviderGateway>,
    pub llm: Arc<FakeLlmGateway>,
    pub ingress: Arc<SpecIngress>,
    shutdowns: Vec<oneshot::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

/// Three ordinary segments; fits one chunk under the default budget.
pub const SAMPLE_SRT: &str = "1\n00:00:01,000 --> 00:00:02,000\nFirst line\n\n2\n00:00:03,000 --> 00:00:04,000\nSecond line\n\n3\n00:00:05,000 --> 00:00:06,500\nThird line\n";

pub fn lang(s: &str) -> LanguageCode {
    LanguageCode::parse(s).unwrap()
}

impl Pipeline {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = SystemClock;
        let ids = UuidIdGen;

        let broker = Broker::open(&dir.path().join("bus")).unwrap();
        let jobs = JobStore::open(&dir.path().join("state")).unwrap();
        let dedup = Arc::new(DedupService::new(
            MemoryDedupStore::new(clock.clone()),
            &DedupConfig::default(),
        ));
        let checkpoints = CheckpointStore::new(dir.path().join("checkpoints"), true, true);
        let provider = Arc::new(FakeProviderGateway::new(dir.path().join("artifacts")));
        let llm = Arc::new(FakeLlmGateway::new());

        type SpecOrchestrator = Orchestrator<SpecDedup, SystemClock, UuidIdGen>;
        SpecOrchestrator::declare_topology(&broker).unwrap();

        let mut shutdowns = Vec::new();
        let mut handles = Vec::new();

        let orchestrator = Orchestrator::new(
            broker.clone(),
            jobs.clone(),
            Arc::clone(&dedup),
            clock.clone(),
            ids.clone(),
        );
        let consumer = broker.consumer(ORCHESTRATOR_QUEUE).unwrap();
        let (tx, rx) = oneshot::channel();
        shutdowns.push(tx);
        handles.push(tokio::spawn(orchestrator.run(consumer, rx)));

        let download = DownloadWorker::new(
            broker.clone(),
            jobs.clone(),
            Arc::clone(&provider),
            lang("en"),
            clock.clone(),
            ids.clone(),
        );
        let consumer = broker.consumer(DOWNLOAD_QUEUE).unwrap();
        let (tx, rx) = oneshot::channel();
        shutdowns.push(tx);
        handles.push(tokio::spawn(download.run(consumer, rx)));

        // Short retry delays keep the transient-storm spec fast.
        let llm_config = LlmConfig {
            initial_delay_s: 0.01,
            max_delay_s: 0.05,
            ..LlmConfig::default()
        };
        let translation = TranslationWorker::new(
            broker.clone(),
            jobs.clone(),
            Arc::clone(&llm),
            checkpoints.clone(),
            &llm_config,
            &TokenBudgetConfig::default(),
            clock.clone(),
            ids.clone(),
        );
        let consumer = broker.consumer(TRANSLATION_QUEUE).unwrap();
        let (tx, rx) = oneshot::channel();
        shutdowns.push(tx);
        handles.push(tokio::spawn(translation.run(consumer, rx)));

        let ingress = Arc::new(IngressContext::new(
            broker.clone(),
            Arc::clone(&dedup),
            clock,
            ids,
            "webhook:spec",
        ));

        Self {
            dir,
            broker,
            jobs,
            checkpoints,
            provider,
            llm,
            ingress,
            shutdowns,
            handles,
        }
    }

    pub fn submit(&self, url: &str, language: &str) -> IngressOutcome {
        self.ingress
            .submit(MediaRequest {
                video_url: url.to_string(),
                video_title: "Spec Title".to_string(),
                language: lang(language),
                metadata: HashMap::new(),
            })
            .unwrap()
    }

    /// Poll until the job reaches `status` or the timeout passes.
    pub async fn wait_status(&self, job_id: &JobId, status: JobStatus) -> Job {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(job) = self.jobs.get(job_id).unwrap() {
                if job.status == status {
                    return job;
                }
                assert!(
                    !job.status.is_terminal() || job.status == status,
                    "job reached terminal {:?} while waiting for {status:?}: {:?}",
                    job.status,
                    job.error_message,
                );
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {status:?}; job: {:?}",
                self.jobs.get(job_id).unwrap(),
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Routing keys of the job's event log, in insertion order.
    pub fn event_keys(&self, job_id: &JobId) -> Vec<String> {
        self.jobs
            .events(job_id)
            .unwrap()
            .iter()
            .map(|envelope| envelope.routing_key().to_string())
            .collect()
    }

    /// Wait until both work queues are drained and idle.
    pub async fn wait_queues_idle(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let busy = [DOWNLOAD_QUEUE, TRANSLATION_QUEUE].iter().any(|queue| {
                self.broker.depth(queue).unwrap() > 0
            });
            if !busy {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "work queues never drained",
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn stop(mut self) {
        for shutdown in self.shutdowns.drain(..) {
            let _ = shutdown.send(());
        }
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

pub fn received_id(outcome: IngressOutcome) -> JobId {
    match outcome {
        IngressOutcome::Received { job_id } => job_id,
        other => panic!("expected received, got {other:?}"),
    }
}
