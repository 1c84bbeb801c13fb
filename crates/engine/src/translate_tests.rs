// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::gateway::LlmError;
use async_trait::async_trait;
use parking_lot::Mutex;
use sr_core::{FakeClock, Job, JobConfig, JobId, SequentialIdGen, SubtitleTime};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Clone)]
enum LlmBehavior {
    Ok,
    Err(LlmError),
    WrongCount,
    AlterTimestamps,
}

/// Deterministic LLM: prefixes text with `tx:`; a script of behaviors is
/// consumed one per call, defaulting to Ok when exhausted.
struct FakeLlm {
    script: Mutex<VecDeque<LlmBehavior>>,
    calls: AtomicUsize,
}

impl FakeLlm {
    fn new(script: Vec<LlmBehavior>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmGateway for FakeLlm {
    async fn translate_chunk(
        &self,
        request: &TranslateChunkRequest,
    ) -> Result<Vec<SubtitleSegment>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.script.lock().pop_front().unwrap_or(LlmBehavior::Ok);
        let translate = |segments: &[SubtitleSegment]| {
            segments
                .iter()
                .map(|s| s.with_text(format!("tx:{}", s.text)))
                .collect::<Vec<_>>()
        };
        match behavior {
            LlmBehavior::Ok => Ok(translate(&request.segments)),
            LlmBehavior::Err(e) => Err(e),
            LlmBehavior::WrongCount => {
                let mut out = translate(&request.segments);
                out.pop();
                Ok(out)
            }
            LlmBehavior::AlterTimestamps => {
                let mut out = translate(&request.segments);
                if let Some(first) = out.first_mut() {
                    first.start = SubtitleTime::from_millis(first.start.as_millis() + 1);
                }
                Ok(out)
            }
        }
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    broker: Broker,
    jobs: JobStore,
    checkpoints: CheckpointStore,
    clock: FakeClock,
    subs_dir: PathBuf,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let broker = Broker::open(&dir.path().join("bus")).unwrap();
    broker.declare_queue("capture").unwrap();
    broker.bind("capture", "#").unwrap();
    let jobs = JobStore::open(&dir.path().join("state")).unwrap();
    let checkpoints = CheckpointStore::new(dir.path().join("checkpoints"), true, true);
    let subs_dir = dir.path().join("subs");
    std::fs::create_dir_all(&subs_dir).unwrap();
    Harness {
        broker,
        jobs,
        checkpoints,
        clock: FakeClock::new(),
        subs_dir,
        _dir: dir,
    }
}

/// One token per character: segments of 40 x's with budget 50 → one segment
/// per chunk.
struct CharCounter;

impl TokenCounter for CharCounter {
    fn count(&self, text: &str, _model: &str) -> u32 {
        text.chars().count() as u32
    }
}

impl Harness {
    fn worker(&self, llm: Arc<FakeLlm>) -> TranslationWorker<FakeLlm, FakeClock, SequentialIdGen> {
        let llm_config = LlmConfig::default();
        TranslationWorker::new(
            self.broker.clone(),
            self.jobs.clone(),
            llm,
            self.checkpoints.clone(),
            &llm_config,
            &TokenBudgetConfig {
                max_tokens_per_chunk: 50,
                safety_margin: 1.0,
            },
            self.clock.clone(),
            SequentialIdGen::new("tr"),
        )
        .with_token_counter(Arc::new(CharCounter))
        .with_retry_policy(RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            base: 2.0,
        })
    }

    /// Seed a job in TRANSLATE_QUEUED and an input artifact with
    /// `segment_count` one-chunk segments (40 chars each, budget 50).
    fn seed(&self, id: &str, segment_count: u32) -> TranslationTask {
        let mut job = Job::new(
            JobConfig {
                job_id: JobId::new(id),
                video_url: format!("file:///m/{id}.mkv"),
                video_title: id.to_string(),
                language: lang("he"),
                metadata: HashMap::new(),
            },
            self.clock.now_utc(),
        );
        for (status, eid) in [
            (JobStatus::DownloadQueued, "s1"),
            (JobStatus::DownloadInProgress, "s2"),
            (JobStatus::TranslateQueued, "s3"),
        ] {
            job.advance(status, self.clock.now_utc());
            job.mark_applied(eid);
        }
        self.jobs.put(&job).unwrap();

        let segments: Vec<SubtitleSegment> = (1..=segment_count)
            .map(|i| {
                SubtitleSegment::new(
                    i,
                    SubtitleTime::from_millis(i as u64 * 1_000),
                    SubtitleTime::from_millis(i as u64 * 1_000 + 900),
                    format!("{i:03}{}", "x".repeat(37)),
                )
            })
            .collect();
        let input = self.subs_dir.join(format!("{id}.en.srt"));
        std::fs::write(&input, srt::serialize(&segments)).unwrap();

        TranslationTask {
            job_id: JobId::new(id),
            subtitle_file_path: input,
            source_language: lang("en"),
            target_language: lang("he"),
        }
    }

    async fn published(&self) -> Vec<Envelope> {
        let mut consumer = self.broker.consumer("capture").unwrap();
        let mut events = Vec::new();
        while self.broker.depth("capture").unwrap() > 0 {
            let delivery = tokio::time::timeout(Duration::from_secs(1), consumer.recv())
                .await
                .unwrap()
                .unwrap();
            events.push(delivery.decode().unwrap());
            delivery.ack().unwrap();
        }
        events
    }
}

fn lang(s: &str) -> LanguageCode {
    LanguageCode::parse(s).unwrap()
}

#[tokio::test]
async fn translates_and_emits_completed_then_translated() {
    let h = harness();
    let task = h.seed("job-1", 3);
    let llm = FakeLlm::new(vec![]);

    let disposition = h.worker(llm.clone()).process(&task, "msg-1").await;
    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(llm.calls(), 3);

    let events = h.published().await;
    assert_eq!(events.len(), 2);
    let output = match (&events[0].event, &events[1].event) {
        (
            Event::TranslationCompleted {
                chunk_count,
                output_path,
                ..
            },
            Event::SubtitleTranslated { subtitle_path, .. },
        ) => {
            assert_eq!(*chunk_count, 3);
            assert_eq!(output_path, subtitle_path);
            subtitle_path.clone()
        }
        other => panic!("unexpected event order: {other:?}"),
    };

    // Output: same segment count, timestamps verbatim, text localized,
    // indices renumbered from 1.
    let translated = srt::parse(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(translated.len(), 3);
    for (i, seg) in translated.iter().enumerate() {
        assert_eq!(seg.index, (i + 1) as u32);
        assert_eq!(seg.start.as_millis(), (i + 1) as u64 * 1_000);
        assert!(seg.text.starts_with("tx:"));
    }

    // Checkpoint cleaned up on success.
    assert!(!h.checkpoints.exists(&task.job_id, &task.target_language));
}

#[tokio::test]
async fn output_lands_next_to_input_with_target_suffix() {
    let h = harness();
    let task = h.seed("job-1", 1);

    h.worker(FakeLlm::new(vec![])).process(&task, "msg-1").await;

    let expected = h.subs_dir.join("job-1.he.srt");
    assert!(expected.exists());
}

#[tokio::test]
async fn malformed_artifact_fails_with_parse_error() {
    let h = harness();
    let task = h.seed("job-1", 1);
    std::fs::write(&task.subtitle_file_path, "not an srt file").unwrap();

    let disposition = h.worker(FakeLlm::new(vec![])).process(&task, "msg-1").await;
    assert_eq!(disposition, Disposition::Ack);

    let events = h.published().await;
    assert_eq!(events.len(), 1);
    match &events[0].event {
        Event::JobFailed { error_type, .. } => assert_eq!(*error_type, ErrorKind::ParseError),
        other => panic!("unexpected event: {other:?}"),
    }
    // No partial translation is produced.
    assert!(!h.subs_dir.join("job-1.he.srt").exists());
}

#[tokio::test]
async fn transient_storm_then_success() {
    let h = harness();
    let task = h.seed("job-1", 3);
    // Chunk 2 (third call) hits two 503s before succeeding.
    let llm = FakeLlm::new(vec![
        LlmBehavior::Ok,
        LlmBehavior::Ok,
        LlmBehavior::Err(LlmError::Server {
            status: 503,
            message: "busy".into(),
        }),
        LlmBehavior::Err(LlmError::Server {
            status: 503,
            message: "busy".into(),
        }),
        LlmBehavior::Ok,
    ]);

    let disposition = h.worker(llm.clone()).process(&task, "msg-1").await;
    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(llm.calls(), 5);

    let events = h.published().await;
    let translated: Vec<_> = events
        .iter()
        .filter(|e| matches!(e.event, Event::SubtitleTranslated { .. }))
        .collect();
    assert_eq!(translated.len(), 1);
}

#[tokio::test]
async fn permanent_error_fails_without_retry() {
    let h = harness();
    let task = h.seed("job-1", 2);
    let llm = FakeLlm::new(vec![LlmBehavior::Err(LlmError::Client {
        status: 401,
        message: "bad key".into(),
    })]);

    let disposition = h.worker(llm.clone()).process(&task, "msg-1").await;
    assert_eq!(disposition, Disposition::Drop);
    assert_eq!(llm.calls(), 1);

    let events = h.published().await;
    match &events[0].event {
        Event::JobFailed { error_type, .. } => {
            assert_eq!(*error_type, ErrorKind::PermanentClient);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn retries_exhausted_preserves_checkpoint() {
    let h = harness();
    let task = h.seed("job-1", 3);
    // Chunk 0 succeeds; chunk 1 fails every attempt (1 + 3 retries).
    let llm = FakeLlm::new(vec![
        LlmBehavior::Ok,
        LlmBehavior::Err(LlmError::Timeout),
        LlmBehavior::Err(LlmError::Timeout),
        LlmBehavior::Err(LlmError::Timeout),
        LlmBehavior::Err(LlmError::Timeout),
    ]);

    let disposition = h.worker(llm.clone()).process(&task, "msg-1").await;
    assert_eq!(disposition, Disposition::Drop);
    assert_eq!(llm.calls(), 5);

    // The checkpoint survives for inspection and resume, reflecting the one
    // completed chunk.
    let checkpoint = h
        .checkpoints
        .load(&task.job_id, &task.target_language)
        .unwrap();
    assert_eq!(checkpoint.completed_chunk_indices.len(), 1);
    assert!(checkpoint.is_chunk_done(0));
    assert_eq!(checkpoint.total_chunks, 3);

    let events = h.published().await;
    match &events[0].event {
        Event::JobFailed { error_type, .. } => {
            assert_eq!(*error_type, ErrorKind::TransientInfrastructure);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn resumes_from_checkpoint_and_translates_remaining_chunks() {
    let h = harness();
    let task = h.seed("job-1", 10);

    // Simulate a worker that crashed after completing chunks 0..=5.
    let input = std::fs::read_to_string(&task.subtitle_file_path).unwrap();
    let segments = srt::parse(&input).unwrap();
    let mut checkpoint = TranslationCheckpoint::new(&task, 10, h.clock.now_utc());
    for index in 0..6u32 {
        let seg = &segments[index as usize];
        checkpoint.record_chunk(
            index,
            &[seg.with_text(format!("resumed:{}", seg.text))],
            h.clock.now_utc(),
        );
    }
    h.checkpoints.save(&checkpoint).unwrap();

    let llm = FakeLlm::new(vec![]);
    let disposition = h.worker(llm.clone()).process(&task, "msg-2").await;
    assert_eq!(disposition, Disposition::Ack);
    // Only chunks 6..=9 hit the LLM.
    assert_eq!(llm.calls(), 4);

    let output = h.subs_dir.join("job-1.he.srt");
    let translated = srt::parse(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(translated.len(), 10);
    let indices: Vec<u32> = translated.iter().map(|s| s.index).collect();
    assert_eq!(indices, (1..=10).collect::<Vec<u32>>());
    for (i, seg) in translated.iter().enumerate() {
        if i < 6 {
            assert!(seg.text.starts_with("resumed:"), "segment {i}: {}", seg.text);
        } else {
            assert!(seg.text.starts_with("tx:"), "segment {i}: {}", seg.text);
        }
        assert_eq!(seg.start.as_millis(), (i + 1) as u64 * 1_000);
    }

    assert!(!h.checkpoints.exists(&task.job_id, &task.target_language));
}

#[tokio::test]
async fn stale_checkpoint_is_discarded() {
    let h = harness();
    let task = h.seed("job-1", 3);

    // Checkpoint from a different chunking (wrong total).
    let mut stale = TranslationCheckpoint::new(&task, 7, h.clock.now_utc());
    stale.record_chunk(0, &[], h.clock.now_utc());
    h.checkpoints.save(&stale).unwrap();

    let llm = FakeLlm::new(vec![]);
    h.worker(llm.clone()).process(&task, "msg-1").await;
    // All three chunks re-translated.
    assert_eq!(llm.calls(), 3);
}

#[tokio::test]
async fn wrong_segment_count_is_retried_as_semantic_error() {
    let h = harness();
    let task = h.seed("job-1", 1);
    let llm = FakeLlm::new(vec![LlmBehavior::WrongCount, LlmBehavior::Ok]);

    let disposition = h.worker(llm.clone()).process(&task, "msg-1").await;
    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(llm.calls(), 2);
}

#[tokio::test]
async fn altered_timestamps_exhaust_into_semantic_failure() {
    let h = harness();
    let task = h.seed("job-1", 1);
    let llm = FakeLlm::new(vec![
        LlmBehavior::AlterTimestamps,
        LlmBehavior::AlterTimestamps,
        LlmBehavior::AlterTimestamps,
        LlmBehavior::AlterTimestamps,
    ]);

    let disposition = h.worker(llm.clone()).process(&task, "msg-1").await;
    assert_eq!(disposition, Disposition::Drop);

    let events = h.published().await;
    match &events[0].event {
        Event::JobFailed { error_type, .. } => {
            assert_eq!(*error_type, ErrorKind::TranslationSemantic);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

struct SlowLlm {
    calls: AtomicUsize,
}

#[async_trait]
impl LlmGateway for SlowLlm {
    async fn translate_chunk(
        &self,
        _request: &TranslateChunkRequest,
    ) -> Result<Vec<SubtitleSegment>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn hung_llm_call_times_out_and_exhausts_retries() {
    let h = harness();
    let task = h.seed("job-1", 1);
    let llm = Arc::new(SlowLlm {
        calls: AtomicUsize::new(0),
    });
    let llm_config = LlmConfig {
        timeout_s: 0.05,
        max_retries: 1,
        initial_delay_s: 0.0,
        max_delay_s: 0.0,
        ..LlmConfig::default()
    };
    let worker = TranslationWorker::new(
        h.broker.clone(),
        h.jobs.clone(),
        llm.clone(),
        h.checkpoints.clone(),
        &llm_config,
        &TokenBudgetConfig {
            max_tokens_per_chunk: 50,
            safety_margin: 1.0,
        },
        h.clock.clone(),
        SequentialIdGen::new("tr"),
    )
    .with_token_counter(Arc::new(CharCounter));

    let disposition = worker.process(&task, "msg-1").await;
    assert_eq!(disposition, Disposition::Drop);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 2);

    let events = h.published().await;
    match &events[0].event {
        Event::JobFailed { error_type, .. } => {
            assert_eq!(*error_type, ErrorKind::TransientInfrastructure);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn unknown_job_drops_task() {
    let h = harness();
    let task = TranslationTask {
        job_id: JobId::new("ghost"),
        subtitle_file_path: h.subs_dir.join("ghost.en.srt"),
        source_language: lang("en"),
        target_language: lang("he"),
    };
    let disposition = h.worker(FakeLlm::new(vec![])).process(&task, "msg-1").await;
    assert_eq!(disposition, Disposition::Drop);
}

#[yare::parameterized(
    with_source_suffix = { "/subs/movie.en.srt", "en", "he", "/subs/movie.he.srt" },
    without_suffix     = { "/subs/movie.srt", "en", "he", "/subs/movie.he.srt" },
    nested             = { "/a/b/c.en.srt", "en", "fr", "/a/b/c.fr.srt" },
)]
fn output_path_derivation(input: &str, source: &str, target: &str, expected: &str) {
    assert_eq!(
        output_path(Path::new(input), &lang(source), &lang(target)),
        PathBuf::from(expected)
    );
}
