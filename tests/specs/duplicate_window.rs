//! Duplicate suppression within the dedup window.

use crate::prelude::*;
use sr_adapters::IngressOutcome;
use sr_core::JobStatus;

#[tokio::test]
async fn second_request_within_window_is_collapsed() {
    let pipeline = Pipeline::start().await;
    pipeline.provider.add_subtitle("en", SAMPLE_SRT);

    let first = pipeline.submit("file:///m/a.mkv", "en");
    let job_id = received_id(first);

    // Seconds later, the same (url, language) arrives again.
    let second = pipeline.submit("file:///m/a.mkv", "en");
    assert_eq!(
        second,
        IngressOutcome::Duplicate {
            job_id: job_id.clone()
        }
    );

    pipeline.wait_status(&job_id, JobStatus::Done).await;
    pipeline.wait_queues_idle().await;

    // Exactly one job record exists and exactly one download ran.
    assert_eq!(pipeline.jobs.list_ids().unwrap(), vec![job_id.clone()]);
    assert_eq!(pipeline.provider.searched_languages(), ["en"]);

    pipeline.stop().await;
}

#[tokio::test]
async fn different_language_is_a_separate_job() {
    let pipeline = Pipeline::start().await;
    pipeline.provider.add_subtitle("en", SAMPLE_SRT);

    let first = received_id(pipeline.submit("file:///m/a.mkv", "en"));
    let second = received_id(pipeline.submit("file:///m/a.mkv", "he"));
    assert_ne!(first, second);

    pipeline.wait_status(&first, JobStatus::Done).await;
    pipeline.wait_status(&second, JobStatus::Done).await;

    pipeline.stop().await;
}
