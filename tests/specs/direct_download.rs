//! Desired language found directly: one download, job done, no translation.

use crate::prelude::*;
use sr_core::JobStatus;

#[tokio::test]
async fn desired_language_found_directly() {
    let pipeline = Pipeline::start().await;
    pipeline.provider.add_subtitle("en", SAMPLE_SRT);

    let job_id = received_id(pipeline.submit("file:///m/a.mkv", "en"));
    let job = pipeline.wait_status(&job_id, JobStatus::Done).await;

    assert!(job.subtitle_path.is_some());
    assert!(job.subtitle_path.as_ref().unwrap().exists());
    assert!(job.error_message.is_none());
    assert_eq!(job.target_language, None);

    // Exactly the request and the ready event in the log.
    assert_eq!(
        pipeline.event_keys(&job_id),
        ["subtitle.requested", "subtitle.ready"]
    );

    // Only the desired language was ever searched; nothing queued for
    // translation.
    assert_eq!(pipeline.provider.searched_languages(), ["en"]);
    assert_eq!(pipeline.llm.calls(), 0);
    pipeline.wait_queues_idle().await;

    pipeline.stop().await;
}
