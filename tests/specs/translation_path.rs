//! Desired language missing: fallback artifact is translated.

use crate::prelude::*;
use sr_core::{srt, Event, JobStatus};

#[tokio::test]
async fn missing_language_takes_the_translation_path() {
    let pipeline = Pipeline::start().await;
    // Provider has English but no Hebrew.
    pipeline.provider.add_subtitle("en", SAMPLE_SRT);

    let job_id = received_id(pipeline.submit("file:///m/b.mkv", "he"));
    let job = pipeline.wait_status(&job_id, JobStatus::Done).await;

    // Event log in publish order.
    assert_eq!(
        pipeline.event_keys(&job_id),
        [
            "subtitle.requested",
            "subtitle.translate.requested",
            "translation.completed",
            "subtitle.translated",
        ]
    );

    // translation.completed carries positive timing and the right languages.
    let events = pipeline.jobs.events(&job_id).unwrap();
    let completed = events
        .iter()
        .find_map(|envelope| match &envelope.event {
            Event::TranslationCompleted {
                duration_seconds,
                source_language,
                target_language,
                chunk_count,
                ..
            } => Some((*duration_seconds, source_language.clone(), target_language.clone(), *chunk_count)),
            _ => None,
        })
        .expect("translation.completed in log");
    assert!(completed.0 > 0.0);
    assert_eq!(completed.1, lang("en"));
    assert_eq!(completed.2, lang("he"));
    assert_eq!(completed.3, 1);

    // Job record reflects the translation.
    assert_eq!(job.target_language, Some(lang("he")));

    // The artifact preserves segment count and timing; text is localized.
    let output = job.subtitle_path.expect("artifact path");
    let translated = srt::parse(&std::fs::read_to_string(&output).unwrap()).unwrap();
    let original = srt::parse(SAMPLE_SRT).unwrap();
    assert_eq!(translated.len(), original.len());
    for (a, b) in original.iter().zip(&translated) {
        assert_eq!(a.start, b.start);
        assert_eq!(a.end, b.end);
        assert!(b.text.starts_with("[he] "), "not localized: {}", b.text);
    }

    // Checkpoint removed after success.
    assert!(!pipeline.checkpoints.exists(&job_id, &lang("he")));

    pipeline.stop().await;
}

#[tokio::test]
async fn nothing_available_fails_the_job() {
    let pipeline = Pipeline::start().await;

    let job_id = received_id(pipeline.submit("file:///m/c.mkv", "he"));
    let job = pipeline.wait_status(&job_id, JobStatus::Failed).await;

    assert_eq!(job.error_message.as_deref(), Some("subtitle_not_found"));
    assert_eq!(
        pipeline.event_keys(&job_id),
        ["subtitle.requested", "job.failed"]
    );

    pipeline.stop().await;
}
