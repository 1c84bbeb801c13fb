// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn lang(s: &str) -> LanguageCode {
    LanguageCode::parse(s).unwrap()
}

fn envelope(event: Event) -> Envelope {
    Envelope::new(
        "evt-1",
        "job-1",
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
        "test",
        event,
    )
}

#[test]
fn wire_format_nests_payload_under_event_type() {
    let env = envelope(Event::SubtitleRequested {
        video_url: "file:///m/a.mkv".into(),
        video_title: "A".into(),
        language: lang("en"),
        metadata: HashMap::new(),
    });

    let value = serde_json::to_value(&env).unwrap();
    assert_eq!(value["event_id"], "evt-1");
    assert_eq!(value["job_id"], "job-1");
    assert_eq!(value["source"], "test");
    assert_eq!(value["event_type"], "subtitle.requested");
    assert_eq!(value["payload"]["video_url"], "file:///m/a.mkv");
    assert_eq!(value["payload"]["language"], "en");
}

#[test]
fn envelope_round_trip() {
    let env = envelope(Event::TranslateRequested {
        subtitle_path: PathBuf::from("/subs/a.en.srt"),
        source_language: lang("en"),
        target_language: lang("he"),
        reason: Some("no desired-language candidates".into()),
    });

    let json = serde_json::to_string(&env).unwrap();
    let back: Envelope = serde_json::from_str(&json).unwrap();
    assert_eq!(back, env);
}

#[test]
fn unknown_event_type_deserializes_to_unknown() {
    let json = r#"{
        "event_id": "evt-9",
        "event_type": "subtitle.sharpened",
        "job_id": "job-9",
        "timestamp": "2026-01-01T00:00:00Z",
        "source": "future-service",
        "payload": { "novel_field": 1 }
    }"#;

    let env: Envelope = serde_json::from_str(json).unwrap();
    assert_eq!(env.event, Event::Unknown);
    assert_eq!(env.job_id, "job-9");
}

#[test]
fn unknown_fields_in_payload_are_tolerated() {
    let json = r#"{
        "event_id": "evt-2",
        "event_type": "subtitle.ready",
        "job_id": "job-2",
        "timestamp": "2026-01-01T00:00:00Z",
        "source": "download-worker",
        "payload": {
            "subtitle_path": "/subs/b.en.srt",
            "language": "en",
            "quality_score": 0.93
        }
    }"#;

    let env: Envelope = serde_json::from_str(json).unwrap();
    match env.event {
        Event::SubtitleReady { subtitle_path, language, provider } => {
            assert_eq!(subtitle_path, PathBuf::from("/subs/b.en.srt"));
            assert_eq!(language, lang("en"));
            assert!(provider.is_none());
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[yare::parameterized(
    requested  = { keys::SUBTITLE_REQUESTED, "subtitle.requested" },
    download   = { keys::SUBTITLE_DOWNLOAD_REQUESTED, "subtitle.download.requested" },
    ready      = { keys::SUBTITLE_READY, "subtitle.ready" },
    translate  = { keys::SUBTITLE_TRANSLATE_REQUESTED, "subtitle.translate.requested" },
    translated = { keys::SUBTITLE_TRANSLATED, "subtitle.translated" },
    completed  = { keys::TRANSLATION_COMPLETED, "translation.completed" },
    detected   = { keys::MEDIA_FILE_DETECTED, "media.file.detected" },
    failed     = { keys::JOB_FAILED, "job.failed" },
)]
fn routing_key_constants(actual: &str, expected: &str) {
    assert_eq!(actual, expected);
}

#[test]
fn routing_key_matches_serialized_tag() {
    let env = envelope(Event::JobFailed {
        error_type: ErrorKind::ParseError,
        error_message: "bad block".into(),
    });
    let value = serde_json::to_value(&env).unwrap();
    assert_eq!(value["event_type"], env.routing_key());
}

#[test]
fn log_summary_is_compact() {
    let env = envelope(Event::TranslationCompleted {
        duration_seconds: 12.5,
        source_language: lang("en"),
        target_language: lang("he"),
        input_path: PathBuf::from("/subs/a.en.srt"),
        output_path: PathBuf::from("/subs/a.he.srt"),
        chunk_count: 4,
    });
    assert_eq!(
        env.log_summary(),
        "translation.completed job=job-1 chunks=4 took=12.5s"
    );
}
