// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn lang(s: &str) -> LanguageCode {
    LanguageCode::parse(s).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

fn test_job() -> Job {
    Job::new(
        JobConfig {
            job_id: JobId::new("job-1"),
            video_url: "file:///media/a.mkv".into(),
            video_title: "A".into(),
            language: lang("en"),
            metadata: HashMap::new(),
        },
        at(100),
    )
}

#[test]
fn new_job_starts_pending() {
    let job = test_job();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.created_at, job.updated_at);
    assert!(!job.is_terminal());
    assert!(job.error_message.is_none());
}

#[yare::parameterized(
    request_accepted   = { JobStatus::Pending, JobStatus::DownloadQueued, true },
    download_pickup    = { JobStatus::DownloadQueued, JobStatus::DownloadInProgress, true },
    direct_hit         = { JobStatus::DownloadInProgress, JobStatus::Done, true },
    fallback           = { JobStatus::DownloadInProgress, JobStatus::TranslateQueued, true },
    translate_pickup   = { JobStatus::TranslateQueued, JobStatus::TranslateInProgress, true },
    translated         = { JobStatus::TranslateInProgress, JobStatus::Done, true },
    fail_from_pending  = { JobStatus::Pending, JobStatus::Failed, true },
    fail_from_progress = { JobStatus::TranslateInProgress, JobStatus::Failed, true },
    backward           = { JobStatus::Done, JobStatus::DownloadQueued, false },
    skip_pickup        = { JobStatus::DownloadQueued, JobStatus::Done, false },
    fail_after_done    = { JobStatus::Done, JobStatus::Failed, false },
    fail_after_failed  = { JobStatus::Failed, JobStatus::Failed, false },
    repeat             = { JobStatus::DownloadQueued, JobStatus::DownloadQueued, false },
)]
fn transition_edges(from: JobStatus, to: JobStatus, allowed: bool) {
    assert_eq!(from.can_transition_to(to), allowed);
}

#[test]
fn advance_refreshes_updated_at() {
    let mut job = test_job();
    assert!(job.advance(JobStatus::DownloadQueued, at(200)));
    assert_eq!(job.status, JobStatus::DownloadQueued);
    assert_eq!(job.updated_at, at(200));
}

#[test]
fn illegal_advance_leaves_record_untouched() {
    let mut job = test_job();
    job.advance(JobStatus::DownloadQueued, at(200));
    assert!(!job.advance(JobStatus::Done, at(300)));
    assert_eq!(job.status, JobStatus::DownloadQueued);
    assert_eq!(job.updated_at, at(200));
}

#[test]
fn touch_is_monotonic() {
    let mut job = test_job();
    job.touch(at(500));
    // Clock stepped backwards; updated_at must not regress.
    job.touch(at(50));
    assert_eq!(job.updated_at, at(500));
}

#[test]
fn fail_records_message_once() {
    let mut job = test_job();
    assert!(job.fail("provider exploded", at(200)));
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("provider exploded"));

    // Terminal: a second failure is rejected and the message kept.
    assert!(!job.fail("other", at(300)));
    assert_eq!(job.error_message.as_deref(), Some("provider exploded"));
}

#[test]
fn applied_event_ids_deduplicate() {
    let mut job = test_job();
    assert!(!job.has_applied("evt-1"));
    job.mark_applied("evt-1");
    job.mark_applied("evt-1");
    assert!(job.has_applied("evt-1"));
    assert_eq!(job.applied_event_ids.len(), 1);
}

#[test]
fn status_serializes_snake_case() {
    let json = serde_json::to_string(&JobStatus::DownloadInProgress).unwrap();
    assert_eq!(json, "\"download_in_progress\"");
    let back: JobStatus = serde_json::from_str("\"translate_queued\"").unwrap();
    assert_eq!(back, JobStatus::TranslateQueued);
}

#[test]
fn job_serde_round_trip() {
    let mut job = test_job();
    job.advance(JobStatus::DownloadQueued, at(150));
    job.metadata.insert("origin".into(), "watcher".into());

    let json = serde_json::to_string(&job).unwrap();
    let back: Job = serde_json::from_str(&json).unwrap();
    assert_eq!(back, job);
}
