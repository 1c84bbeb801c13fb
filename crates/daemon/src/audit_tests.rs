// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sr_core::{Clock, Event, LanguageCode, SystemClock};
use std::collections::HashMap;
use std::time::Duration;

#[tokio::test]
async fn audit_logger_drains_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Broker::open(dir.path()).unwrap();
    broker.declare_queue(AUDIT_QUEUE).unwrap();
    broker.bind(AUDIT_QUEUE, "#").unwrap();

    let envelope = Envelope::new(
        "evt-1",
        "job-1",
        SystemClock.now_utc(),
        "test",
        Event::SubtitleRequested {
            video_url: "file:///m/a.mkv".into(),
            video_title: "A".into(),
            language: LanguageCode::parse("en").unwrap(),
            metadata: HashMap::new(),
        },
    );
    broker.publish(&envelope).unwrap();
    assert_eq!(broker.depth(AUDIT_QUEUE).unwrap(), 1);

    let (shutdown, handle) = start_audit_logger(&broker).unwrap();

    // Consumed and acknowledged shortly.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while broker.depth(AUDIT_QUEUE).unwrap() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "audit queue never drained");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let _ = shutdown.send(());
    handle.await.unwrap();
}

#[tokio::test]
async fn audit_logger_requires_declared_queue() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Broker::open(dir.path()).unwrap();
    assert!(start_audit_logger(&broker).is_err());
}
