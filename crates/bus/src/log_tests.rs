// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn open_log(dir: &tempfile::TempDir) -> (MessageLog, Vec<StoredMessage>) {
    MessageLog::open(&dir.path().join("q.log")).unwrap()
}

#[test]
fn fresh_log_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let (log, live) = open_log(&dir);
    assert!(live.is_empty());
    assert!(!log.needs_compaction());
}

#[test]
fn replay_returns_unacked_in_push_order() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (mut log, _) = open_log(&dir);
        log.append_push("m1", &json!({"n": 1})).unwrap();
        log.append_push("m2", &json!({"n": 2})).unwrap();
        log.append_push("m3", &json!({"n": 3})).unwrap();
        log.append_ack("m2").unwrap();
    }

    let (_, live) = open_log(&dir);
    let ids: Vec<&str> = live.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["m1", "m3"]);
    assert_eq!(live[0].body, json!({"n": 1}));
    assert!(!live[0].redelivered);
}

#[test]
fn nack_requeue_marks_redelivered() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (mut log, _) = open_log(&dir);
        log.append_push("m1", &json!(1)).unwrap();
        log.append_nack("m1", true).unwrap();
    }

    let (_, live) = open_log(&dir);
    assert_eq!(live.len(), 1);
    assert!(live[0].redelivered);
}

#[test]
fn nack_without_requeue_drops_message() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (mut log, _) = open_log(&dir);
        log.append_push("m1", &json!(1)).unwrap();
        log.append_nack("m1", false).unwrap();
    }

    let (_, live) = open_log(&dir);
    assert!(live.is_empty());
}

#[test]
fn torn_tail_line_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("q.log");
    {
        let (mut log, _) = MessageLog::open(&path).unwrap();
        log.append_push("m1", &json!(1)).unwrap();
    }
    // Simulate a crash mid-write.
    {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{\"op\":\"push\",\"id\":\"m2\",\"bo").unwrap();
    }

    let (_, live) = MessageLog::open(&path).unwrap();
    let ids: Vec<&str> = live.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["m1"]);
}

#[test]
fn compact_rewrites_only_live_messages() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("q.log");
    let live = {
        let (mut log, _) = MessageLog::open(&path).unwrap();
        for i in 0..10 {
            log.append_push(&format!("m{i}"), &json!(i)).unwrap();
        }
        for i in 0..9 {
            log.append_ack(&format!("m{i}")).unwrap();
        }
        let live = vec![StoredMessage {
            id: "m9".into(),
            body: json!(9),
            redelivered: false,
        }];
        log.compact(&live).unwrap();
        live
    };

    let (_, replayed) = MessageLog::open(&path).unwrap();
    assert_eq!(replayed, live);
}

#[test]
fn compaction_threshold_tracks_dead_ratio() {
    let dir = tempfile::tempdir().unwrap();
    let (mut log, _) = open_log(&dir);
    for i in 0..600 {
        log.append_push(&format!("m{i}"), &json!(i)).unwrap();
        log.append_ack(&format!("m{i}")).unwrap();
    }
    // 1200 records, 0 live.
    assert!(log.needs_compaction());

    log.compact(&[]).unwrap();
    assert!(!log.needs_compaction());
}
