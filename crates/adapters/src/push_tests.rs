// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn lang(s: &str) -> LanguageCode {
    LanguageCode::parse(s).unwrap()
}

#[test]
fn actionable_notification_translates() {
    let text = r#"{
        "type": "item.added",
        "item_url": "file:///m/a.mkv",
        "title": "A",
        "language": "he"
    }"#;

    let request = translate_notification(text, None).unwrap();
    assert_eq!(request.video_url, "file:///m/a.mkv");
    assert_eq!(request.video_title, "A");
    assert_eq!(request.language, lang("he"));
    assert_eq!(request.metadata.get("origin").map(String::as_str), Some("push"));
}

#[test]
fn item_path_substitutes_for_url() {
    let text = r#"{"type": "library.new", "item_path": "/m/b.mkv", "title": "B", "language": "en"}"#;
    let request = translate_notification(text, None).unwrap();
    assert_eq!(request.video_url, "/m/b.mkv");
}

#[test]
fn non_actionable_kind_is_skipped() {
    let text = r#"{"type": "playback.paused", "item_url": "u", "title": "A", "language": "he"}"#;
    assert!(translate_notification(text, None).is_none());
}

#[test]
fn default_language_applies_when_missing() {
    let text = r#"{"type": "item.added", "item_url": "u", "title": "A"}"#;
    let default = lang("en");
    let request = translate_notification(text, Some(&default)).unwrap();
    assert_eq!(request.language, default);
}

#[yare::parameterized(
    garbage        = { "not json" },
    no_media       = { r#"{"type": "item.added", "title": "A", "language": "he"}"# },
    blank_media    = { r#"{"type": "item.added", "item_url": "  ", "title": "A", "language": "he"}"# },
    no_title       = { r#"{"type": "item.added", "item_url": "u", "language": "he"}"# },
    bad_language   = { r#"{"type": "item.added", "item_url": "u", "title": "A", "language": "xyz"}"# },
    no_language    = { r#"{"type": "item.added", "item_url": "u", "title": "A"}"# },
)]
fn unusable_notifications_are_skipped(text: &str) {
    assert!(translate_notification(text, None).is_none());
}

#[test]
fn unknown_fields_are_tolerated() {
    let text = r#"{
        "type": "item.added",
        "item_url": "u",
        "title": "A",
        "language": "he",
        "server_id": "abc",
        "session": {"user": "x"}
    }"#;
    assert!(translate_notification(text, None).is_some());
}
