// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sr_core::{LanguageCode, SubtitleTime};

fn lang(s: &str) -> LanguageCode {
    LanguageCode::parse(s).unwrap()
}

#[tokio::test]
async fn provider_serves_staged_subtitles() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProviderGateway::new(dir.path().to_path_buf());
    provider.add_subtitle("en", "1\n00:00:01,000 --> 00:00:02,000\nHi\n");

    let query = SubtitleQuery {
        title: "A".into(),
        imdb_id: None,
        language: lang("en"),
    };
    let candidates = provider.search(&query).await.unwrap();
    assert_eq!(candidates.len(), 1);

    let path = provider.download(&candidates[0]).await.unwrap();
    assert!(std::fs::read_to_string(&path).unwrap().contains("Hi"));
    assert_eq!(provider.searched_languages(), ["en"]);
}

#[tokio::test]
async fn provider_without_staged_language_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProviderGateway::new(dir.path().to_path_buf());
    let query = SubtitleQuery {
        title: "A".into(),
        imdb_id: None,
        language: lang("he"),
    };
    assert!(provider.search(&query).await.unwrap().is_empty());
}

#[tokio::test]
async fn provider_scripted_failure() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProviderGateway::new(dir.path().to_path_buf());
    provider.fail_language("he", ProviderError::RateLimited);

    let query = SubtitleQuery {
        title: "A".into(),
        imdb_id: None,
        language: lang("he"),
    };
    assert_eq!(provider.search(&query).await, Err(ProviderError::RateLimited));
}

#[tokio::test]
async fn llm_prefixes_target_language() {
    let llm = FakeLlmGateway::new();
    let request = TranslateChunkRequest {
        model: "default".into(),
        source_language: lang("en"),
        target_language: lang("he"),
        segments: vec![SubtitleSegment::new(
            1,
            SubtitleTime::from_millis(0),
            SubtitleTime::from_millis(500),
            "hello",
        )],
    };

    let out = llm.translate_chunk(&request).await.unwrap();
    assert_eq!(out[0].text, "[he] hello");
    assert_eq!(out[0].start, request.segments[0].start);
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn llm_failure_script_is_consumed_in_order() {
    let llm = FakeLlmGateway::new();
    llm.script_failures([LlmError::Timeout, LlmError::RateLimited]);

    let request = TranslateChunkRequest {
        model: "default".into(),
        source_language: lang("en"),
        target_language: lang("he"),
        segments: Vec::new(),
    };

    assert_eq!(llm.translate_chunk(&request).await, Err(LlmError::Timeout));
    assert_eq!(llm.translate_chunk(&request).await, Err(LlmError::RateLimited));
    assert!(llm.translate_chunk(&request).await.is_ok());
    assert_eq!(llm.calls(), 3);
}
