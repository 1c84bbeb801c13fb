// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake gateways for other crates' tests (behind the `test-support`
//! feature). Deterministic: the LLM prefixes text with the target language,
//! the provider serves whatever subtitles tests stage into it.

use async_trait::async_trait;
use parking_lot::Mutex;
use sr_engine::{
    LlmError, LlmGateway, ProviderError, ProviderGateway, SubtitleCandidate, SubtitleQuery,
    TranslateChunkRequest,
};
use sr_core::SubtitleSegment;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scripted subtitle provider.
pub struct FakeProviderGateway {
    storage_root: PathBuf,
    subtitles: Mutex<HashMap<String, String>>,
    failures: Mutex<HashMap<String, ProviderError>>,
    searches: Mutex<Vec<String>>,
}

impl FakeProviderGateway {
    pub fn new(storage_root: PathBuf) -> Self {
        Self {
            storage_root,
            subtitles: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            searches: Mutex::new(Vec::new()),
        }
    }

    /// Stage an SRT document the provider will offer for `language`.
    pub fn add_subtitle(&self, language: &str, content: &str) {
        self.subtitles
            .lock()
            .insert(language.to_string(), content.to_string());
    }

    /// Make searches for `language` fail.
    pub fn fail_language(&self, language: &str, error: ProviderError) {
        self.failures.lock().insert(language.to_string(), error);
    }

    /// Languages searched so far, in order.
    pub fn searched_languages(&self) -> Vec<String> {
        self.searches.lock().clone()
    }
}

#[async_trait]
impl ProviderGateway for FakeProviderGateway {
    async fn search(&self, query: &SubtitleQuery) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        let language = query.language.to_string();
        self.searches.lock().push(language.clone());
        if let Some(error) = self.failures.lock().get(&language) {
            return Err(error.clone());
        }
        if self.subtitles.lock().contains_key(&language) {
            Ok(vec![SubtitleCandidate {
                provider: "fake".into(),
                locator: format!("{}/{language}", query.title),
                language: query.language.clone(),
                score: 1.0,
            }])
        } else {
            Ok(Vec::new())
        }
    }

    async fn download(&self, candidate: &SubtitleCandidate) -> Result<PathBuf, ProviderError> {
        let language = candidate.language.to_string();
        let content = self
            .subtitles
            .lock()
            .get(&language)
            .cloned()
            .ok_or(ProviderError::NotConfigured)?;
        std::fs::create_dir_all(&self.storage_root)
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        let name = candidate.locator.replace('/', "_");
        let path = self.storage_root.join(format!("{name}.srt"));
        std::fs::write(&path, content).map_err(|e| ProviderError::Connection(e.to_string()))?;
        Ok(path)
    }
}

/// Deterministic LLM: text becomes `[{target}] {text}`; an optional failure
/// script is consumed one entry per call before translations succeed again.
pub struct FakeLlmGateway {
    failures: Mutex<VecDeque<LlmError>>,
    calls: AtomicUsize,
}

impl FakeLlmGateway {
    pub fn new() -> Self {
        Self {
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue failures returned by the next calls (one each).
    pub fn script_failures(&self, errors: impl IntoIterator<Item = LlmError>) {
        self.failures.lock().extend(errors);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FakeLlmGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmGateway for FakeLlmGateway {
    async fn translate_chunk(
        &self,
        request: &TranslateChunkRequest,
    ) -> Result<Vec<SubtitleSegment>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        Ok(request
            .segments
            .iter()
            .map(|s| s.with_text(format!("[{}] {}", request.target_language, s.text)))
            .collect())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
