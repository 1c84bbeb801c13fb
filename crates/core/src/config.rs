// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline configuration, loaded from TOML by the daemon.

use crate::language::LanguageCode;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration for the pipeline daemon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dedup: DedupConfig,
    pub tokens: TokenBudgetConfig,
    pub llm: LlmConfig,
    pub checkpoints: CheckpointConfig,
    pub watcher: WatcherConfig,
    pub webhook: WebhookConfig,
    pub push: PushConfig,
    pub provider: ProviderConfig,
    pub ttl: TtlConfig,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Cross-field checks that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watcher.enabled {
            if self.watcher.media_root.is_none() {
                return Err(ConfigError::Invalid(
                    "watcher.enabled requires watcher.media_root".into(),
                ));
            }
            if self.watcher.language.is_none() {
                return Err(ConfigError::Invalid(
                    "watcher.enabled requires watcher.language".into(),
                ));
            }
        }
        if self.push.enabled && self.push.url.is_none() {
            return Err(ConfigError::Invalid("push.enabled requires push.url".into()));
        }
        if !(0.0..=1.0).contains(&self.tokens.safety_margin) {
            return Err(ConfigError::Invalid(
                "tokens.safety_margin must be within 0..=1".into(),
            ));
        }
        Ok(())
    }
}

/// Duplicate-suppression window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub enabled: bool,
    pub window_seconds: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_seconds: 3_600,
        }
    }
}

impl DedupConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Per-request token budget for the translator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBudgetConfig {
    pub max_tokens_per_chunk: u32,
    pub safety_margin: f64,
}

impl Default for TokenBudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: 8_000,
            safety_margin: 0.8,
        }
    }
}

impl TokenBudgetConfig {
    /// Effective per-chunk budget: `⌊max_tokens_per_chunk · safety_margin⌋`.
    pub fn effective_budget(&self) -> u32 {
        (self.max_tokens_per_chunk as f64 * self.safety_margin).floor() as u32
    }
}

/// LLM gateway call policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model name passed through to the gateway and its tokenizer.
    pub model: String,
    pub max_retries: u32,
    pub initial_delay_s: f64,
    pub max_delay_s: f64,
    pub base: f64,
    pub timeout_s: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "default".into(),
            max_retries: 3,
            initial_delay_s: 2.0,
            max_delay_s: 60.0,
            base: 2.0,
            timeout_s: 120.0,
        }
    }
}

impl LlmConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_secs_f64(self.initial_delay_s.max(0.0)),
            max_delay: Duration::from_secs_f64(self.max_delay_s.max(0.0)),
            base: self.base,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_s.max(0.0))
    }
}

/// Translation checkpoint behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub enabled: bool,
    pub cleanup_on_success: bool,
    /// Defaults to `<state_dir>/checkpoints` when unset.
    pub storage_path: Option<PathBuf>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cleanup_on_success: true,
            storage_path: None,
        }
    }
}

/// Filesystem watcher ingress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub enabled: bool,
    pub media_root: Option<PathBuf>,
    pub recursive: bool,
    pub extensions: Vec<String>,
    pub debounce_s: f64,
    /// Desired subtitle language for watcher-discovered media.
    pub language: Option<LanguageCode>,
    /// Allow the translation fallback for watcher-originated jobs.
    pub auto_translate: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            media_root: None,
            recursive: true,
            extensions: default_video_extensions(),
            debounce_s: 2.0,
            language: None,
            auto_translate: false,
        }
    }
}

impl WatcherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs_f64(self.debounce_s.max(0.0))
    }
}

fn default_video_extensions() -> Vec<String> {
    ["mkv", "mp4", "avi", "mov", "m4v", "wmv", "flv", "webm", "ts", "m2ts"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Media-server webhook ingress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub bind_addr: String,
    /// Shared secret checked against the `x-webhook-token` header when set.
    pub secret: Option<String>,
    /// Used when the payload omits a language.
    pub default_language: Option<LanguageCode>,
    /// Payload event types that create jobs; everything else is ignored.
    pub accepted_events: Vec<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: "127.0.0.1:8099".into(),
            secret: None,
            default_language: None,
            accepted_events: vec!["library.new".into(), "item.added".into()],
        }
    }
}

/// Media-server realtime push ingress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub enabled: bool,
    /// Websocket URL of the media server's notification channel.
    pub url: Option<String>,
    pub default_language: Option<LanguageCode>,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            default_language: None,
        }
    }
}

/// Subtitle provider gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Language acceptable to download and then translate from.
    pub fallback_language: LanguageCode,
    /// Where downloaded artifacts are stored. Defaults to
    /// `<state_dir>/artifacts` when unset.
    pub storage_root: Option<PathBuf>,
    pub preferred_sources: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            fallback_language: LanguageCode::english(),
            storage_root: None,
            preferred_sources: Vec::new(),
        }
    }
}

/// Retention of terminal jobs. Active jobs never expire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub completed_days: u32,
    pub failed_days: u32,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            completed_days: 7,
            failed_days: 3,
        }
    }
}

impl TtlConfig {
    pub fn completed(&self) -> Duration {
        Duration::from_secs(self.completed_days as u64 * 86_400)
    }

    pub fn failed(&self) -> Duration {
        Duration::from_secs(self.failed_days as u64 * 86_400)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
