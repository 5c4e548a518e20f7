use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub autosave: AutosaveConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub chat: ChatConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.url.trim().is_empty() {
            return Err(ConfigError::Validation("backend.url must not be empty".into()));
        }
        if self.reliability.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "reliability.max_attempts must be at least 1".into(),
            ));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_ms == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.max_requests and rate_limit.window_ms must be positive".into(),
            ));
        }
        if self.analysis.stage_attempts == 0 {
            return Err(ConfigError::Validation(
                "analysis.stage_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ── Backend ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Public project key sent as the `apikey` header.
    #[serde(default)]
    pub anon_key: Option<String>,
    /// Signed-in user's session token; falls back to `anon_key` when absent.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:54321".into()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            anon_key: None,
            access_token: None,
            user_id: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ── Reliability ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl ReliabilityConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_backoff_ms))
            .with_max_delay(Duration::from_millis(self.max_backoff_ms))
    }
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

// ── Rate limit ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_max_requests() -> u32 {
    10
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_sweep_interval_ms() -> u64 {
    300_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

// ── Auto-save ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutosaveConfig {
    #[serde(default = "default_autosave_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_saved_reset_ms")]
    pub saved_reset_ms: u64,
}

fn default_autosave_delay_ms() -> u64 {
    2000
}

fn default_saved_reset_ms() -> u64 {
    2000
}

impl AutosaveConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn saved_reset(&self) -> Duration {
        Duration::from_millis(self.saved_reset_ms)
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_autosave_delay_ms(),
            saved_reset_ms: default_saved_reset_ms(),
        }
    }
}

// ── Analysis ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_stage_attempts")]
    pub stage_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub stage_base_backoff_ms: u64,
    /// Extra whole-pipeline attempts layered over the per-stage retries.
    #[serde(default = "default_pipeline_retries")]
    pub pipeline_retries: u32,
}

fn default_min_words() -> usize {
    50
}

fn default_stage_attempts() -> u32 {
    3
}

fn default_pipeline_retries() -> u32 {
    2
}

impl AnalysisConfig {
    pub fn stage_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.stage_attempts,
            Duration::from_millis(self.stage_base_backoff_ms),
        )
    }

    pub fn pipeline_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.pipeline_retries + 1,
            Duration::from_millis(self.stage_base_backoff_ms),
        )
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_words: default_min_words(),
            stage_attempts: default_stage_attempts(),
            stage_base_backoff_ms: default_base_backoff_ms(),
            pipeline_retries: default_pipeline_retries(),
        }
    }
}

// ── Chat ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub coaching_mode: bool,
    #[serde(default = "default_intent_history_window")]
    pub intent_history_window: usize,
}

fn default_intent_history_window() -> usize {
    3
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            coaching_mode: false,
            intent_history_window: default_intent_history_window(),
        }
    }
}
