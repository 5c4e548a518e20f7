use std::time::Duration;
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `Reverie`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; the CLI and config glue continue to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum ReverieError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Backend functions / streaming ───────────────────────────────────
    #[error("api: {0}")]
    Api(#[from] ApiError),

    // ── Entry store ─────────────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Analysis pipeline ───────────────────────────────────────────────
    #[error("analysis: {0}")]
    Analysis(#[from] AnalysisError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Backend API errors ─────────────────────────────────────────────────────

/// Failure of a call to a backend function or the chat completion stream.
///
/// HTTP 429 and 402 are kept apart from every other status because they map
/// to distinct user-facing messages and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("rate limited by backend (HTTP 429)")]
    RateLimited,

    #[error("usage quota exhausted (HTTP 402)")]
    QuotaExhausted,

    #[error("request throttled locally, retry in {}s", retry_after.as_secs().max(1))]
    Throttled { retry_after: Duration },

    #[error("backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("stream: {0}")]
    Stream(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// User-visible failure category. UI callers branch on this instead of
/// inspecting status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    QuotaExhausted,
    Generic,
}

impl ApiError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            429 => Self::RateLimited,
            402 => Self::QuotaExhausted,
            _ => Self::Status {
                status,
                message: message.into(),
            },
        }
    }

    /// Transient failures worth another attempt: transport errors, request
    /// timeouts and server errors. 429, 402 and other client errors are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Stream(_) => true,
            Self::Status { status, .. } => *status == 408 || *status >= 500,
            Self::RateLimited
            | Self::QuotaExhausted
            | Self::Throttled { .. }
            | Self::Decode(_)
            | Self::InvalidRequest(_) => false,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited | Self::Throttled { .. } => FailureKind::RateLimited,
            Self::QuotaExhausted => FailureKind::QuotaExhausted,
            _ => FailureKind::Generic,
        }
    }

    /// Human-readable message for the end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Throttled { retry_after } => {
                t!("notice.throttled", wait = crate::rate_limit::format_wait(*retry_after)).into_owned()
            }
            Self::RateLimited => t!("notice.rate_limited").into_owned(),
            Self::QuotaExhausted => t!("notice.quota_exhausted").into_owned(),
            _ => t!("notice.generic_failure").into_owned(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Transport(err.to_string())
    }
}

// ─── Entry store errors ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entry {0} not found")]
    NotFound(String),

    #[error("backend: {0}")]
    Backend(#[from] ApiError),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound(_) => false,
            Self::Backend(err) => err.is_retryable(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_) => FailureKind::Generic,
            Self::Backend(err) => err.kind(),
        }
    }
}

// ─── Analysis pipeline errors ───────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("mood analysis failed: {0}")]
    MoodAnalysis(#[source] ApiError),

    #[error("persisting mood fields failed: {0}")]
    Store(#[from] StoreError),
}

impl AnalysisError {
    /// Whether another whole-pipeline attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MoodAnalysis(err) => err.is_retryable(),
            Self::Store(err) => err.is_retryable(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::MoodAnalysis(err) => err.kind(),
            Self::Store(err) => err.kind(),
        }
    }

    /// Quota and rate-limit failures keep their own message whichever stage
    /// hit them; everything else gets the generic analysis notice.
    pub fn user_message(&self) -> String {
        match self {
            Self::MoodAnalysis(err) | Self::Store(StoreError::Backend(err))
                if err.kind() != FailureKind::Generic =>
            {
                err.user_message()
            }
            _ => t!("notice.analysis_failed").into_owned(),
        }
    }
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, ReverieError>;
