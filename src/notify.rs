//! User-facing notices and error reporting.
//!
//! Components never reach for ambient global hooks to report failures; they
//! receive an `Arc<dyn Notifier>` at construction time instead.

use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    /// Component that raised the notice (e.g. `"autosave"`).
    pub source: &'static str,
    pub message: String,
}

impl Notice {
    pub fn error(source: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            source,
            message: message.into(),
        }
    }

    pub fn warning(source: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            source,
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    /// Surface a message to the end user.
    fn notify(&self, notice: Notice);

    /// Report an internal failure for diagnostics. Not shown to the user.
    fn report_error(&self, context: &str, error: &dyn std::error::Error) {
        tracing::error!(context, "{error}");
    }
}

/// Forwards notices to `tracing`.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => tracing::info!(source = notice.source, "{}", notice.message),
            NoticeLevel::Warning => tracing::warn!(source = notice.source, "{}", notice.message),
            NoticeLevel::Error => tracing::error!(source = notice.source, "{}", notice.message),
        }
    }
}

/// Keeps every notice in memory. Handy for embedding in tests and for UIs
/// that drain notices on their own schedule.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice);
    }
}
