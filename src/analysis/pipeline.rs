use super::{AnalysisBackend, EntryStore, JournalEntry, MoodFields, QuickAnalysis};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, ApiError, FailureKind, StoreError};
use crate::notify::{Notice, Notifier};
use crate::retry::{Retrier, RetryPolicy};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const NOTICE_SOURCE: &str = "analysis";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub entry_id: String,
    pub mood: MoodFields,
    /// `None` when the secondary analysis failed; the mood write stands.
    pub quick: Option<QuickAnalysis>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// Entry too short to analyse. Not an error.
    Skipped { words: usize },
    Completed(AnalysisReport),
    /// Another job for the same entry is still running.
    InFlight,
}

/// Removes the entry id from the in-flight set when the job ends.
struct EntryLease<'a> {
    active: &'a Mutex<HashSet<String>>,
    entry_id: String,
}

impl<'a> EntryLease<'a> {
    fn acquire(active: &'a Mutex<HashSet<String>>, entry_id: &str) -> Option<Self> {
        let inserted = active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry_id.to_string());
        inserted.then(|| Self {
            active,
            entry_id: entry_id.to_string(),
        })
    }
}

impl Drop for EntryLease<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.entry_id);
    }
}

/// Mood analysis followed by the dependent quick analysis.
///
/// Each stage is retried on its own with exponential backoff. Mood analysis
/// failing fails the job before anything is written; quick analysis failing
/// is reported and otherwise ignored.
pub struct AnalysisPipeline {
    backend: Arc<dyn AnalysisBackend>,
    store: Arc<dyn EntryStore>,
    notifier: Arc<dyn Notifier>,
    min_words: usize,
    stage_policy: RetryPolicy,
    pipeline_policy: RetryPolicy,
    active: Mutex<HashSet<String>>,
}

impl AnalysisPipeline {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        store: Arc<dyn EntryStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::from_config(backend, store, notifier, &AnalysisConfig::default())
    }

    pub fn from_config(
        backend: Arc<dyn AnalysisBackend>,
        store: Arc<dyn EntryStore>,
        notifier: Arc<dyn Notifier>,
        config: &AnalysisConfig,
    ) -> Self {
        Self {
            backend,
            store,
            notifier,
            min_words: config.min_words,
            stage_policy: config.stage_policy(),
            pipeline_policy: config.pipeline_policy(),
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_stage_backoff(mut self, base: Duration) -> Self {
        self.stage_policy = RetryPolicy::new(self.stage_policy.max_attempts, base);
        self.pipeline_policy = RetryPolicy::new(self.pipeline_policy.max_attempts, base);
        self
    }

    pub fn is_running(&self, entry_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(entry_id)
    }

    /// Run the job once (each stage still retries on its own).
    pub async fn analyze(&self, entry: &JournalEntry) -> Result<AnalysisOutcome, AnalysisError> {
        self.run(entry, RetryPolicy::once()).await
    }

    /// Run the job, repeating it as a whole when it fails with a transient
    /// error. The whole-job attempts multiply with the per-stage ones.
    pub async fn analyze_with_retries(
        &self,
        entry: &JournalEntry,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        self.run(entry, self.pipeline_policy).await
    }

    async fn run(
        &self,
        entry: &JournalEntry,
        policy: RetryPolicy,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let words = entry.word_count();
        if words < self.min_words {
            tracing::debug!(entry_id = entry.id.as_str(), words, "Entry too short to analyse");
            return Ok(AnalysisOutcome::Skipped { words });
        }
        let Some(_lease) = EntryLease::acquire(&self.active, &entry.id) else {
            tracing::debug!(entry_id = entry.id.as_str(), "Analysis already running");
            return Ok(AnalysisOutcome::InFlight);
        };

        let result = Retrier::new(policy)
            .run("analysis_pipeline", AnalysisError::is_retryable, |_| {
                self.run_once(entry)
            })
            .await;

        match result {
            Ok(report) => Ok(AnalysisOutcome::Completed(report)),
            Err(error) => {
                self.notifier
                    .notify(Notice::error(NOTICE_SOURCE, error.user_message()));
                self.notifier.report_error("analysis_pipeline", &error);
                Err(error)
            }
        }
    }

    async fn run_once(&self, entry: &JournalEntry) -> Result<AnalysisReport, AnalysisError> {
        let stage = Retrier::new(self.stage_policy);

        let analysis = stage
            .run("analyze_mood", ApiError::is_retryable, |_| {
                self.backend.analyze_mood(&entry.content)
            })
            .await
            .map_err(AnalysisError::MoodAnalysis)?;

        let mood = MoodFields::new(&analysis, entry.user_mood);
        self.store.update_mood(&entry.id, &mood).await?;
        tracing::info!(
            entry_id = entry.id.as_str(),
            mood = mood.mood,
            alignment = ?mood.alignment,
            "Mood analysis stored"
        );

        let quick = self.quick_stage(&stage, entry).await;
        Ok(AnalysisReport {
            entry_id: entry.id.clone(),
            mood,
            quick,
        })
    }

    async fn quick_stage(&self, stage: &Retrier, entry: &JournalEntry) -> Option<QuickAnalysis> {
        let result = stage
            .run("quick_analysis", ApiError::is_retryable, |_| {
                self.backend.quick_analysis(entry)
            })
            .await;

        let (stored, limit) = match result {
            Ok(quick) => match self.store.insert_analysis(&entry.id, &quick).await {
                Ok(()) => (Some(quick), None),
                Err(error) => {
                    self.notifier.report_error("quick_analysis_store", &error);
                    let limit = match &error {
                        StoreError::Backend(api) => limit_message(api),
                        StoreError::NotFound(_) => None,
                    };
                    (None, limit)
                }
            },
            Err(error) => {
                self.notifier.report_error("quick_analysis", &error);
                (None, limit_message(&error))
            }
        };

        if stored.is_none() {
            tracing::warn!(entry_id = entry.id.as_str(), "Quick analysis unavailable");
            let message = match limit {
                Some(reason) => t!("notice.quick_analysis_limited", reason = reason),
                None => t!("notice.quick_analysis_failed"),
            };
            self.notifier.notify(Notice::warning(NOTICE_SOURCE, message));
        }
        stored
    }
}

/// The rate-limit or quota message for `error`, if it is one of those.
fn limit_message(error: &ApiError) -> Option<String> {
    (error.kind() != FailureKind::Generic).then(|| error.user_message())
}
