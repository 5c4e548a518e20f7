//! Mood and insight analysis of journal entries.

pub mod pipeline;
pub mod store;

pub use pipeline::{AnalysisOutcome, AnalysisPipeline, AnalysisReport};
pub use store::{EntryStore, MemoryEntryStore, RestEntryStore};

use crate::backend::FunctionsClient;
use crate::error::ApiError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const MOOD_FUNCTION: &str = "analyze-mood";
pub const QUICK_ANALYSIS_FUNCTION: &str = "quick-analysis";

/// Mood scale used by both self reports and the model: 1 (low) to 5 (high).
pub const MOOD_SCALE_SPAN: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub content: String,
    /// Mood the author picked for the entry, if any.
    #[serde(default, rename = "mood", skip_serializing_if = "Option::is_none")]
    pub user_mood: Option<f64>,
}

impl JournalEntry {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            user_mood: None,
        }
    }

    pub fn with_user_mood(mut self, mood: f64) -> Self {
        self.user_mood = Some(mood);
        self
    }

    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodAnalysis {
    pub mood: f64,
    pub sentiment: f64,
    #[serde(default)]
    pub emotions: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickAnalysis {
    pub takeaways: Vec<String>,
    pub insights: Vec<String>,
    pub indicators: Vec<String>,
    pub suggestions: Vec<String>,
    pub confidence: f64,
}

/// Mood columns written back to the entry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodFields {
    pub mood: f64,
    pub sentiment: f64,
    pub emotions: Vec<String>,
    pub confidence: f64,
    /// `None` when the author gave no mood to compare against.
    pub alignment: Option<f64>,
}

impl MoodFields {
    pub fn new(analysis: &MoodAnalysis, user_mood: Option<f64>) -> Self {
        Self {
            mood: analysis.mood,
            sentiment: analysis.sentiment,
            emotions: analysis.emotions.clone(),
            confidence: analysis.confidence,
            alignment: user_mood.map(|user| alignment_score(user, analysis.mood)),
        }
    }
}

/// Similarity of a self-reported and a detected mood, in `[0, 1]`.
pub fn alignment_score(user_mood: f64, ai_mood: f64) -> f64 {
    (1.0 - (user_mood - ai_mood).abs() / MOOD_SCALE_SPAN).max(0.0)
}

/// Network seam of the pipeline. Implementations make a single attempt;
/// retries belong to the pipeline.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn analyze_mood(&self, content: &str) -> Result<MoodAnalysis, ApiError>;

    async fn quick_analysis(&self, entry: &JournalEntry) -> Result<QuickAnalysis, ApiError>;
}

#[async_trait]
impl AnalysisBackend for FunctionsClient {
    async fn analyze_mood(&self, content: &str) -> Result<MoodAnalysis, ApiError> {
        self.invoke_with_policy(MOOD_FUNCTION, &json!({ "content": content }), RetryPolicy::once())
            .await
    }

    async fn quick_analysis(&self, entry: &JournalEntry) -> Result<QuickAnalysis, ApiError> {
        let body = json!({ "entries": [entry], "analysisType": "quick" });
        self.invoke_with_policy(QUICK_ANALYSIS_FUNCTION, &body, RetryPolicy::once())
            .await
    }
}
