use super::{MoodFields, QuickAnalysis};
use crate::autosave::JournalDraft;
use crate::backend::{FunctionsClient, api_error};
use crate::error::{ApiError, StoreError};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Persistent home of journal entries and their derived analyses.
///
/// Writes are last-writer-wins per field; no concurrency check is made.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn update_mood(&self, entry_id: &str, fields: &MoodFields) -> Result<(), StoreError>;

    async fn insert_analysis(
        &self,
        entry_id: &str,
        analysis: &QuickAnalysis,
    ) -> Result<(), StoreError>;
}

/// Process-local store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    moods: Mutex<HashMap<String, MoodFields>>,
    analyses: Mutex<Vec<(String, QuickAnalysis)>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mood_for(&self, entry_id: &str) -> Option<MoodFields> {
        self.moods
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entry_id)
            .cloned()
    }

    pub fn analyses_for(&self, entry_id: &str) -> Vec<QuickAnalysis> {
        self.analyses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, _)| id == entry_id)
            .map(|(_, analysis)| analysis.clone())
            .collect()
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn update_mood(&self, entry_id: &str, fields: &MoodFields) -> Result<(), StoreError> {
        self.moods
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry_id.to_string(), fields.clone());
        Ok(())
    }

    async fn insert_analysis(
        &self,
        entry_id: &str,
        analysis: &QuickAnalysis,
    ) -> Result<(), StoreError> {
        self.analyses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((entry_id.to_string(), analysis.clone()));
        Ok(())
    }
}

const ENTRIES_TABLE: &str = "journal_entries";
const ANALYSES_TABLE: &str = "entry_analyses";

#[derive(Serialize)]
struct AnalysisRow<'a> {
    entry_id: &'a str,
    analysis_type: &'static str,
    #[serde(flatten)]
    analysis: &'a QuickAnalysis,
}

#[derive(Serialize)]
struct DraftRow<'a> {
    id: &'a str,
    title: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mood: Option<u8>,
}

/// Store backed by the hosted backend's REST interface
/// (`/rest/v1/<table>`, PostgREST filter syntax).
#[derive(Debug, Clone)]
pub struct RestEntryStore {
    client: FunctionsClient,
}

impl RestEntryStore {
    pub fn new(client: FunctionsClient) -> Self {
        Self { client }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.client.base_url())
    }

    /// Create or update the editable columns of an entry. A draft without a
    /// mood leaves the stored mood alone.
    pub async fn save_draft(&self, entry_id: &str, draft: &JournalDraft) -> Result<(), StoreError> {
        let row = DraftRow {
            id: entry_id,
            title: &draft.title,
            content: &draft.content,
            mood: draft.mood,
        };
        let request = self
            .client
            .http()
            .post(self.table_url(ENTRIES_TABLE))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row);
        let response = self
            .client
            .authorize(request)
            .send()
            .await
            .map_err(ApiError::from)?;
        Self::check(response).await
    }

    async fn check(response: reqwest::Response) -> Result<(), StoreError> {
        if response.status().is_success() {
            return Ok(());
        }
        Err(api_error(response).await.into())
    }
}

#[async_trait]
impl EntryStore for RestEntryStore {
    async fn update_mood(&self, entry_id: &str, fields: &MoodFields) -> Result<(), StoreError> {
        let request = self
            .client
            .http()
            .patch(self.table_url(ENTRIES_TABLE))
            .query(&[("id", format!("eq.{entry_id}"))])
            .header("Prefer", "return=minimal")
            .json(fields);
        let response = self
            .client
            .authorize(request)
            .send()
            .await
            .map_err(ApiError::from)?;
        Self::check(response).await
    }

    async fn insert_analysis(
        &self,
        entry_id: &str,
        analysis: &QuickAnalysis,
    ) -> Result<(), StoreError> {
        let row = AnalysisRow {
            entry_id,
            analysis_type: "quick",
            analysis,
        };
        let request = self
            .client
            .http()
            .post(self.table_url(ANALYSES_TABLE))
            .header("Prefer", "return=minimal")
            .json(&row);
        let response = self
            .client
            .authorize(request)
            .send()
            .await
            .map_err(ApiError::from)?;
        Self::check(response).await
    }
}
