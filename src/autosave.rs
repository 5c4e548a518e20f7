//! Debounced persistence of an editable draft.
//!
//! [`AutoSave`] watches a value, collapses bursts of edits into a single save
//! after a quiet period and publishes an [`AutoSaveState`] that a
//! presentation layer can subscribe to.

use crate::analysis::RestEntryStore;
use crate::config::AutosaveConfig;
use crate::notify::{Notice, Notifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const NOTICE_SOURCE: &str = "autosave";

/// A value the coordinator can watch.
pub trait Draft: PartialEq + Clone + Send + Sync + 'static {
    /// Blank drafts are never saved.
    fn is_blank(&self) -> bool;
}

impl Draft for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Draft for serde_json::Value {
    fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(text) => text.is_empty(),
            Self::Object(map) => map.is_empty(),
            Self::Array(items) => items.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }
}

/// Editor contents of a journal entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalDraft {
    pub title: String,
    pub content: String,
    pub mood: Option<u8>,
}

impl Draft for JournalDraft {
    fn is_blank(&self) -> bool {
        self.title.is_empty() && self.content.is_empty() && self.mood.is_none()
    }
}

#[async_trait]
pub trait DraftSaver<T>: Send + Sync {
    async fn save(&self, draft: &T) -> anyhow::Result<()>;
}

/// Writes journal drafts into one entry row of the REST store.
#[derive(Debug, Clone)]
pub struct EntryDraftSaver {
    store: RestEntryStore,
    entry_id: String,
}

impl EntryDraftSaver {
    pub fn new(store: RestEntryStore, entry_id: impl Into<String>) -> Self {
        Self {
            store,
            entry_id: entry_id.into(),
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }
}

#[async_trait]
impl DraftSaver<JournalDraft> for EntryDraftSaver {
    async fn save(&self, draft: &JournalDraft) -> anyhow::Result<()> {
        self.store.save_draft(&self.entry_id, draft).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved {
        at: DateTime<Utc>,
    },
    Error {
        cause: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveEvent {
    Started,
    Succeeded { at: DateTime<Utc> },
    Failed { cause: String },
    /// The "saved" indicator has been shown long enough.
    ResetElapsed,
}

impl SaveStatus {
    pub fn transition(self, event: SaveEvent) -> Self {
        match (self, event) {
            (_, SaveEvent::Started) => Self::Saving,
            (_, SaveEvent::Succeeded { at }) => Self::Saved { at },
            (_, SaveEvent::Failed { cause }) => Self::Error { cause },
            (Self::Saved { .. }, SaveEvent::ResetElapsed) => Self::Idle,
            (current, SaveEvent::ResetElapsed) => current,
        }
    }

    /// Whether a status indicator should be shown.
    pub fn is_visible(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoSaveState {
    pub status: SaveStatus,
    pub last_saved: Option<DateTime<Utc>>,
}

impl AutoSaveState {
    fn apply(&mut self, event: SaveEvent) {
        if let SaveEvent::Succeeded { at } = &event {
            self.last_saved = Some(*at);
        }
        self.status = std::mem::take(&mut self.status).transition(event);
    }
}

struct Schedule<T> {
    /// Latest non-blank value seen by `update`.
    latest: Option<T>,
    debounce: Option<JoinHandle<()>>,
    reset: Option<JoinHandle<()>>,
    /// Bumped on every reschedule or cancel; a timer only fires for its own
    /// generation.
    generation: u64,
}

struct Inner<T> {
    saver: Arc<dyn DraftSaver<T>>,
    notifier: Arc<dyn Notifier>,
    delay: Duration,
    saved_reset: Duration,
    state: watch::Sender<AutoSaveState>,
    schedule: Mutex<Schedule<T>>,
    in_flight: tokio::sync::Mutex<()>,
}

impl<T: Draft> Inner<T> {
    fn schedule(&self) -> MutexGuard<'_, Schedule<T>> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take ownership of the save for `generation`, or `None` if a newer
    /// change or a cancel superseded it.
    fn claim(&self, generation: u64) -> Option<T> {
        let mut schedule = self.schedule();
        if schedule.generation != generation {
            return None;
        }
        schedule.debounce = None;
        schedule.latest.clone()
    }

    async fn perform(self: &Arc<Self>, draft: T) -> bool {
        let _in_flight = self.in_flight.lock().await;

        if let Some(reset) = self.schedule().reset.take() {
            reset.abort();
        }
        self.state.send_modify(|state| state.apply(SaveEvent::Started));

        match self.saver.save(&draft).await {
            Ok(()) => {
                let at = Utc::now();
                self.state
                    .send_modify(|state| state.apply(SaveEvent::Succeeded { at }));
                tracing::debug!(%at, "Draft saved");
                self.schedule_reset();
                true
            }
            Err(error) => {
                let cause = format!("{error:#}");
                self.state
                    .send_modify(|state| state.apply(SaveEvent::Failed { cause }));
                self.notifier
                    .notify(Notice::error(NOTICE_SOURCE, t!("notice.autosave_failed")));
                self.notifier.report_error("autosave", &*error);
                false
            }
        }
    }

    fn schedule_reset(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.saved_reset).await;
            inner
                .state
                .send_modify(|state| state.apply(SaveEvent::ResetElapsed));
        });
        if let Some(previous) = self.schedule().reset.replace(handle) {
            previous.abort();
        }
    }
}

/// Debounced auto-save coordinator.
///
/// Must be used from within a Tokio runtime: timers are spawned tasks.
/// Dropping the coordinator cancels a pending save; a save already running
/// is allowed to finish.
pub struct AutoSave<T: Draft> {
    inner: Arc<Inner<T>>,
}

impl<T: Draft> AutoSave<T> {
    pub fn new(saver: Arc<dyn DraftSaver<T>>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_timing(saver, notifier, Duration::from_secs(2), Duration::from_secs(2))
    }

    pub fn with_timing(
        saver: Arc<dyn DraftSaver<T>>,
        notifier: Arc<dyn Notifier>,
        delay: Duration,
        saved_reset: Duration,
    ) -> Self {
        let (state, _) = watch::channel(AutoSaveState::default());
        Self {
            inner: Arc::new(Inner {
                saver,
                notifier,
                delay,
                saved_reset,
                state,
                schedule: Mutex::new(Schedule {
                    latest: None,
                    debounce: None,
                    reset: None,
                    generation: 0,
                }),
                in_flight: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn from_config(
        saver: Arc<dyn DraftSaver<T>>,
        notifier: Arc<dyn Notifier>,
        config: &AutosaveConfig,
    ) -> Self {
        Self::with_timing(saver, notifier, config.delay(), config.saved_reset())
    }

    pub fn state(&self) -> AutoSaveState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutoSaveState> {
        self.inner.state.subscribe()
    }

    pub fn has_pending(&self) -> bool {
        self.inner.schedule().debounce.is_some()
    }

    /// Report a new value of the watched draft.
    ///
    /// Returns `false` when the value is blank or structurally equal to the
    /// previous one; otherwise any pending save is replaced by one scheduled
    /// after the debounce delay.
    pub fn update(&self, value: T) -> bool {
        let mut schedule = self.inner.schedule();
        if value.is_blank() || schedule.latest.as_ref() == Some(&value) {
            return false;
        }

        schedule.latest = Some(value);
        schedule.generation += 1;
        let generation = schedule.generation;
        if let Some(pending) = schedule.debounce.take() {
            pending.abort();
        }

        let inner = Arc::clone(&self.inner);
        schedule.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            if let Some(draft) = inner.claim(generation) {
                inner.perform(draft).await;
            }
        }));
        true
    }

    /// Cancel the pending timer and save the latest value right away.
    pub async fn save_now(&self) -> bool {
        let draft = {
            let mut schedule = self.inner.schedule();
            schedule.generation += 1;
            if let Some(pending) = schedule.debounce.take() {
                pending.abort();
            }
            schedule.latest.clone()
        };
        match draft {
            Some(draft) => self.inner.perform(draft).await,
            None => false,
        }
    }

    /// Drop the pending save, if any. Status is left untouched.
    pub fn cancel(&self) {
        let mut schedule = self.inner.schedule();
        schedule.generation += 1;
        if let Some(pending) = schedule.debounce.take() {
            pending.abort();
        }
    }
}

impl<T: Draft> Drop for AutoSave<T> {
    fn drop(&mut self) {
        let mut schedule = self.inner.schedule();
        schedule.generation += 1;
        if let Some(pending) = schedule.debounce.take() {
            pending.abort();
        }
        if let Some(reset) = schedule.reset.take() {
            reset.abort();
        }
    }
}
