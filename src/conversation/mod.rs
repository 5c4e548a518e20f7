//! Conversational coach: intent detection, reply generation and the chat
//! session that keeps the running history.

pub mod coach;
pub mod message;
pub mod session;

pub use coach::{CoachBackend, CoachReply, INTENT_FUNCTION, IntentResult, ResponseRequest};
pub use message::{ConversationMessage, Role, recent_window};
pub use session::{ChatSession, SendOutcome};

use crate::error::{ApiError, FailureKind};
use crate::notify::{Notice, Notifier};
use crate::stream::{ChatStreamClient, StreamChatRequest, StreamHandler, StreamOutcome};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

const NOTICE_SOURCE: &str = "conversation";

/// Keeps the in-progress counter raised for as long as it lives, so every
/// exit path (success, handled error, panic or cancellation) lowers it.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Orchestrates calls to the coaching backend.
///
/// Failures never escape as errors: they are surfaced through the
/// [`Notifier`] (rate limit, quota and generic failures each get their own
/// message) and the call returns `None`.
pub struct ConversationalAi {
    backend: Arc<dyn CoachBackend>,
    streaming: Option<ChatStreamClient>,
    notifier: Arc<dyn Notifier>,
    user_id: String,
    intent_window: usize,
    in_flight: AtomicUsize,
}

impl ConversationalAi {
    pub fn new(
        backend: Arc<dyn CoachBackend>,
        notifier: Arc<dyn Notifier>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            streaming: None,
            notifier,
            user_id: user_id.into(),
            intent_window: 3,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_streaming(mut self, client: ChatStreamClient) -> Self {
        self.streaming = Some(client);
        self
    }

    pub fn with_intent_window(mut self, window: usize) -> Self {
        self.intent_window = window;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// True while any call is running; UIs use it to block duplicate submits.
    pub fn is_in_progress(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub async fn detect_intent(
        &self,
        message: &str,
        activity_type: &str,
        recent_history: &[ConversationMessage],
    ) -> Option<IntentResult> {
        let _in_flight = InFlight::enter(&self.in_flight);
        let history = recent_window(recent_history, self.intent_window);

        match self
            .backend
            .detect_intent(message, activity_type, history)
            .await
        {
            Ok(intent) => {
                tracing::debug!(
                    intent = intent.intent.as_str(),
                    confidence = intent.confidence,
                    "Intent detected"
                );
                Some(intent)
            }
            Err(error) => {
                self.surface(&error, "detect_intent", t!("notice.intent_failed").as_ref());
                None
            }
        }
    }

    pub async fn generate_response(
        &self,
        message: &str,
        history: &[ConversationMessage],
        is_journal_entry: bool,
        coaching_mode: bool,
    ) -> Option<String> {
        let _in_flight = InFlight::enter(&self.in_flight);
        let request = ResponseRequest {
            message,
            history,
            user_id: &self.user_id,
            is_journal_entry,
            coaching_mode,
        };

        match self.backend.generate_response(request).await {
            Ok(reply) => Some(reply),
            Err(error) => {
                self.surface(&error, "generate_response", t!("notice.response_failed").as_ref());
                None
            }
        }
    }

    /// Stream a reply to `message` into `handler`.
    ///
    /// Falls back to a single non-streaming call, delivered as one delta,
    /// when no streaming client is configured.
    pub async fn stream_response(
        &self,
        message: &str,
        history: &[ConversationMessage],
        is_journal_entry: bool,
        coaching_mode: bool,
        handler: &mut dyn StreamHandler,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        let Some(client) = &self.streaming else {
            return match self
                .generate_response(message, history, is_journal_entry, coaching_mode)
                .await
            {
                Some(reply) => {
                    handler.on_delta(&reply);
                    handler.on_done();
                    StreamOutcome::Completed
                }
                None => {
                    let error = ApiError::Stream("reply unavailable".into());
                    handler.on_error(&error);
                    StreamOutcome::Failed(error)
                }
            };
        };

        let _in_flight = InFlight::enter(&self.in_flight);
        let mut messages = history.to_vec();
        messages.push(ConversationMessage::user(message));
        let request = StreamChatRequest {
            messages,
            user_id: self.user_id.clone(),
            is_journal_entry,
            coaching_mode,
        };

        let outcome = client.stream_chat(&request, handler, cancel).await;
        if let StreamOutcome::Failed(error) = &outcome {
            self.surface(error, "stream_response", t!("notice.response_failed").as_ref());
        }
        outcome
    }

    fn surface(&self, error: &ApiError, context: &str, generic: &str) {
        let message = match error.kind() {
            FailureKind::RateLimited | FailureKind::QuotaExhausted => error.user_message(),
            FailureKind::Generic => generic.to_string(),
        };
        self.notifier.notify(Notice::error(NOTICE_SOURCE, message));
        self.notifier.report_error(context, error);
    }
}
