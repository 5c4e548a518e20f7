use super::{ConversationMessage, ConversationalAi};
use crate::error::ApiError;
use crate::stream::{StreamHandler, StreamOutcome};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Replied(String),
    /// The call failed; the user's message was withdrawn from the history
    /// and is handed back so it can be restored to the input.
    Failed { draft: String },
    /// The streamed reply was cancelled; same contract as `Failed`.
    Cancelled { draft: String },
    /// Blank input, or another send is still running.
    Ignored,
}

/// Running chat with the coach.
///
/// Keeps the message list in sync with what the backend has answered: a user
/// turn is only kept once a reply for it arrived.
pub struct ChatSession {
    ai: Arc<ConversationalAi>,
    messages: Vec<ConversationMessage>,
    is_journal_entry: bool,
    coaching_mode: bool,
}

impl ChatSession {
    pub fn new(ai: Arc<ConversationalAi>) -> Self {
        Self {
            ai,
            messages: Vec::new(),
            is_journal_entry: false,
            coaching_mode: false,
        }
    }

    pub fn journal_entry(mut self, enabled: bool) -> Self {
        self.is_journal_entry = enabled;
        self
    }

    pub fn coaching(mut self, enabled: bool) -> Self {
        self.coaching_mode = enabled;
        self
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub async fn send(&mut self, input: &str) -> SendOutcome {
        let Some(text) = self.accept(input) else {
            return SendOutcome::Ignored;
        };

        let history_len = self.messages.len();
        self.messages.push(ConversationMessage::user(text));
        let reply = self
            .ai
            .generate_response(
                text,
                &self.messages[..history_len],
                self.is_journal_entry,
                self.coaching_mode,
            )
            .await;

        match reply {
            Some(reply) => {
                self.messages.push(ConversationMessage::assistant(reply.as_str()));
                SendOutcome::Replied(reply)
            }
            None => {
                self.messages.truncate(history_len);
                SendOutcome::Failed {
                    draft: input.to_string(),
                }
            }
        }
    }

    /// Like [`send`](Self::send), with the reply streamed into `handler` as it
    /// arrives.
    pub async fn send_streaming(
        &mut self,
        input: &str,
        handler: &mut dyn StreamHandler,
        cancel: &CancellationToken,
    ) -> SendOutcome {
        let Some(text) = self.accept(input) else {
            return SendOutcome::Ignored;
        };

        let history_len = self.messages.len();
        self.messages.push(ConversationMessage::user(text));
        let mut tee = Tee {
            inner: handler,
            text: String::new(),
        };
        let outcome = self
            .ai
            .stream_response(
                text,
                &self.messages[..history_len],
                self.is_journal_entry,
                self.coaching_mode,
                &mut tee,
                cancel,
            )
            .await;

        match outcome {
            StreamOutcome::Completed => {
                let reply = tee.text;
                self.messages.push(ConversationMessage::assistant(reply.as_str()));
                SendOutcome::Replied(reply)
            }
            StreamOutcome::Failed(_) => {
                self.messages.truncate(history_len);
                SendOutcome::Failed {
                    draft: input.to_string(),
                }
            }
            StreamOutcome::Cancelled => {
                self.messages.truncate(history_len);
                SendOutcome::Cancelled {
                    draft: input.to_string(),
                }
            }
        }
    }

    /// The text to send for `input`, or `None` when nothing should be sent.
    /// The draft handed back on failure is always the untrimmed `input`.
    fn accept<'a>(&self, input: &'a str) -> Option<&'a str> {
        let text = input.trim();
        if text.is_empty() || self.ai.is_in_progress() {
            return None;
        }
        Some(text)
    }
}

/// Forwards callbacks while keeping a copy of the reply text.
struct Tee<'a> {
    inner: &'a mut dyn StreamHandler,
    text: String,
}

impl StreamHandler for Tee<'_> {
    fn on_delta(&mut self, text: &str) {
        self.text.push_str(text);
        self.inner.on_delta(text);
    }

    fn on_done(&mut self) {
        self.inner.on_done();
    }

    fn on_error(&mut self, error: &ApiError) {
        self.inner.on_error(error);
    }
}
