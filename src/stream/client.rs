use super::{DeltaStream, StreamHandler, StreamOutcome, consume, delta_stream};
use crate::backend::FunctionsClient;
use crate::conversation::ConversationMessage;
use crate::error::ApiError;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Backend function serving chat completions.
pub const CHAT_FUNCTION: &str = "coach-chat";

/// A chat turn to stream. The last message is the current turn; everything
/// before it is sent as history.
#[derive(Debug, Clone)]
pub struct StreamChatRequest {
    pub messages: Vec<ConversationMessage>,
    pub user_id: String,
    pub is_journal_entry: bool,
    pub coaching_mode: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatBody<'a> {
    pub message: &'a str,
    pub conversation_history: &'a [ConversationMessage],
    pub user_id: &'a str,
    pub is_journal_entry: bool,
    pub coaching_mode: bool,
    pub stream: bool,
}

impl StreamChatRequest {
    pub(crate) fn body(&self) -> Result<ChatBody<'_>, ApiError> {
        let Some((current, history)) = self.messages.split_last() else {
            return Err(ApiError::InvalidRequest("no messages to send".into()));
        };
        Ok(ChatBody {
            message: &current.content,
            conversation_history: history,
            user_id: &self.user_id,
            is_journal_entry: self.is_journal_entry,
            coaching_mode: self.coaching_mode,
            stream: true,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChatStreamClient {
    functions: FunctionsClient,
    function: String,
}

impl ChatStreamClient {
    pub fn new(functions: FunctionsClient) -> Self {
        Self {
            functions,
            function: CHAT_FUNCTION.to_string(),
        }
    }

    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.function = name.into();
        self
    }

    /// Open the stream and hand back the pull-based delta stream.
    pub async fn open(&self, request: &StreamChatRequest) -> Result<DeltaStream, ApiError> {
        let body = request.body()?;
        let response = self.functions.open_stream(&self.function, &body).await?;
        tracing::debug!(function = self.function.as_str(), "Chat stream opened");
        Ok(delta_stream(response.bytes_stream()))
    }

    /// Stream a reply into `handler`.
    ///
    /// Failures opening the stream are reported through `on_error` like
    /// failures mid-stream. Cancelling `cancel` aborts the request and
    /// silences every later callback.
    pub async fn stream_chat(
        &self,
        request: &StreamChatRequest,
        handler: &mut dyn StreamHandler,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return StreamOutcome::Cancelled,
            opened = self.open(request) => opened,
        };

        match opened {
            Ok(stream) => consume(stream, handler, cancel).await,
            Err(error) => {
                tracing::warn!(function = self.function.as_str(), "Chat stream failed to open: {error}");
                handler.on_error(&error);
                StreamOutcome::Failed(error)
            }
        }
    }
}
