use super::ConversationMessage;
use crate::backend::FunctionsClient;
use crate::error::ApiError;
use crate::stream::CHAT_FUNCTION;
use crate::stream::client::ChatBody;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Backend function classifying what the user is asking for.
pub const INTENT_FUNCTION: &str = "detect-intent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: String,
    pub confidence: f64,
}

/// Reply shape of the response function: either the text itself or the text
/// wrapped once more in `{ "response": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CoachReply {
    Text(String),
    Wrapped { response: String },
}

impl CoachReply {
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) | Self::Wrapped { response: text } => text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateEnvelope {
    response: CoachReply,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IntentBody<'a> {
    message: &'a str,
    activity_type: &'a str,
    conversation_history: &'a [ConversationMessage],
}

/// Parameters of a full response generation call.
#[derive(Debug, Clone, Copy)]
pub struct ResponseRequest<'a> {
    pub message: &'a str,
    pub history: &'a [ConversationMessage],
    pub user_id: &'a str,
    pub is_journal_entry: bool,
    pub coaching_mode: bool,
}

/// Network seam of the orchestrator.
#[async_trait]
pub trait CoachBackend: Send + Sync {
    async fn detect_intent(
        &self,
        message: &str,
        activity_type: &str,
        history: &[ConversationMessage],
    ) -> Result<IntentResult, ApiError>;

    async fn generate_response(&self, request: ResponseRequest<'_>) -> Result<String, ApiError>;
}

#[async_trait]
impl CoachBackend for FunctionsClient {
    async fn detect_intent(
        &self,
        message: &str,
        activity_type: &str,
        history: &[ConversationMessage],
    ) -> Result<IntentResult, ApiError> {
        let body = IntentBody {
            message,
            activity_type,
            conversation_history: history,
        };
        self.invoke(INTENT_FUNCTION, &body).await
    }

    async fn generate_response(&self, request: ResponseRequest<'_>) -> Result<String, ApiError> {
        let body = ChatBody {
            message: request.message,
            conversation_history: request.history,
            user_id: request.user_id,
            is_journal_entry: request.is_journal_entry,
            coaching_mode: request.coaching_mode,
            stream: false,
        };
        let envelope: GenerateEnvelope = self.invoke(CHAT_FUNCTION, &body).await?;
        Ok(envelope.response.into_text())
    }
}
