use futures_util::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reverie::ApiError;
use reverie::conversation::ConversationMessage;
use reverie::stream::{ChatStreamClient, StreamChatRequest, StreamCollector, StreamOutcome};

use crate::backend_harness::{client, delta_event, sse_body, sse_response};

fn request(text: &str) -> StreamChatRequest {
    StreamChatRequest {
        messages: vec![
            ConversationMessage::user("I slept badly"),
            ConversationMessage::assistant("That sounds rough."),
            ConversationMessage::user(text),
        ],
        user_id: "user-42".into(),
        is_journal_entry: true,
        coaching_mode: false,
    }
}

async fn mount_stream(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/functions/v1/coach-chat"))
        .and(header("accept", "text/event-stream"))
        .respond_with(sse_response(body))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn streamed_reply_is_reassembled_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/coach-chat"))
        .and(body_partial_json(json!({
            "message": "what helps?",
            "userId": "user-42",
            "isJournalEntry": true,
            "stream": true
        })))
        .respond_with(sse_response(sse_body(&["Try ", "a short ", "walk 🌿"])))
        .expect(1)
        .mount(&server)
        .await;

    let chat = ChatStreamClient::new(client(&server));
    let mut collector = StreamCollector::new();
    let outcome = chat
        .stream_chat(&request("what helps?"), &mut collector, &CancellationToken::new())
        .await;

    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(collector.text(), "Try a short walk 🌿");
    assert_eq!(collector.delta_count(), 3);
    assert!(collector.is_done());
}

#[tokio::test]
async fn events_after_sentinel_are_never_delivered() {
    let server = MockServer::start().await;
    let body = format!("{}{}", sse_body(&["one", "two"]), delta_event("late"));
    mount_stream(&server, body).await;

    let chat = ChatStreamClient::new(client(&server));
    let mut collector = StreamCollector::new();
    chat.stream_chat(&request("go"), &mut collector, &CancellationToken::new())
        .await;

    assert_eq!(collector.text(), "onetwo");
    assert_eq!(collector.delta_count(), 2);
}

#[tokio::test]
async fn pull_stream_yields_deltas_then_ends() {
    let server = MockServer::start().await;
    mount_stream(&server, sse_body(&["a", "b"])).await;

    let chat = ChatStreamClient::new(client(&server));
    let deltas: Vec<_> = chat
        .open(&request("go"))
        .await
        .unwrap()
        .map(|delta| delta.unwrap().text)
        .collect()
        .await;

    assert_eq!(deltas, vec!["a", "b"]);
}

#[tokio::test]
async fn rate_limited_stream_reports_error_without_done() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/coach-chat"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let chat = ChatStreamClient::new(client(&server));
    let mut collector = StreamCollector::new();
    let outcome = chat
        .stream_chat(&request("go"), &mut collector, &CancellationToken::new())
        .await;

    assert_eq!(outcome, StreamOutcome::Failed(ApiError::RateLimited));
    assert_eq!(collector.error(), Some(&ApiError::RateLimited));
    assert!(!collector.is_done());
}

#[tokio::test]
async fn quota_exhausted_stream_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/coach-chat"))
        .respond_with(ResponseTemplate::new(402))
        .expect(1)
        .mount(&server)
        .await;

    let chat = ChatStreamClient::new(client(&server));
    let mut collector = StreamCollector::new();
    let outcome = chat
        .stream_chat(&request("go"), &mut collector, &CancellationToken::new())
        .await;

    assert_eq!(outcome, StreamOutcome::Failed(ApiError::QuotaExhausted));
}

#[tokio::test]
async fn cancelled_before_open_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse_response(sse_body(&["never"])))
        .expect(0)
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    token.cancel();
    let chat = ChatStreamClient::new(client(&server));
    let mut collector = StreamCollector::new();

    let outcome = chat.stream_chat(&request("go"), &mut collector, &token).await;

    assert_eq!(outcome, StreamOutcome::Cancelled);
    assert!(collector.text().is_empty());
    assert!(collector.error().is_none());
}
