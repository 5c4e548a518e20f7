use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reverie::ApiError;
use reverie::conversation::{ChatSession, ConversationMessage, ConversationalAi, SendOutcome};
use reverie::notify::{NoticeLevel, RecordingNotifier};
use reverie::rate_limit::RateLimiter;

use crate::backend_harness::{bodies_sent_to, client, mount_json};

fn coach(server: &MockServer) -> (ConversationalAi, Arc<RecordingNotifier>) {
    let notifier = RecordingNotifier::new();
    let ai = ConversationalAi::new(Arc::new(client(server)), notifier.clone(), "user-7");
    (ai, notifier)
}

#[tokio::test]
async fn payment_required_returns_none_with_quota_notice_and_no_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/coach-chat"))
        .respond_with(ResponseTemplate::new(402).set_body_string("add credits"))
        .expect(1)
        .mount(&server)
        .await;
    let (ai, notifier) = coach(&server);

    let reply = ai.generate_response("hello", &[], false, false).await;

    assert!(reply.is_none());
    assert!(!ai.is_in_progress());
    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert_eq!(notices[0].message, ApiError::QuotaExhausted.user_message());
}

#[tokio::test]
async fn nested_response_shape_is_unwrapped() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "coach-chat",
        200,
        json!({"response": {"response": "Nested hello"}}),
    )
    .await;
    let (ai, _) = coach(&server);

    let reply = ai.generate_response("hi", &[], true, true).await;

    assert_eq!(reply.as_deref(), Some("Nested hello"));
    let sent = &bodies_sent_to(&server, "/functions/v1/coach-chat").await[0];
    assert_eq!(sent["stream"], false);
    assert_eq!(sent["coachingMode"], true);
    assert_eq!(sent["userId"], "user-7");
}

#[tokio::test]
async fn intent_detection_sends_bounded_history() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "detect-intent",
        200,
        json!({"intent": "log_habit", "confidence": 0.82}),
    )
    .await;
    let (ai, _) = coach(&server);
    let history: Vec<_> = (1..=5)
        .map(|turn| ConversationMessage::user(format!("turn {turn}")))
        .collect();

    let intent = ai
        .detect_intent("I went running", "habits", &history)
        .await
        .unwrap();

    assert_eq!(intent.intent, "log_habit");
    let sent = &bodies_sent_to(&server, "/functions/v1/detect-intent").await[0];
    assert_eq!(sent["activityType"], "habits");
    let window = sent["conversationHistory"].as_array().unwrap();
    assert_eq!(window.len(), 3);
    assert_eq!(window[0]["content"], "turn 3");
}

#[tokio::test]
async fn failed_send_keeps_the_draft_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/coach-chat"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    let (ai, notifier) = coach(&server);
    let mut session = ChatSession::new(Arc::new(ai));

    let outcome = session.send("Today I finally called my sister.").await;

    assert_eq!(
        outcome,
        SendOutcome::Failed {
            draft: "Today I finally called my sister.".into()
        }
    );
    assert!(session.messages().is_empty());
    assert_eq!(notifier.notices().len(), 1);
}

#[tokio::test]
async fn local_throttle_names_the_wait() {
    let server = MockServer::start().await;
    mount_json(&server, "coach-chat", 200, json!({"response": "ok"})).await;
    let notifier = RecordingNotifier::new();
    let functions = client(&server)
        .with_rate_limiter(Arc::new(RateLimiter::new(1, Duration::from_secs(30))));
    let ai = ConversationalAi::new(Arc::new(functions), notifier.clone(), "user-7");

    assert!(ai.generate_response("one", &[], false, false).await.is_some());
    assert!(ai.generate_response("two", &[], false, false).await.is_none());

    let message = &notifier.notices()[0].message;
    assert!(message.contains("30s"), "unexpected notice: {message}");
    assert_eq!(bodies_sent_to(&server, "/functions/v1/coach-chat").await.len(), 1);
}
