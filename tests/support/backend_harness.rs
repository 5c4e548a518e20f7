#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reverie::backend::FunctionsClient;
use reverie::rate_limit::RateLimiter;
use reverie::retry::RetryPolicy;

pub const ANON_KEY: &str = "anon-test-key";

/// Client pointed at `server` with millisecond backoff and a roomy limiter.
pub fn client(server: &MockServer) -> FunctionsClient {
    FunctionsClient::new(&server.uri(), Some(ANON_KEY), None)
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(5)))
        .with_rate_limiter(Arc::new(RateLimiter::new(100, Duration::from_secs(60))))
}

pub fn delta_event(content: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({"choices": [{"delta": {"content": content}}]})
    )
}

/// Full SSE body: one event per delta, then the `[DONE]` sentinel.
pub fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::from(": connected\n\n");
    for delta in deltas {
        body.push_str(&delta_event(delta));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

pub async fn mount_json(server: &MockServer, function: &str, status: u16, body: Value) {
    Mock::given(method("POST"))
        .and(path(format!("/functions/v1/{function}")))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// JSON bodies of every request received on `request_path`.
pub async fn bodies_sent_to(server: &MockServer, request_path: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == request_path)
        .filter_map(|request| serde_json::from_slice(&request.body).ok())
        .collect()
}
