use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reverie::analysis::{AnalysisOutcome, AnalysisPipeline, JournalEntry, RestEntryStore};
use reverie::error::{ApiError, FailureKind};
use reverie::notify::{NoticeLevel, RecordingNotifier};

use crate::backend_harness::{bodies_sent_to, client, mount_json};

fn entry() -> JournalEntry {
    let content = "Woke up early and wrote for a while before work. ".repeat(6);
    JournalEntry::new("entry-9", content).with_user_mood(3.0)
}

fn pipeline(server: &MockServer) -> (AnalysisPipeline, Arc<RecordingNotifier>) {
    let functions = client(server);
    let store = RestEntryStore::new(functions.clone());
    let notifier = RecordingNotifier::new();
    let pipeline = AnalysisPipeline::new(Arc::new(functions), Arc::new(store), notifier.clone())
        .with_stage_backoff(Duration::from_millis(5));
    (pipeline, notifier)
}

async fn mount_mood(server: &MockServer) {
    mount_json(
        server,
        "analyze-mood",
        200,
        json!({"mood": 4, "sentiment": 0.5, "emotions": ["grateful"], "confidence": 0.9}),
    )
    .await;
}

#[tokio::test]
async fn quick_analysis_outage_keeps_persisted_mood() {
    let server = MockServer::start().await;
    mount_mood(&server).await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/quick-analysis"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/journal_entries"))
        .and(query_param("id", "eq.entry-9"))
        .and(body_partial_json(json!({"mood": 4.0, "alignment": 0.75})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/entry_analyses"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;
    let (pipeline, notifier) = pipeline(&server);

    let outcome = pipeline.analyze_with_retries(&entry()).await.unwrap();

    let AnalysisOutcome::Completed(report) = outcome else {
        panic!("expected completed, got {outcome:?}");
    };
    assert!(report.quick.is_none());
    assert_eq!(report.mood.emotions, vec!["grateful"]);
    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Warning);
}

#[tokio::test]
async fn successful_run_writes_mood_and_analysis_row() {
    let server = MockServer::start().await;
    mount_mood(&server).await;
    mount_json(
        &server,
        "quick-analysis",
        200,
        json!({"takeaways": ["mornings work"], "confidence": 0.7}),
    )
    .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/journal_entries"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/entry_analyses"))
        .and(body_partial_json(json!({
            "entry_id": "entry-9",
            "takeaways": ["mornings work"]
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    let (pipeline, notifier) = pipeline(&server);

    let outcome = pipeline.analyze(&entry()).await.unwrap();

    assert!(matches!(outcome, AnalysisOutcome::Completed(ref report) if report.quick.is_some()));
    assert!(notifier.notices().is_empty());

    let quick_request = &bodies_sent_to(&server, "/functions/v1/quick-analysis").await[0];
    assert_eq!(quick_request["analysisType"], "quick");
    assert_eq!(quick_request["entries"][0]["id"], "entry-9");
}

#[tokio::test]
async fn mood_failure_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/analyze-mood"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;
    let (pipeline, notifier) = pipeline(&server);

    assert!(pipeline.analyze_with_retries(&entry()).await.is_err());
    assert_eq!(notifier.notices()[0].level, NoticeLevel::Error);
}

#[tokio::test]
async fn short_entry_makes_no_requests() {
    let server = MockServer::start().await;
    let (pipeline, _) = pipeline(&server);

    let outcome = pipeline
        .analyze(&JournalEntry::new("tiny", "Slept fine."))
        .await
        .unwrap();

    assert_eq!(outcome, AnalysisOutcome::Skipped { words: 2 });
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn store_quota_failure_is_not_retried_and_names_the_quota() {
    let server = MockServer::start().await;
    mount_mood(&server).await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/journal_entries"))
        .respond_with(ResponseTemplate::new(402))
        .expect(1)
        .mount(&server)
        .await;
    let (pipeline, notifier) = pipeline(&server);

    let err = pipeline.analyze_with_retries(&entry()).await.unwrap_err();

    assert!(!err.is_retryable());
    assert_eq!(err.kind(), FailureKind::QuotaExhausted);
    assert_eq!(bodies_sent_to(&server, "/functions/v1/analyze-mood").await.len(), 1);
    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert_eq!(notices[0].message, ApiError::QuotaExhausted.user_message());
}

#[tokio::test]
async fn quick_analysis_quota_warning_names_the_quota() {
    let server = MockServer::start().await;
    mount_mood(&server).await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/quick-analysis"))
        .respond_with(ResponseTemplate::new(402))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/journal_entries"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let (pipeline, notifier) = pipeline(&server);

    let outcome = pipeline.analyze_with_retries(&entry()).await.unwrap();

    assert!(matches!(outcome, AnalysisOutcome::Completed(ref report) if report.quick.is_none()));
    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Warning);
    assert!(notices[0].message.contains(&ApiError::QuotaExhausted.user_message()));
}
