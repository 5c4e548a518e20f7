use super::DeltaStream;
use crate::error::ApiError;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receiver of a streamed reply.
///
/// `on_delta` is called for every fragment in arrival order. Exactly one of
/// `on_done` / `on_error` follows, unless the consumer is cancelled, in which
/// case neither is called.
pub trait StreamHandler: Send {
    fn on_delta(&mut self, text: &str);

    fn on_done(&mut self) {}

    fn on_error(&mut self, _error: &ApiError) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Failed(ApiError),
    Cancelled,
}

/// Drive `stream` into `handler` until it ends, fails or `cancel` fires.
///
/// Cancellation drops the stream, which closes the underlying transport.
pub async fn consume(
    mut stream: DeltaStream,
    handler: &mut dyn StreamHandler,
    cancel: &CancellationToken,
) -> StreamOutcome {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                drop(stream);
                tracing::debug!("Stream consumer cancelled");
                return StreamOutcome::Cancelled;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(delta)) => handler.on_delta(&delta.text),
            Some(Err(error)) => {
                handler.on_error(&error);
                return StreamOutcome::Failed(error);
            }
            None => {
                handler.on_done();
                return StreamOutcome::Completed;
            }
        }
    }
}

/// Concatenates deltas into the full assistant message.
#[derive(Debug, Default)]
pub struct StreamCollector {
    text: String,
    deltas: usize,
    done: bool,
    error: Option<ApiError>,
}

impl StreamCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn delta_count(&self) -> usize {
        self.deltas
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl StreamHandler for StreamCollector {
    fn on_delta(&mut self, text: &str) {
        self.text.push_str(text);
        self.deltas += 1;
    }

    fn on_done(&mut self) {
        self.done = true;
    }

    fn on_error(&mut self, error: &ApiError) {
        self.error = Some(error.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Done,
    Error(ApiError),
}

/// Drive `stream` into a bounded channel, waiting for capacity before each
/// event so nothing is dropped when the receiver is slow.
///
/// Every delta is sent in order, followed by exactly one `Done` or `Error`.
/// Cancellation while waiting on the stream or on channel capacity stops
/// without a terminal event. A dropped receiver counts as cancellation.
pub async fn consume_into(
    mut stream: DeltaStream,
    sender: mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
) -> StreamOutcome {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("Stream consumer cancelled");
                return StreamOutcome::Cancelled;
            }
            next = stream.next() => next,
        };

        let (event, outcome) = match next {
            Some(Ok(delta)) => (StreamEvent::Delta(delta.text), None),
            Some(Err(error)) => (
                StreamEvent::Error(error.clone()),
                Some(StreamOutcome::Failed(error)),
            ),
            None => (StreamEvent::Done, Some(StreamOutcome::Completed)),
        };

        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("Stream consumer cancelled while waiting for the receiver");
                return StreamOutcome::Cancelled;
            }
            sent = sender.send(event) => sent,
        };
        if sent.is_err() {
            tracing::debug!("Stream receiver dropped");
            return StreamOutcome::Cancelled;
        }

        if let Some(outcome) = outcome {
            return outcome;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{StreamDelta, delta_stream};
    use futures_util::stream;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl StreamHandler for Recorder {
        fn on_delta(&mut self, text: &str) {
            self.calls.push(format!("delta:{text}"));
        }

        fn on_done(&mut self) {
            self.calls.push("done".into());
        }

        fn on_error(&mut self, error: &ApiError) {
            self.calls.push(format!("error:{error}"));
        }
    }

    fn chunk(content: &str) -> Result<Vec<u8>, std::io::Error> {
        Ok(format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{content}\"}}}}]}}\n").into_bytes())
    }

    #[tokio::test]
    async fn two_deltas_then_single_done_even_with_trailing_bytes() {
        let bytes = stream::iter(vec![
            chunk("one"),
            chunk("two"),
            Ok(b"data: [DONE]\n".to_vec()),
            chunk("ignored"),
        ]);
        let mut recorder = Recorder::default();

        let outcome = consume(delta_stream(bytes), &mut recorder, &CancellationToken::new()).await;

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(recorder.calls, vec!["delta:one", "delta:two", "done"]);
    }

    #[tokio::test]
    async fn transport_error_reports_error_without_done() {
        let bytes = stream::iter(vec![
            chunk("partial"),
            Err(std::io::Error::other("connection reset")),
        ]);
        let mut recorder = Recorder::default();

        let outcome = consume(delta_stream(bytes), &mut recorder, &CancellationToken::new()).await;

        assert!(matches!(outcome, StreamOutcome::Failed(ApiError::Stream(_))));
        assert_eq!(recorder.calls.len(), 2);
        assert_eq!(recorder.calls[0], "delta:partial");
        assert!(recorder.calls[1].starts_with("error:"));
    }

    #[tokio::test]
    async fn cancelled_consumer_makes_no_callbacks() {
        let token = CancellationToken::new();
        token.cancel();
        let stream: DeltaStream = Box::pin(stream::iter(vec![Ok(StreamDelta::new("x"))]));
        let mut recorder = Recorder::default();

        let outcome = consume(stream, &mut recorder, &token).await;

        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert!(recorder.calls.is_empty());
    }

    #[tokio::test]
    async fn cancellation_mid_stream_stops_further_callbacks() {
        let (tx, rx) = mpsc::channel::<Result<Vec<u8>, std::io::Error>>(4);
        let token = CancellationToken::new();
        let stream = delta_stream(tokio_stream_from(rx));

        tx.send(chunk("first")).await.unwrap();
        let consumer_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut collector = StreamCollector::new();
            let outcome = consume(stream, &mut collector, &consumer_token).await;
            (outcome, collector)
        });

        tokio::task::yield_now().await;
        token.cancel();
        let _ = tx.send(chunk("second")).await;

        let (outcome, collector) = handle.await.unwrap();
        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert!(!collector.is_done());
        assert!(collector.error().is_none());
        assert!(!collector.text().contains("second"));
    }

    fn tokio_stream_from(
        mut rx: mpsc::Receiver<Result<Vec<u8>, std::io::Error>>,
    ) -> impl futures_util::Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
        async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        }
    }

    #[tokio::test]
    async fn collector_concatenates_in_order() {
        let bytes = stream::iter(vec![chunk("a"), chunk("b"), chunk("c")]);
        let mut collector = StreamCollector::new();
        consume(delta_stream(bytes), &mut collector, &CancellationToken::new()).await;

        assert_eq!(collector.text(), "abc");
        assert_eq!(collector.delta_count(), 3);
        assert!(collector.is_done());
    }

    #[tokio::test]
    async fn channel_consumer_waits_for_a_slow_receiver() {
        let (tx, mut rx) = mpsc::channel(1);
        let bytes = stream::iter(vec![
            chunk("a"),
            chunk("b"),
            chunk("c"),
            Ok(b"data: [DONE]\n".to_vec()),
        ]);
        let consumer = tokio::spawn(async move {
            consume_into(delta_stream(bytes), tx, &CancellationToken::new()).await
        });

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            tokio::task::yield_now().await;
            received.push(event);
        }

        assert_eq!(consumer.await.unwrap(), StreamOutcome::Completed);
        assert_eq!(
            received,
            vec![
                StreamEvent::Delta("a".into()),
                StreamEvent::Delta("b".into()),
                StreamEvent::Delta("c".into()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn channel_consumer_ends_with_single_error_event() {
        let (tx, mut rx) = mpsc::channel(1);
        let bytes = stream::iter(vec![chunk("x"), Err(std::io::Error::other("reset"))]);
        let consumer = tokio::spawn(async move {
            consume_into(delta_stream(bytes), tx, &CancellationToken::new()).await
        });

        assert_eq!(rx.recv().await, Some(StreamEvent::Delta("x".into())));
        assert!(matches!(rx.recv().await, Some(StreamEvent::Error(ApiError::Stream(_)))));
        assert_eq!(rx.recv().await, None);
        assert!(matches!(consumer.await.unwrap(), StreamOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn channel_consumer_cancelled_while_receiver_is_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        let bytes = stream::iter(vec![chunk("a"), chunk("b"), chunk("c")]);
        let consumer_token = token.clone();
        let consumer = tokio::spawn(async move {
            consume_into(delta_stream(bytes), tx, &consumer_token).await
        });

        tokio::task::yield_now().await;
        token.cancel();

        assert_eq!(consumer.await.unwrap(), StreamOutcome::Cancelled);
        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert!(!received.contains(&StreamEvent::Done));
    }

    #[tokio::test]
    async fn dropped_receiver_stops_the_consumer() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let bytes = stream::iter(vec![chunk("a"), chunk("b")]);

        let outcome = consume_into(delta_stream(bytes), tx, &CancellationToken::new()).await;

        assert_eq!(outcome, StreamOutcome::Cancelled);
    }
}
