//! Streaming chat replies: SSE framing, delta parsing and consumption.

pub mod client;
pub mod consumer;
pub mod parser;
pub mod sse;

pub use client::{CHAT_FUNCTION, ChatStreamClient, StreamChatRequest};
pub use consumer::{
    StreamCollector, StreamEvent, StreamHandler, StreamOutcome, consume, consume_into,
};
pub use parser::{ChatStreamParser, DONE_SENTINEL, ParserState};
pub use sse::{SseLineBuffer, Utf8StreamDecoder};

use crate::error::ApiError;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;

/// One fragment of assistant text. The reply is the in-order concatenation
/// of every delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDelta {
    pub text: String,
}

impl StreamDelta {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, ApiError>> + Send + 'static>>;

/// Turn a raw byte stream into a pull-based stream of deltas.
///
/// The stream ends after the `[DONE]` sentinel without reading further
/// bytes, or after the transport closes and leftovers are flushed. A
/// transport error is yielded once and ends the stream.
pub fn delta_stream<S, B, E>(bytes: S) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut parser = ChatStreamParser::new();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for text in parser.feed(chunk.as_ref()) {
                        yield Ok(StreamDelta { text });
                    }
                    if parser.is_done() {
                        return;
                    }
                }
                Err(error) => {
                    parser.fail();
                    yield Err(ApiError::Stream(error.to_string()));
                    return;
                }
            }
        }

        for text in parser.finish() {
            yield Ok(StreamDelta { text });
        }
    };
    Box::pin(stream)
}
