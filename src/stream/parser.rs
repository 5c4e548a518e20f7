use super::sse::SseLineBuffer;
use serde_json::Value;

/// Payload that terminates a chat completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Waiting for the next transport chunk.
    Reading,
    /// Holding a partial line or partial UTF-8 sequence.
    Buffering,
    /// Walking complete `data:` lines from the buffer.
    Emitting,
    /// Sentinel seen or stream closed; further input is ignored.
    Done,
    Errored,
}

enum Line<'a> {
    Ignored,
    Sentinel,
    Payload(&'a str),
}

fn classify(line: &str) -> Line<'_> {
    if line.is_empty() || line.starts_with(':') {
        return Line::Ignored;
    }
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Line::Ignored;
    };
    let payload = data.trim();
    if payload == DONE_SENTINEL {
        Line::Sentinel
    } else {
        Line::Payload(payload)
    }
}

/// `choices[0].delta.content`, when present and non-empty.
fn delta_content(chunk: &Value) -> Option<&str> {
    chunk
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
}

/// Incremental parser for an SSE chat completion body.
///
/// Feed raw transport chunks with [`feed`](Self::feed); each call returns the
/// content deltas completed by that chunk, in arrival order. Call
/// [`finish`](Self::finish) once the transport closes to flush leftovers.
#[derive(Debug)]
pub struct ChatStreamParser {
    lines: SseLineBuffer,
    state: ParserState,
    /// Line put back after a JSON failure. A second failure drops it.
    rebuffered: Option<String>,
}

impl Default for ChatStreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStreamParser {
    pub fn new() -> Self {
        Self {
            lines: SseLineBuffer::new(),
            state: ParserState::Reading,
            rebuffered: None,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ParserState::Done
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ParserState::Done | ParserState::Errored)
    }

    /// Mark the stream as failed. Later input is ignored.
    pub fn fail(&mut self) {
        self.state = ParserState::Errored;
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.is_terminal() {
            return deltas;
        }

        self.lines.push_chunk(chunk);
        self.state = ParserState::Buffering;

        while let Some(line) = self.lines.next_line() {
            self.state = ParserState::Emitting;
            match classify(&line) {
                Line::Ignored => {}
                Line::Sentinel => {
                    self.state = ParserState::Done;
                    return deltas;
                }
                Line::Payload(payload) => match serde_json::from_str::<Value>(payload) {
                    Ok(chunk) => {
                        self.rebuffered = None;
                        if let Some(content) = delta_content(&chunk) {
                            deltas.push(content.to_string());
                        }
                    }
                    Err(error) => {
                        if self.rebuffered.as_deref() == Some(line.as_str()) {
                            tracing::debug!("Dropping unparseable stream line: {error}");
                            self.rebuffered = None;
                            continue;
                        }
                        self.lines.unshift_line(&line);
                        self.rebuffered = Some(line.clone());
                        self.state = ParserState::Buffering;
                        return deltas;
                    }
                },
            }
        }

        self.state = if self.lines.is_empty() {
            ParserState::Reading
        } else {
            ParserState::Buffering
        };
        deltas
    }

    /// Flush buffered text after the transport closed.
    ///
    /// Leftover lines go through the same rules as [`feed`](Self::feed), but
    /// unparseable payloads are dropped rather than buffered.
    pub fn finish(&mut self) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.is_terminal() {
            return deltas;
        }

        let remaining = self.lines.take_remaining();
        for raw in remaining.split('\n') {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            match classify(line) {
                Line::Ignored => {}
                Line::Sentinel => break,
                Line::Payload(payload) => {
                    if let Ok(chunk) = serde_json::from_str::<Value>(payload)
                        && let Some(content) = delta_content(&chunk)
                    {
                        deltas.push(content.to_string());
                    }
                }
            }
        }

        self.rebuffered = None;
        self.state = ParserState::Done;
        deltas
    }
}
