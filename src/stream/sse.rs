/// Incremental UTF-8 decoder.
///
/// A multi-byte character split across two transport chunks is held back
/// until its remaining bytes arrive. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        // Truncated sequence at the end: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is still held back at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Newline-framed text buffer fed with raw transport bytes.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    decoder: Utf8StreamDecoder,
    buffer: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        let text = self.decoder.decode(chunk);
        self.buffer.push_str(&text);
    }

    /// Next complete line without its `\n` (and trailing `\r`, if any).
    pub fn next_line(&mut self) -> Option<String> {
        let newline = self.buffer.find('\n')?;
        let remaining = self.buffer.split_off(newline + 1);
        let mut line = std::mem::replace(&mut self.buffer, remaining);
        line.truncate(newline);
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }

    /// Put a line back at the front, newline restored.
    pub fn unshift_line(&mut self, line: &str) {
        let mut restored = String::with_capacity(line.len() + 1 + self.buffer.len());
        restored.push_str(line);
        restored.push('\n');
        restored.push_str(&self.buffer);
        self.buffer = restored;
    }

    /// Drain everything left, including bytes still held by the decoder.
    pub fn take_remaining(&mut self) -> String {
        let tail = self.decoder.finish();
        self.buffer.push_str(&tail);
        std::mem::take(&mut self.buffer)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && !self.decoder.has_pending()
    }
}
