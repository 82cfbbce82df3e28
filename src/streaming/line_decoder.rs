//! Newline-delimited JSON decoding
//!
//! The model server writes one JSON object per line, but the transport hands
//! us arbitrary byte chunks. [`LineDecoder`] holds the trailing partial line
//! between chunks and emits only complete lines, so the decoded sequence is
//! the same wherever the chunk boundaries fall.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use crate::error::RelayError;

/// Stream of decoded JSON lines.
pub type JsonLineStream =
    Pin<Box<dyn Stream<Item = Result<serde_json::Value, RelayError>> + Send>>;

/// Incremental byte-chunk → line decoder.
#[derive(Debug, Default, Clone)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every line completed by it.
    ///
    /// Blank lines are skipped and a trailing `\r` is stripped. Splitting
    /// happens on bytes, so a multi-byte UTF-8 character cut by a chunk
    /// boundary is reassembled before decoding.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(line) = Self::take_line(&self.pending[start..end]) {
                lines.push(line);
            }
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Flush the trailing fragment once the source has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        Self::take_line(&rest)
    }

    /// Bytes held back waiting for a line break.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn take_line(raw: &[u8]) -> Option<String> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Parse one line, `None` if it is not valid JSON.
pub fn parse_line(line: &str) -> Option<serde_json::Value> {
    match serde_json::from_str(line) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed stream line");
            None
        }
    }
}

/// Turn a byte stream into a stream of decoded JSON lines.
///
/// Lines that fail to decode are dropped and decoding continues. A transport
/// error is yielded once and ends the stream. The next chunk is only read
/// after every line from the previous one has been taken by the consumer.
pub fn decode_json_lines<S, B, E>(byte_stream: S) -> JsonLineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<RelayError> + Send + 'static,
{
    let out = async_stream::stream! {
        let mut decoder = LineDecoder::new();
        let mut byte_stream = Box::pin(byte_stream);

        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };
            for line in decoder.push(chunk.as_ref()) {
                if let Some(value) = parse_line(&line) {
                    yield Ok(value);
                }
            }
        }

        if let Some(line) = decoder.finish() {
            if let Some(value) = parse_line(&line) {
                yield Ok(value);
            }
        }
    };

    Box::pin(out)
}
