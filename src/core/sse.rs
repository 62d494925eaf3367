//! Decoding of the chat stream wire format.
//!
//! The backend answers `POST /api/chat/stream` with newline-delimited text.
//! Lines of the form `data: {json}` carry one payload each; everything else
//! (blank separators, comments, keep-alives) is ignored. Network reads are
//! not aligned to lines, so bytes are buffered until a newline arrives.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use memchr::memchr;
use serde::Deserialize;
use tracing::warn;

const DATA_PREFIX: &str = "data: ";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Content(String),
    Done { session_id: String },
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Content(_))
    }
}

#[derive(Deserialize)]
struct StreamPayload {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl StreamPayload {
    fn into_event(self) -> Option<StreamEvent> {
        // Precedence matches the web client: content, then done, then error.
        if let Some(content) = self.content.filter(|text| !text.is_empty()) {
            return Some(StreamEvent::Content(content));
        }
        if self.done.unwrap_or(false) {
            return Some(StreamEvent::Done {
                session_id: self.session_id.unwrap_or_default(),
            });
        }
        match self.error {
            Some(serde_json::Value::String(text)) => Some(StreamEvent::Error(text)),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(StreamEvent::Error(error_summary(&other))),
        }
    }
}

fn error_summary(value: &serde_json::Value) -> String {
    value
        .get("message")
        .and_then(|message| message.as_str())
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_else(|| value.to_string())
}

/// Parse a single decoded line.
///
/// Returns `None` for lines that carry no event: anything without the
/// `data: ` prefix, blank lines, unparseable JSON, and payloads without a
/// recognised field. Malformed payloads are logged and skipped.
pub fn parse_event_line(line: &str) -> Option<StreamEvent> {
    if line.trim().is_empty() {
        return None;
    }
    let payload = line.strip_prefix(DATA_PREFIX)?;

    match serde_json::from_str::<StreamPayload>(payload) {
        Ok(parsed) => {
            let event = parsed.into_event();
            if event.is_none() {
                tracing::debug!(line, "stream payload carried no event");
            }
            event
        }
        Err(err) => {
            warn!(line, error = %err, "skipping malformed stream payload");
            None
        }
    }
}

/// Byte accumulator that yields complete lines across chunk boundaries.
#[derive(Default, Debug)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Pop the next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let newline_pos = memchr(b'\n', &self.buffer)?;
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(text) = decode_line(&line[..newline_pos]) {
                return Some(text);
            }
        }
    }

    /// Flush whatever remains once the transport has closed.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    match std::str::from_utf8(raw) {
        Ok(text) => Some(text.to_string()),
        Err(err) => {
            warn!(error = %err, "invalid UTF-8 in stream line");
            None
        }
    }
}

/// Lazily turns a byte stream into an ordered stream of [`StreamEvent`]s.
///
/// Transport errors are passed through unchanged; the caller decides
/// whether they end the exchange.
pub struct EventStream<S> {
    inner: S,
    lines: LineBuffer,
    exhausted: bool,
}

impl<S> EventStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            lines: LineBuffer::new(),
            exhausted: false,
        }
    }
}

impl<S, E> Stream for EventStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<StreamEvent, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            while let Some(line) = this.lines.next_line() {
                if let Some(event) = parse_event_line(&line) {
                    return Poll::Ready(Some(Ok(event)));
                }
            }

            if this.exhausted {
                return Poll::Ready(
                    this.lines
                        .finish()
                        .and_then(|line| parse_event_line(&line))
                        .map(Ok),
                );
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.lines.push(&chunk),
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => this.exhausted = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
