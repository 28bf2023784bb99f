//! Server-Sent Events (SSE) stream parser.
//!
//! Parses a byte stream into SSE events. Lines are split on raw bytes so a
//! multi-byte character cut across two network chunks decodes intact.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type (from `event:` field). None if not specified.
    pub event_type: Option<String>,
    /// The event data (from `data:` field(s)).
    pub data: String,
}

#[derive(Default)]
struct SseParserState {
    /// Bytes of the current, not yet terminated line.
    line_buf: Vec<u8>,
    current_event_type: Option<String>,
    current_data: Vec<String>,
}

impl SseParserState {
    /// Process a complete line. Returns an event if one is complete.
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        // Empty line signals end of event
        if line.is_empty() {
            return self.take_event();
        }

        if let Some((field, value)) = line.split_once(':') {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => self.current_event_type = Some(value.to_string()),
                "data" => self.current_data.push(value.to_string()),
                // id, retry and comments
                _ => {}
            }
        }

        None
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            return None;
        }
        let event = SseEvent {
            event_type: self.current_event_type.take(),
            data: self.current_data.join("\n"),
        };
        self.current_data.clear();
        Some(event)
    }

    fn feed(&mut self, bytes: &[u8], out: &mut VecDeque<SseEvent>) {
        for &b in bytes {
            if b == b'\n' {
                let raw = std::mem::take(&mut self.line_buf);
                let line = String::from_utf8_lossy(&raw);
                let line = line.strip_suffix('\r').unwrap_or(&line);
                if let Some(event) = self.process_line(line) {
                    out.push_back(event);
                }
            } else {
                self.line_buf.push(b);
            }
        }
    }

    fn finish(&mut self) -> Option<SseEvent> {
        if !self.line_buf.is_empty() {
            let raw = std::mem::take(&mut self.line_buf);
            let line = String::from_utf8_lossy(&raw).into_owned();
            if let Some(event) = self.process_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.take_event()
    }
}

/// Stream wrapper that parses SSE events from a byte stream.
pub struct SseStream<S> {
    inner: S,
    state: SseParserState,
    pending_events: VecDeque<SseEvent>,
    finished: bool,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: SseParserState::default(),
            pending_events: VecDeque::new(),
            finished: false,
        }
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<SseEvent, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(event) = this.pending_events.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.state.feed(&bytes, &mut this.pending_events);
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => {
                    this.finished = true;
                    if let Some(event) = this.state.finish() {
                        this.pending_events.push_back(event);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Create an SSE stream from a byte stream.
pub fn parse_sse_stream<S, E>(stream: S) -> SseStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    SseStream::new(stream)
}
