use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::debug;

use super::FrameStream;
use crate::RelayError;

/// One dispatched Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type; `"message"` unless the server set one.
    pub event: String,
    pub data: String,
    /// Last event id seen on the stream, if any.
    pub id: Option<String>,
}

impl SseEvent {
    /// True for events of the default `message` type.
    pub fn is_message(&self) -> bool {
        self.event == "message"
    }
}

/// Incremental `text/event-stream` decoder.
///
/// Feed it bytes as they arrive; chunks may split lines, fields or UTF-8
/// sequences anywhere. Lines may end in `\n`, `\r\n` or `\r`.
///
/// ```
/// use streampulse_relay::transport::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// assert!(decoder.feed(b"data: {\"a\":").is_empty());
/// let events = decoder.feed(b"1}\n\n");
/// assert_eq!(events[0].data, "{\"a\":1}");
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: String,
    has_data: bool,
    event: Option<String>,
    last_id: Option<String>,
    retry: Option<Duration>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconnection delay most recently requested by the server.
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    /// Decode `chunk` and return every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        let mut i = 0;
        while i < self.buf.len() {
            let byte = self.buf[i];
            if byte != b'\n' && byte != b'\r' {
                i += 1;
                continue;
            }

            let mut next = i + 1;
            if byte == b'\r' {
                // A trailing CR may be the first half of CRLF
                if next == self.buf.len() {
                    break;
                }
                if self.buf[next] == b'\n' {
                    next += 1;
                }
            }

            let line = String::from_utf8_lossy(&self.buf[start..i]).into_owned();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
            start = next;
            i = next;
        }

        self.buf.drain(..start);
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
                self.has_data = true;
            }
            "event" => self.event = Some(value.to_string()),
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;

        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }

        Some(SseEvent {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "message".to_string()),
            data,
            id: self.last_id.clone(),
        })
    }
}

/// Turn a stream of byte chunks into frames holding the data of each
/// `message` event. Events of other types are skipped.
pub fn sse_frames<S, B, E>(chunks: S) -> FrameStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    struct State<S> {
        chunks: std::pin::Pin<Box<S>>,
        decoder: SseDecoder,
        pending: VecDeque<String>,
        done: bool,
    }

    let state = State {
        chunks: Box::pin(chunks),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(data) = state.pending.pop_front() {
                return Some((Ok(data), state));
            }
            if state.done {
                return None;
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    for event in state.decoder.feed(chunk.as_ref()) {
                        if event.is_message() {
                            state.pending.push_back(event.data);
                        } else {
                            debug!(event = %event.event, "skipping non-message event");
                        }
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(RelayError::Transport(e.to_string())), state));
                }
                None => {
                    state.done = true;
                    return Some((Err(RelayError::Closed), state));
                }
            }
        }
    })
    .boxed()
}

pub(super) async fn open(client: &reqwest::Client, url: &str) -> Result<FrameStream, RelayError> {
    let response = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
        .map_err(|e| RelayError::connect(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::HttpStatus {
            address: url.to_string(),
            status: status.as_u16(),
        });
    }

    Ok(sse_frames(response.bytes_stream()))
}
