//! Server-Sent Events (SSE) decoding for Query Agent streams.
//!
//! Decoding happens in two layers:
//!
//! 1. [`SseDecoder`] turns arbitrary byte chunks into complete SSE frames
//!    (`event:` tag plus joined `data:` lines). Chunk boundaries may fall
//!    anywhere, including inside a UTF-8 sequence or a `\r\n` pair.
//! 2. [`EventDecoder`] maps frames onto [`StreamEvent`]s and tracks whether
//!    the exchange has reached a terminal event.
//!
//! Both layers are synchronous and do no I/O, so the async and blocking
//! clients share them unchanged.

use serde::de::DeserializeOwned;

use crate::error::{AgentError, Result};
use crate::types::{
    AggregationUpdate, ExchangeState, FinalState, ProgressMessage, StreamEvent, StreamedTokens,
};

/// SSE `event:` tags used by the agents service.
pub mod event_types {
    /// Status update: `{"message": ..., "details": ...}`.
    pub const PROGRESS_MESSAGE: &str = "progress_message";
    /// Answer fragment: `{"delta": ...}`.
    pub const STREAMED_TOKENS: &str = "streamed_tokens";
    /// Intermediate aggregation result.
    pub const AGGREGATION_RESULT: &str = "aggregation_result";
    /// Terminal payload.
    pub const FINAL_STATE: &str = "final_state";
    /// Service-reported failure.
    pub const ERROR: &str = "error";
    /// Tag of frames that carry no `event:` line.
    pub const MESSAGE: &str = "message";
}

// ---------------------------------------------------------------------------
// Frame layer
// ---------------------------------------------------------------------------

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if present.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// Value of the `id:` field, if present.
    pub id: Option<String>,
}

/// Incremental SSE frame parser.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across chunks are reassembled before decoding.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    has_fields: bool,
}

impl SseDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            let line = strip_cr(&self.buffer[start..end]);
            let line = String::from_utf8_lossy(line).into_owned();
            start = end + 1;

            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        self.buffer.drain(..start);
        frames
    }

    /// Flush at end of input.
    ///
    /// A trailing line without a newline is processed, and a frame that was
    /// never terminated by a blank line is dispatched.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(strip_cr(&rest)).into_owned();
            if let Some(frame) = self.process_line(&line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
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
            "event" => {
                self.event = Some(value.to_string());
                self.has_fields = true;
            }
            "data" => {
                self.data.push(value.to_string());
                self.has_fields = true;
            }
            "id" => {
                self.id = Some(value.to_string());
                self.has_fields = true;
            }
            // `retry:` and unknown fields carry nothing we act on.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if !self.has_fields {
            return None;
        }
        self.has_fields = false;
        Some(SseFrame {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.id.take(),
        })
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

// ---------------------------------------------------------------------------
// Event layer
// ---------------------------------------------------------------------------

/// Decodes a byte stream into Query Agent events.
///
/// Items are either events or errors:
///
/// - a malformed non-final block yields a non-fatal [`AgentError::Decode`]
///   and decoding continues
/// - an `error` block yields [`AgentError::Remote`] and ends the exchange
/// - a malformed `final_state` block yields [`AgentError::Protocol`]
/// - input ending before a `final_state` yields [`AgentError::Protocol`]
///
/// Nothing is yielded after a terminal item.
#[derive(Debug)]
pub struct EventDecoder {
    frames: SseDecoder,
    state: ExchangeState,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder {
    /// Create a decoder for a freshly opened stream.
    pub fn new() -> Self {
        Self {
            frames: SseDecoder::new(),
            state: ExchangeState::Streaming,
        }
    }

    /// Current exchange state.
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Whether a terminal item has been produced.
    pub fn is_terminated(&self) -> bool {
        self.state.is_terminal()
    }

    /// Feed a chunk of the response body.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent>> {
        if self.is_terminated() {
            return Vec::new();
        }
        let frames = self.frames.feed(chunk);
        self.decode_frames(frames)
    }

    /// Signal end of input.
    pub fn finish(&mut self) -> Vec<Result<StreamEvent>> {
        if self.is_terminated() {
            return Vec::new();
        }
        let mut items = match self.frames.finish() {
            Some(frame) => self.decode_frames(vec![frame]),
            None => Vec::new(),
        };
        if !self.is_terminated() {
            self.state = ExchangeState::Failed;
            items.push(Err(AgentError::protocol(
                "stream ended without a final_state event",
            )));
        }
        items
    }

    /// Mark the exchange failed, e.g. after a transport error.
    pub fn fail(&mut self) {
        self.state = ExchangeState::Failed;
    }

    fn decode_frames(&mut self, frames: Vec<SseFrame>) -> Vec<Result<StreamEvent>> {
        let mut items = Vec::with_capacity(frames.len());
        for frame in frames {
            if self.is_terminated() {
                break;
            }
            if let Some(item) = decode_frame(frame) {
                match &item {
                    Ok(StreamEvent::Final(_)) => self.state = ExchangeState::Completed,
                    Err(err) if err.is_fatal() => self.state = ExchangeState::Failed,
                    _ => {}
                }
                items.push(item);
            }
        }
        items
    }
}

fn decode_frame(frame: SseFrame) -> Option<Result<StreamEvent>> {
    if frame.event.is_none() && frame.data.trim().is_empty() {
        return None;
    }
    let tag = frame.event.as_deref().unwrap_or(event_types::MESSAGE);

    let item = match tag {
        event_types::PROGRESS_MESSAGE => {
            decode_payload::<ProgressMessage>(tag, &frame.data).map(StreamEvent::Status)
        }
        event_types::STREAMED_TOKENS => {
            decode_payload::<StreamedTokens>(tag, &frame.data).map(StreamEvent::Progress)
        }
        event_types::AGGREGATION_RESULT => {
            decode_payload::<AggregationUpdate>(tag, &frame.data).map(StreamEvent::Aggregation)
        }
        event_types::FINAL_STATE => match serde_json::from_str::<FinalState>(&frame.data) {
            Ok(state) => Ok(StreamEvent::Final(Box::new(state))),
            Err(e) => Err(AgentError::Protocol {
                message: format!("malformed final_state event: {e}"),
                raw: Some(frame.data),
            }),
        },
        event_types::ERROR => Err(AgentError::from_error_event(&frame.data)),
        other => {
            tracing::debug!(event = other, "unrecognised event tag, surfacing as status");
            let details = serde_json::from_str(&frame.data)
                .unwrap_or_else(|_| serde_json::Value::String(frame.data.clone()));
            Ok(StreamEvent::Status(ProgressMessage {
                message: other.to_string(),
                details,
            }))
        }
    };
    Some(item)
}

fn decode_payload<T: DeserializeOwned>(event: &str, data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| AgentError::Decode {
        event: event.to_string(),
        message: e.to_string(),
        raw: data.to_string(),
    })
}
