//! Server-Sent Events framing and payload extraction.
//!
//! The backend streams channel contents as `text/event-stream`. Each frame
//! carries an optional `event:` name and one or more `data:` lines; a blank
//! line dispatches the frame. Data is either a JSON document in a
//! `{"path": .., "data": ..}` envelope or a bare JSON value.

use crate::{MonaError, Result};
use bytes::BytesMut;
use serde_json::Value;
use tracing::warn;

/// Event name the server uses to keep an idle stream alive.
pub const EVENT_KEEP_ALIVE: &str = "keep-alive";
/// Event name sent when the server cancels the subscription.
pub const EVENT_CANCEL: &str = "cancel";
/// Event name sent when the server revokes the subscription's credentials.
pub const EVENT_AUTH_REVOKED: &str = "auth_revoked";

/// One dispatched SSE frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// Frame with data only.
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    /// Named frame.
    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
        }
    }

    pub fn is_keep_alive(&self) -> bool {
        self.event.as_deref() == Some(EVENT_KEEP_ALIVE)
    }

    /// Frames after which the server will not send anything else.
    pub fn is_server_close(&self) -> bool {
        matches!(
            self.event.as_deref(),
            Some(EVENT_CANCEL) | Some(EVENT_AUTH_REVOKED)
        )
    }
}

/// Incremental SSE decoder over arbitrary chunk boundaries.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            event: None,
            data: Vec::new(),
        }
    }

    /// Feed a chunk; returns every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line_bytes = self.buffer.split_to(newline_pos + 1);
            line_bytes.truncate(line_bytes.len() - 1);
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.truncate(line_bytes.len() - 1);
            }

            let line = match std::str::from_utf8(&line_bytes) {
                Ok(s) => s,
                Err(_) => {
                    warn!("Dropping SSE line with invalid UTF-8");
                    continue;
                }
            };

            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Flush a trailing frame when the stream ends without a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            if let Ok(line) = std::str::from_utf8(&rest) {
                let line = line.trim_end_matches('\r').to_string();
                if let Some(frame) = self.process_line(&line) {
                    return Some(frame);
                }
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
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id and retry carry nothing the client acts on
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if event.is_none() && self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data })
    }
}

/// Payload delivered to a channel's `on_event` callback.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelPayload {
    /// Payload that arrived as a JSON string.
    Text(String),
    /// Structured payload.
    Json(Value),
}

impl ChannelPayload {
    /// Structured view of the payload. Text that holds JSON is parsed.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value.clone()),
            Self::Text(text) => serde_json::from_str(text).ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }
}

/// Interpret a frame's data.
///
/// Returns `Ok(None)` for empty or null payloads, which are not delivered.
pub fn extract_payload(data: &str) -> Result<Option<ChannelPayload>> {
    let trimmed = data.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| MonaError::Parse(format!("channel data is not JSON: {}", e)))?;

    let inner = match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };

    Ok(match inner {
        Value::Null => None,
        Value::String(text) if text.is_empty() || text == "null" => None,
        Value::String(text) => Some(ChannelPayload::Text(text)),
        other => Some(ChannelPayload::Json(other)),
    })
}
