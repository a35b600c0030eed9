//! Wire types shared by the relay server and the browser client.
//!
//! The relay answers `POST /api/chat` with a `text/event-stream` body made of
//! `data: <json>\n\n` frames, each carrying one [`StreamEvent`]. Errors raised
//! before the stream opens are plain JSON [`ErrorBody`] responses.

mod lines;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use lines::LineBuffer;

/// Message carried by the `error` event when the provider produced no text.
pub const EMPTY_RESPONSE_MESSAGE: &str = "AI returned empty response";

const KNOWN_EVENT_TYPES: [&str; 4] = ["conversation", "token", "done", "error"];

/// One frame of the relay's event stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Sent first, so a client can adopt a freshly created conversation id.
    Conversation {
        #[serde(rename = "conversationId")]
        conversation_id: String,
    },
    Token { value: String },
    Done,
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("frame has no \"type\" discriminant")]
    MissingType,
}

/// Body of `POST /api/chat`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// `None` when absent or `null`; the relay rejects it like a blank one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Body of `POST /api/chat/reset`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    #[serde(default)]
    pub conversation_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResetResponse {
    pub ok: bool,
}

/// JSON error payload returned before any stream is opened.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into(), ..Self::default() }
    }
}

/// Returns the payload of an SSE `data:` line, or `None` for any other line.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Decodes one event payload.
///
/// Unknown discriminants yield `Ok(None)` so newer servers can add event
/// types without breaking older clients.
pub fn decode_event(payload: &str) -> Result<Option<StreamEvent>, ProtocolError> {
    let value: Value = serde_json::from_str(payload)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;
    if !KNOWN_EVENT_TYPES.contains(&kind) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value)?))
}

/// Decodes a full stream line; lines that are not `data:` frames are skipped.
pub fn decode_line(line: &str) -> Result<Option<StreamEvent>, ProtocolError> {
    match data_payload(line) {
        Some(payload) if !payload.is_empty() => decode_event(payload),
        _ => Ok(None),
    }
}
