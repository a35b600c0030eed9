//! Converts the provider's `data:` line stream into relay [`StreamEvent`]s.

use chat_protocol::{data_payload, LineBuffer, StreamEvent};
use serde_json::Value;
use tracing::{debug, warn};

/// Upstream completion sentinel. Consumed here, never forwarded.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Where a text delta may live in a chunk, tried in order. Providers differ:
/// OpenAI-style streams use `delta`, some proxies send whole `message`
/// objects, and a few send a bare `content`.
pub const DELTA_POINTERS: [&str; 3] = [
    "/choices/0/delta/content",
    "/choices/0/message/content",
    "/content",
];

const FINISH_REASON_POINTER: &str = "/choices/0/finish_reason";

/// Returns the first non-empty string found along [`DELTA_POINTERS`].
pub fn extract_delta(chunk: &Value) -> Option<&str> {
    DELTA_POINTERS
        .iter()
        .filter_map(|pointer| chunk.pointer(pointer).and_then(Value::as_str))
        .find(|delta| !delta.is_empty())
}

/// Incremental re-framer for one upstream response.
///
/// Feed it raw body chunks as they arrive; it returns the events to forward
/// and keeps the full assistant text for persistence.
#[derive(Debug)]
pub struct Reframer {
    conversation_id: String,
    lines: LineBuffer,
    text: String,
    finished: bool,
    finish_reason: Option<String>,
}

impl Reframer {
    pub fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            lines: LineBuffer::new(),
            text: String::new(),
            finished: false,
            finish_reason: None,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let lines = self.lines.push(chunk);
        self.process(lines)
    }

    /// Processes a final line the provider did not terminate.
    pub fn flush(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let rest = self.lines.finish();
        self.process(rest.into_iter().collect())
    }

    /// True once the provider sent `[DONE]`.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    fn process(&mut self, lines: Vec<String>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for line in lines {
            let Some(payload) = data_payload(&line) else {
                continue;
            };
            if payload == DONE_SENTINEL {
                events.push(StreamEvent::Done);
                self.finished = true;
                self.lines.clear();
                break;
            }
            if let Some(delta) = self.parse_chunk(payload) {
                self.text.push_str(&delta);
                events.push(StreamEvent::Token { value: delta });
            }
        }
        events
    }

    fn parse_chunk(&mut self, payload: &str) -> Option<String> {
        if payload.is_empty() {
            return None;
        }
        let chunk: Value = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) if payload.starts_with('{') => {
                warn!(
                    conversation_id = %self.conversation_id,
                    error = %e,
                    payload,
                    "Failed to parse upstream chunk"
                );
                return None;
            }
            Err(_) => {
                debug!(conversation_id = %self.conversation_id, payload, "Ignoring non-JSON upstream line");
                return None;
            }
        };

        if let Some(reason) = chunk.pointer(FINISH_REASON_POINTER).and_then(Value::as_str) {
            if reason != "stop" {
                warn!(
                    conversation_id = %self.conversation_id,
                    finish_reason = reason,
                    "Unexpected finish reason from AI provider"
                );
            }
            self.finish_reason = Some(reason.to_string());
        }

        extract_delta(&chunk).map(str::to_string)
    }
}
