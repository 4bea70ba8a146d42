//! SSE Progress Adapter
//!
//! Handles the `text/event-stream` format of the backend's progress channel:
//! `data: {"type": "url_success", "progress_percent": 40}` lines, plus the
//! usual SSE noise (comments, `event:`/`id:`/`retry:` fields, blank lines).

use seo_pipeline_core::progress::{AdapterError, ProgressEvent, ProgressStreamAdapter};
use serde_json::Value;

const KNOWN_EVENT_TYPES: [&str; 9] = [
    "stage_start",
    "stage_complete",
    "batch_start",
    "url_start",
    "url_success",
    "url_failed",
    "parsing_complete",
    "complete",
    "error",
];

/// Adapter for the backend's SSE progress format
#[derive(Debug, Default)]
pub struct SseProgressAdapter {
    /// Set once a terminal event was produced; later lines are ignored
    finished: bool,
}

impl SseProgressAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl ProgressStreamAdapter for SseProgressAdapter {
    fn transport_name(&self) -> &'static str {
        "sse"
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<ProgressEvent>, AdapterError> {
        if self.finished {
            return Ok(vec![]);
        }

        let trimmed = input.trim();
        let json_str = if let Some(rest) = trimmed.strip_prefix("data:") {
            rest.trim_start()
        } else if trimmed.starts_with('{') {
            trimmed
        } else {
            // event:, id:, retry:, comments, empty
            return Ok(vec![]);
        };

        if json_str.is_empty() || json_str == "[DONE]" {
            return Ok(vec![]);
        }

        let raw: Value =
            serde_json::from_str(json_str).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        let event_type = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::InvalidFormat("missing event type".to_string()))?;

        if !KNOWN_EVENT_TYPES.contains(&event_type) {
            return Err(AdapterError::UnsupportedEvent(event_type.to_string()));
        }

        let event: ProgressEvent =
            serde_json::from_value(raw).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        if event.is_terminal() {
            self.finished = true;
        }
        Ok(vec![event])
    }

    fn reset(&mut self) {
        self.finished = false;
    }
}

/// Splits a byte stream into lines. Bytes after the last newline are kept
/// raw until the next chunk, so a multi-byte character split across chunks
/// decodes intact.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, without the
    /// trailing `\n` / `\r\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw[..end]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }
}
