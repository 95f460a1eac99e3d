// src/core/sse/parser.rs

//! The incremental text/event-stream parser.
//!
//! Bytes arrive in arbitrary chunk boundaries; the parser buffers until a
//! blank line terminates a record, then yields the record's `event`, `data`
//! (multiple lines joined with `\n`), and `id` fields.

use serde_json::Value;

use super::events::MapEvent;
use crate::core::SyncError;

/// One complete frame, before JSON decoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl RawSseEvent {
    /// JSON-decodes the accumulated data and overlays the frame fields.
    pub fn decode(&self) -> Result<MapEvent, SyncError> {
        let body: Value = serde_json::from_str(&self.data)?;
        MapEvent::decode(body, self.event.as_deref(), self.id.as_deref())
    }
}

/// Buffering parser; one instance per connection.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Default::default()
    }

    /// Feeds a chunk of bytes and returns every record completed by it.
    /// Invalid UTF-8 is replaced rather than aborting the stream.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RawSseEvent> {
        self.buffer
            .push_str(&String::from_utf8_lossy(chunk).replace("\r\n", "\n"));

        let mut events = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..boundary + 2).collect();
            if let Some(event) = parse_block(block.trim_end_matches('\n')) {
                events.push(event);
            }
        }
        events
    }

    /// Bytes currently buffered awaiting a record terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Parses one blank-line-delimited block. Lines that do not match
/// `^(event|data|id): (.*)$` are ignored; a block with no data yields
/// nothing (keep-alive comments arrive this way).
fn parse_block(block: &str) -> Option<RawSseEvent> {
    let mut event = RawSseEvent::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if let Some(value) = line.strip_prefix("event: ") {
            event.event = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("data: ") {
            data_lines.push(value);
        } else if let Some(value) = line.strip_prefix("id: ") {
            event.id = Some(value.to_string());
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    event.data = data_lines.join("\n");
    Some(event)
}
