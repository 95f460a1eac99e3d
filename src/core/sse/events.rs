// src/core/sse/events.rs

//! The SSE event envelope, its validation rules, and the routing categories.

use crate::core::SyncError;
use serde_json::Value;

/// The default set of event types requested from the stream.
pub const DEFAULT_EVENT_FILTER: [&str; 6] = [
    "add_system",
    "deleted_system",
    "connection_added",
    "connection_removed",
    "connection_updated",
    "system_metadata_changed",
];

/// The known event types, plus a catch-all for everything the service
/// ignores rather than rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    AddSystem,
    DeletedSystem,
    SystemMetadataChanged,
    ConnectionAdded,
    ConnectionUpdated,
    ConnectionRemoved,
    Connected,
    MapKill,
    Other(String),
}

impl EventKind {
    pub fn parse(value: &str) -> Self {
        match value {
            "add_system" => EventKind::AddSystem,
            "deleted_system" => EventKind::DeletedSystem,
            "system_metadata_changed" => EventKind::SystemMetadataChanged,
            "connection_added" => EventKind::ConnectionAdded,
            "connection_updated" => EventKind::ConnectionUpdated,
            "connection_removed" => EventKind::ConnectionRemoved,
            "connected" => EventKind::Connected,
            "map_kill" => EventKind::MapKill,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::AddSystem => "add_system",
            EventKind::DeletedSystem => "deleted_system",
            EventKind::SystemMetadataChanged => "system_metadata_changed",
            EventKind::ConnectionAdded => "connection_added",
            EventKind::ConnectionUpdated => "connection_updated",
            EventKind::ConnectionRemoved => "connection_removed",
            EventKind::Connected => "connected",
            EventKind::MapKill => "map_kill",
            EventKind::Other(name) => name,
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            EventKind::AddSystem | EventKind::DeletedSystem | EventKind::SystemMetadataChanged => {
                EventCategory::System
            }
            EventKind::ConnectionAdded
            | EventKind::ConnectionUpdated
            | EventKind::ConnectionRemoved => EventCategory::Connection,
            EventKind::Connected | EventKind::MapKill => EventCategory::Special,
            EventKind::Other(_) => EventCategory::Other,
        }
    }
}

/// Routing buckets: system and connection events go to the map topic,
/// special events are handled in place, the rest are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    System,
    Connection,
    Special,
    Other,
}

/// A validated inbound event.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEvent {
    pub id: String,
    pub kind: EventKind,
    pub map_id: String,
    /// ISO-8601; absent on `connected`, which carries `server_time` instead.
    pub timestamp: Option<String>,
    pub server_time: Option<String>,
    pub payload: Option<Value>,
}

fn required_str(body: &Value, field: &'static str) -> Result<String, SyncError> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(SyncError::MissingField(field))
}

impl MapEvent {
    /// Decodes the JSON body of an SSE record, overlaying the `event:` and
    /// `id:` fields from the frame, then validates the required fields for
    /// the event's type. A failed validation discards the event.
    pub fn decode(
        body: Value,
        frame_event: Option<&str>,
        frame_id: Option<&str>,
    ) -> Result<Self, SyncError> {
        let type_name = match frame_event {
            Some(name) => name.to_string(),
            None => required_str(&body, "type")?,
        };
        let kind = EventKind::parse(&type_name);

        let id = match frame_id {
            Some(id) => id.to_string(),
            None => required_str(&body, "id")?,
        };
        let map_id = required_str(&body, "map_id")?;

        if kind == EventKind::Connected {
            let server_time = required_str(&body, "server_time")?;
            return Ok(Self {
                id,
                kind,
                map_id,
                timestamp: None,
                server_time: Some(server_time),
                payload: None,
            });
        }

        let timestamp = required_str(&body, "timestamp")?;
        let payload = body
            .get("payload")
            .cloned()
            .ok_or(SyncError::MissingField("payload"))?;

        Ok(Self {
            id,
            kind,
            map_id,
            timestamp: Some(timestamp),
            server_time: None,
            payload: Some(payload),
        })
    }
}
