// src/core/map/types.rs

//! The topology data model: map records, systems, connections, and the
//! per-map view container.

use crate::core::SyncError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// `status` value marking a map's home system.
pub const HOME_STATUS: i64 = 1;

/// The label toggled on border systems.
pub const BORDER_LABEL: &str = "c";

/// Identity of a topology shard, as served by the map CRUD facade.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MapRecord {
    pub id: String,
    /// Stable identity; also the pub/sub topic for the map's events.
    pub url: String,
    pub public_api_key: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_main: bool,
    #[serde(default)]
    pub main_system_eve_id: Option<i64>,
}

/// A node of the topology.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct System {
    pub solar_system_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position_x: f64,
    #[serde(default)]
    pub position_y: f64,
    #[serde(default)]
    pub status: i64,
    /// JSON-encoded `{"labels": [string]}` or absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
    /// Opaque enrichment blob overlaid by the topology pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_info: Option<Value>,
    #[serde(default)]
    pub is_border: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub border_maps: Vec<String>,
    /// The owning map, stamped onto filtered-view systems.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_id: Option<String>,
}

impl System {
    /// Extracts a system from an event payload. System events nest the
    /// attributes under a second `payload` key; both shapes are accepted.
    pub fn from_payload(payload: &Value) -> Result<Self, SyncError> {
        let attrs = payload.get("payload").unwrap_or(payload);
        serde_json::from_value(attrs.clone())
            .map_err(|e| SyncError::SchemaMismatch(format!("system payload: {e}")))
    }

    /// Merges the fields present in `patch` over this system. Identity and
    /// derived fields are left alone.
    pub fn merge(&mut self, patch: &Value) {
        let attrs = patch.get("payload").unwrap_or(patch);
        let Some(object) = attrs.as_object() else {
            return;
        };
        if let Some(name) = object.get("name").and_then(Value::as_str) {
            self.name = name.to_string();
        }
        if let Some(x) = object.get("position_x").and_then(Value::as_f64) {
            self.position_x = x;
        }
        if let Some(y) = object.get("position_y").and_then(Value::as_f64) {
            self.position_y = y;
        }
        if let Some(status) = object.get("status").and_then(Value::as_i64) {
            self.status = status;
        }
        if let Some(labels) = object.get("labels") {
            self.labels = labels.as_str().map(str::to_string);
        }
    }

    /// The serialized form sent when upserting across maps: positions are
    /// strictly per-map and never copied from the source.
    pub fn to_upsert_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(object) = value.as_object_mut() {
            object.remove("position_x");
            object.remove("position_y");
        }
        value
    }

    /// The decoded label list, tolerating an absent or malformed blob.
    pub fn labels_vec(&self) -> Vec<String> {
        self.labels
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .and_then(|decoded| {
                decoded
                    .get("labels")
                    .and_then(Value::as_array)
                    .map(|labels| {
                        labels
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
            })
            .unwrap_or_default()
    }

    fn write_labels(&mut self, labels: Vec<String>) {
        self.labels = Some(json!({ "labels": labels }).to_string());
    }

    /// Adds `label` to the label set. Returns whether anything changed.
    pub fn add_label(&mut self, label: &str) -> bool {
        let mut labels = self.labels_vec();
        if labels.iter().any(|l| l == label) {
            return false;
        }
        labels.push(label.to_string());
        self.write_labels(labels);
        true
    }

    /// Removes `label` from the label set. Returns whether anything changed.
    pub fn remove_label(&mut self, label: &str) -> bool {
        let mut labels = self.labels_vec();
        let before = labels.len();
        labels.retain(|l| l != label);
        if labels.len() == before {
            return false;
        }
        self.write_labels(labels);
        true
    }
}

/// An undirected edge, keyed by the unordered endpoint pair.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub solar_system_source: i64,
    pub solar_system_target: i64,
}

impl Connection {
    pub fn new(source: i64, target: i64) -> Self {
        Self {
            solar_system_source: source,
            solar_system_target: target,
        }
    }

    /// The unordered key identifying this edge.
    pub fn key(&self) -> (i64, i64) {
        let (a, b) = (self.solar_system_source, self.solar_system_target);
        if a <= b { (a, b) } else { (b, a) }
    }

    /// Undirected equality.
    pub fn links(&self, other: &Connection) -> bool {
        self.key() == other.key()
    }

    /// Extracts a connection from an event payload, normalizing the longer
    /// `*_source_id` / `*_target_id` spellings onto the stripped names.
    pub fn from_payload(payload: &Value) -> Result<Self, SyncError> {
        let attrs = payload.get("payload").unwrap_or(payload);
        let field = |short: &'static str, long: &'static str| {
            attrs
                .get(short)
                .or_else(|| attrs.get(long))
                .and_then(Value::as_i64)
                .ok_or(SyncError::MissingField(short))
        };
        Ok(Self {
            solar_system_source: field("solar_system_source", "solar_system_source_id")?,
            solar_system_target: field("solar_system_target", "solar_system_target_id")?,
        })
    }
}

/// A map's cached view: its systems and connections.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MapData {
    #[serde(default)]
    pub systems: Vec<System>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl MapData {
    /// Inserts or replaces the system with the same `solar_system_id`.
    /// Re-applying the same system is a no-op in effect.
    pub fn upsert_system(&mut self, system: System) {
        match self
            .systems
            .iter_mut()
            .find(|s| s.solar_system_id == system.solar_system_id)
        {
            Some(existing) => *existing = system,
            None => self.systems.push(system),
        }
    }

    pub fn remove_system(&mut self, solar_system_id: i64) -> bool {
        let before = self.systems.len();
        self.systems.retain(|s| s.solar_system_id != solar_system_id);
        self.systems.len() != before
    }

    pub fn system(&self, solar_system_id: i64) -> Option<&System> {
        self.systems
            .iter()
            .find(|s| s.solar_system_id == solar_system_id)
    }

    pub fn system_mut(&mut self, solar_system_id: i64) -> Option<&mut System> {
        self.systems
            .iter_mut()
            .find(|s| s.solar_system_id == solar_system_id)
    }

    /// Inserts or replaces the undirected edge.
    pub fn upsert_connection(&mut self, connection: Connection) {
        match self
            .connections
            .iter_mut()
            .find(|c| c.links(&connection))
        {
            Some(existing) => *existing = connection,
            None => self.connections.push(connection),
        }
    }

    pub fn remove_connection(&mut self, source: i64, target: i64) -> bool {
        let probe = Connection::new(source, target);
        let before = self.connections.len();
        self.connections.retain(|c| !c.links(&probe));
        self.connections.len() != before
    }

    /// The home system: the first with `status == 1`.
    pub fn home(&self) -> Option<&System> {
        self.systems.iter().find(|s| s.status == HOME_STATUS)
    }
}
