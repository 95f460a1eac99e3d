// src/core/map/api_client.rs

//! The remote topology REST API, behind a trait so the actor can be driven
//! by a stub in tests.

use super::types::{Connection, MapData, MapRecord, System};
use crate::core::SyncError;
use crate::core::http::{Auth, HttpClient, Service};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// The per-map slice of the remote topology API. All calls authenticate
/// with the map's public API key.
#[async_trait]
pub trait MapApi: Send + Sync {
    /// `GET /api/maps/<slug>` — the remote's id for this map.
    async fn get_map_identity(&self, map: &MapRecord) -> Result<String, SyncError>;

    /// `GET /api/maps/<slug>/systems` — the full raw view.
    async fn get_map_systems(&self, map: &MapRecord) -> Result<MapData, SyncError>;

    /// `GET /api/maps/<slug>/systems/<id>` — one system's attributes.
    async fn get_system(&self, map: &MapRecord, solar_system_id: i64)
    -> Result<System, SyncError>;

    /// `GET /api/maps/<slug>/connections?source=&target=`.
    async fn get_connections(
        &self,
        map: &MapRecord,
        source: i64,
        target: i64,
    ) -> Result<Vec<Connection>, SyncError>;

    /// `POST /api/maps/<slug>/systems_and_connections` — batch upsert.
    async fn upsert_systems_and_connections(
        &self,
        map: &MapRecord,
        systems: Vec<Value>,
        connections: Vec<Connection>,
        update_existing: bool,
    ) -> Result<(), SyncError>;

    /// `PATCH /api/maps/<slug>/systems/<id>` — single-system attribute
    /// update (labels).
    async fn update_system(
        &self,
        map: &MapRecord,
        solar_system_id: i64,
        attributes: Value,
    ) -> Result<(), SyncError>;

    /// `DELETE /api/maps/<slug>/systems/<id>`.
    async fn delete_system(&self, map: &MapRecord, solar_system_id: i64)
    -> Result<(), SyncError>;

    /// `DELETE /api/maps/<slug>/connections`.
    async fn delete_connection(
        &self,
        map: &MapRecord,
        source: i64,
        target: i64,
    ) -> Result<(), SyncError>;
}

/// The production implementation over the shared HTTP client
/// (`service = map` presets: 60 s timeout, 5xx retries, no rate limit).
pub struct HttpMapApi {
    http: Arc<HttpClient>,
}

impl HttpMapApi {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// `scheme://host[:port]/api/maps/<slug>` for a map's url.
    fn api_base(map: &MapRecord) -> Result<String, SyncError> {
        let parsed = url::Url::parse(&map.url)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| SyncError::MalformedUrl(map.url.clone()))?;
        let slug = parsed.path().trim_matches('/');
        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(format!(
            "{}://{}/api/maps/{}",
            parsed.scheme(),
            authority,
            slug
        ))
    }

    fn auth(map: &MapRecord) -> Auth {
        Auth::Bearer(map.public_api_key.clone())
    }
}

#[async_trait]
impl MapApi for HttpMapApi {
    async fn get_map_identity(&self, map: &MapRecord) -> Result<String, SyncError> {
        let url = Self::api_base(map)?;
        let response = self.http.get(&url, Service::Map, &Self::auth(map)).await?;
        let body = response.json()?;
        body.pointer("/data/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(SyncError::MissingField("data.id"))
    }

    async fn get_map_systems(&self, map: &MapRecord) -> Result<MapData, SyncError> {
        let url = format!("{}/systems", Self::api_base(map)?);
        let response = self.http.get(&url, Service::Map, &Self::auth(map)).await?;
        let body = response.json()?;
        let data = body.get("data").ok_or(SyncError::MissingField("data"))?;
        serde_json::from_value(data.clone())
            .map_err(|e| SyncError::SchemaMismatch(format!("map systems: {e}")))
    }

    async fn get_system(
        &self,
        map: &MapRecord,
        solar_system_id: i64,
    ) -> Result<System, SyncError> {
        let url = format!("{}/systems/{}", Self::api_base(map)?, solar_system_id);
        let response = self.http.get(&url, Service::Map, &Self::auth(map)).await?;
        let body = response.json()?;
        let attributes = body
            .pointer("/data/0/attributes")
            .ok_or(SyncError::MissingField("data.0.attributes"))?;
        serde_json::from_value(attributes.clone())
            .map_err(|e| SyncError::SchemaMismatch(format!("system: {e}")))
    }

    async fn get_connections(
        &self,
        map: &MapRecord,
        source: i64,
        target: i64,
    ) -> Result<Vec<Connection>, SyncError> {
        let url = format!(
            "{}/connections?source={}&target={}",
            Self::api_base(map)?,
            source,
            target
        );
        let response = self.http.get(&url, Service::Map, &Self::auth(map)).await?;
        let body = response.json()?;
        let data = body.get("data").ok_or(SyncError::MissingField("data"))?;
        let mut connections = Vec::new();
        for raw in data.as_array().into_iter().flatten() {
            connections.push(Connection::from_payload(raw)?);
        }
        Ok(connections)
    }

    async fn upsert_systems_and_connections(
        &self,
        map: &MapRecord,
        systems: Vec<Value>,
        connections: Vec<Connection>,
        update_existing: bool,
    ) -> Result<(), SyncError> {
        let url = format!("{}/systems_and_connections", Self::api_base(map)?);
        let mut body = Map::new();
        if !systems.is_empty() {
            body.insert("systems".to_string(), Value::Array(systems));
        }
        if !connections.is_empty() {
            body.insert(
                "connections".to_string(),
                serde_json::to_value(connections)?,
            );
        }
        if update_existing {
            body.insert("update_existing".to_string(), Value::Bool(true));
        }
        self.http
            .post_json(&url, Service::Map, &Self::auth(map), Value::Object(body))
            .await?;
        Ok(())
    }

    async fn update_system(
        &self,
        map: &MapRecord,
        solar_system_id: i64,
        attributes: Value,
    ) -> Result<(), SyncError> {
        let url = format!("{}/systems/{}", Self::api_base(map)?, solar_system_id);
        self.http
            .patch_json(&url, Service::Map, &Self::auth(map), attributes)
            .await?;
        Ok(())
    }

    async fn delete_system(
        &self,
        map: &MapRecord,
        solar_system_id: i64,
    ) -> Result<(), SyncError> {
        let url = format!("{}/systems/{}", Self::api_base(map)?, solar_system_id);
        self.http
            .delete(&url, Service::Map, &Self::auth(map), None)
            .await?;
        Ok(())
    }

    async fn delete_connection(
        &self,
        map: &MapRecord,
        source: i64,
        target: i64,
    ) -> Result<(), SyncError> {
        let url = format!("{}/connections", Self::api_base(map)?);
        let body = json!({
            "solar_system_source": source,
            "solar_system_target": target,
        });
        self.http
            .delete(&url, Service::Map, &Self::auth(map), Some(body))
            .await?;
        Ok(())
    }
}
