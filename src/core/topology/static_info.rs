// src/core/topology/static_info.rs

//! The static-info enrichment facade: opaque per-system blobs, cached in
//! the `system` namespace and (optionally) fetched from ESI on a miss.

use crate::core::cache::{Cache, CacheKind, Ttl};
use crate::core::http::{Auth, HttpClient, Service};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

fn cache_key(solar_system_id: i64) -> String {
    format!("system:{solar_system_id}")
}

#[async_trait]
pub trait StaticInfoProvider: Send + Sync {
    /// The enrichment blob for a system, when one is known.
    async fn static_info(&self, solar_system_id: i64) -> Option<Value>;
}

/// Reads blobs that an external enrichment source parked in the cache.
pub struct CachedStaticInfo {
    cache: Arc<Cache>,
}

impl CachedStaticInfo {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl StaticInfoProvider for CachedStaticInfo {
    async fn static_info(&self, solar_system_id: i64) -> Option<Value> {
        self.cache.get(&cache_key(solar_system_id)).ok()
    }
}

/// Cache-through provider backed by ESI's universe endpoint. Misses fetch
/// `GET /latest/universe/systems/<id>/` under the `esi` service presets
/// (dynamic error-budget limiter included) and park the blob with the
/// `system` TTL. Fetch failures enrich with nothing rather than failing
/// the topology pass.
pub struct EsiStaticInfo {
    http: Arc<HttpClient>,
    cache: Arc<Cache>,
    base_url: String,
}

impl EsiStaticInfo {
    pub fn new(http: Arc<HttpClient>, cache: Arc<Cache>) -> Self {
        Self {
            http,
            cache,
            base_url: "https://esi.evetech.net/latest".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl StaticInfoProvider for EsiStaticInfo {
    async fn static_info(&self, solar_system_id: i64) -> Option<Value> {
        let key = cache_key(solar_system_id);
        if let Ok(cached) = self.cache.get(&key) {
            return Some(cached);
        }

        let url = format!(
            "{}/universe/systems/{}/",
            self.base_url.trim_end_matches('/'),
            solar_system_id
        );
        let response = match self.http.get(&url, Service::Esi, &Auth::None).await {
            Ok(response) => response,
            Err(error) => {
                debug!(solar_system_id, %error, "Static-info fetch failed; skipping enrichment.");
                return None;
            }
        };
        let body = response.json().ok()?;
        let _ = self
            .cache
            .put(&key, body.clone(), Ttl::Millis(CacheKind::System.ttl_ms()));
        Some(body)
    }
}

/// For deployments without an enrichment source.
pub struct NoopStaticInfo;

#[async_trait]
impl StaticInfoProvider for NoopStaticInfo {
    async fn static_info(&self, _solar_system_id: i64) -> Option<Value> {
        None
    }
}
