// src/core/http/mod.rs

//! The outbound HTTP client and its middleware pipeline.
//!
//! Every request flows through a per-service middleware chain before hitting
//! the `reqwest` transport. The default chain is Telemetry → RateLimiter →
//! Retry; ESI swaps in the header-driven dynamic limiter and the license
//! manager keeps the static per-host bucket inside the retry loop.

use crate::core::SyncError;
use crate::core::cache::Cache;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub mod dynamic_rate_limiter;
pub mod middleware;
pub mod rate_limiter;
pub mod retry_middleware;
pub mod telemetry;

use dynamic_rate_limiter::DynamicRateLimiter;
use middleware::{Middleware, Next, StatusCheck, Transport};
use rate_limiter::{RateLimitScope, RateLimiter};
use retry_middleware::RetryMiddleware;
use telemetry::Telemetry;

/// The remote services the client talks to, each with its own presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Esi,
    License,
    Map,
    Streaming,
}

impl Service {
    pub fn tag(self) -> &'static str {
        match self {
            Service::Esi => "esi",
            Service::License => "license",
            Service::Map => "map",
            Service::Streaming => "streaming",
        }
    }

    /// Total request timeout; `None` means unbounded (streaming).
    pub fn timeout(self) -> Option<Duration> {
        match self {
            Service::Esi | Service::License => Some(Duration::from_secs(3)),
            Service::Map => Some(Duration::from_secs(60)),
            Service::Streaming => None,
        }
    }

    pub fn max_retries(self) -> u32 {
        match self {
            Service::Esi => 3,
            Service::License | Service::Map => 2,
            Service::Streaming => 0,
        }
    }

    /// Status codes the retry middleware re-attempts for this service.
    /// Client errors (4xx other than 429) are never retried.
    pub fn retryable_status_codes(self) -> Vec<u16> {
        match self {
            Service::Esi | Service::License => vec![429, 500, 502, 503, 504],
            Service::Map => vec![500, 502, 503, 504],
            Service::Streaming => vec![],
        }
    }
}

/// Authentication for an outbound request.
#[derive(Debug, Clone, Default)]
pub enum Auth {
    #[default]
    None,
    Bearer(String),
    ApiKey(String),
    Basic {
        user: String,
        pass: String,
    },
}

impl Auth {
    /// Appends the matching header.
    pub fn apply(&self, headers: &mut Vec<(String, String)>) {
        match self {
            Auth::None => {}
            Auth::Bearer(token) => {
                headers.push(("Authorization".into(), format!("Bearer {token}")));
            }
            Auth::ApiKey(key) => headers.push(("X-API-Key".into(), key.clone())),
            Auth::Basic { user, pass } => {
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
                headers.push(("Authorization".into(), format!("Basic {encoded}")));
            }
        }
    }
}

/// An outbound request as seen by the middleware chain.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// JSON-encoded on POST/PUT/PATCH.
    pub body: Option<Value>,
    pub service: Service,
}

impl Request {
    pub fn new(method: reqwest::Method, url: impl Into<String>, service: Service) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            service,
        }
    }

    pub fn with_auth(mut self, auth: &Auth) -> Self {
        auth.apply(&mut self.headers);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// The request URL's host, used as the default rate-limit bucket key.
    pub fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// A completed HTTP exchange. Produced for every status; the `StatusCheck`
/// step converts non-success statuses to errors at the end of the chain.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: bytes::Bytes,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }

    pub fn json(&self) -> Result<Value, SyncError> {
        serde_json::from_slice(&self.body).map_err(SyncError::from)
    }
}

/// Parses a `Retry-After` header value: integer seconds first, HTTP-date
/// second.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = DateTime::parse_from_rfc2822(trimmed).ok()?;
    let delta = date.with_timezone(&Utc) - Utc::now();
    Some(Duration::from_secs(delta.num_seconds().max(0) as u64))
}

/// The shared outbound HTTP client: a `reqwest` transport plus one
/// middleware chain per service.
pub struct HttpClient {
    transport: Transport,
    chains: HashMap<Service, Vec<Arc<dyn Middleware>>>,
}

impl HttpClient {
    pub fn new(cache: Arc<Cache>, telemetry_logging: bool) -> Result<Self, SyncError> {
        let transport = Transport::new()?;
        let mut chains: HashMap<Service, Vec<Arc<dyn Middleware>>> = HashMap::new();

        let status_check: Arc<dyn Middleware> = Arc::new(StatusCheck);

        // ESI: Telemetry → Retry → StatusCheck → DynamicRateLimiter.
        chains.insert(
            Service::Esi,
            vec![
                Arc::new(Telemetry::new(telemetry_logging)),
                Arc::new(RetryMiddleware::for_service(Service::Esi)),
                status_check.clone(),
                Arc::new(DynamicRateLimiter::new(cache.clone())),
            ],
        );

        // License: Telemetry → Retry → RateLimiter (1 req/s, burst 2,
        // per-host) → StatusCheck.
        chains.insert(
            Service::License,
            vec![
                Arc::new(Telemetry::new(telemetry_logging)),
                Arc::new(RetryMiddleware::for_service(Service::License)),
                Arc::new(RateLimiter::new(
                    cache.clone(),
                    RateLimitScope::PerHost,
                    2,
                    Duration::from_secs(1),
                )),
                status_check.clone(),
            ],
        );

        // Map: Telemetry → Retry → StatusCheck. No rate limit.
        chains.insert(
            Service::Map,
            vec![
                Arc::new(Telemetry::new(telemetry_logging)),
                Arc::new(RetryMiddleware::for_service(Service::Map)),
                status_check,
            ],
        );

        // Streaming bypasses the chain entirely; the SSE client drives the
        // transport itself.
        chains.insert(Service::Streaming, vec![]);

        Ok(Self { transport, chains })
    }

    /// Sends a request through its service's middleware chain.
    pub async fn execute(&self, request: Request) -> Result<Response, SyncError> {
        let chain = self
            .chains
            .get(&request.service)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        Next::new(chain, &self.transport).run(request).await
    }

    pub async fn get(&self, url: &str, service: Service, auth: &Auth) -> Result<Response, SyncError> {
        self.execute(Request::new(reqwest::Method::GET, url, service).with_auth(auth))
            .await
    }

    pub async fn post_json(
        &self,
        url: &str,
        service: Service,
        auth: &Auth,
        body: Value,
    ) -> Result<Response, SyncError> {
        self.execute(
            Request::new(reqwest::Method::POST, url, service)
                .with_auth(auth)
                .with_body(body),
        )
        .await
    }

    pub async fn patch_json(
        &self,
        url: &str,
        service: Service,
        auth: &Auth,
        body: Value,
    ) -> Result<Response, SyncError> {
        self.execute(
            Request::new(reqwest::Method::PATCH, url, service)
                .with_auth(auth)
                .with_body(body),
        )
        .await
    }

    pub async fn delete(
        &self,
        url: &str,
        service: Service,
        auth: &Auth,
        body: Option<Value>,
    ) -> Result<Response, SyncError> {
        let mut request = Request::new(reqwest::Method::DELETE, url, service).with_auth(auth);
        request.body = body;
        self.execute(request).await
    }
}
