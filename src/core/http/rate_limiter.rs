// src/core/http/rate_limiter.rs

//! The static token-bucket limiter backed by the cache's windowed counter.
//!
//! Pure admission control: a full bucket refuses the request locally. A
//! server 429 is surfaced unchanged; the retry middleware owns the
//! Retry-After sleep.

use super::middleware::{Middleware, Next};
use super::{Request, Response};
use crate::core::SyncError;
use crate::core::cache::{Cache, Ttl};
use crate::core::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How a bucket is keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// One bucket per request host: `http_rate_limit:<host>`.
    PerHost,
    /// A single shared bucket: `http_rate_limit:global`.
    Global,
}

pub struct RateLimiter {
    cache: Arc<Cache>,
    scope: RateLimitScope,
    burst_capacity: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(
        cache: Arc<Cache>,
        scope: RateLimitScope,
        burst_capacity: u64,
        window: Duration,
    ) -> Self {
        Self {
            cache,
            scope,
            burst_capacity,
            window,
        }
    }

    fn bucket_key(&self, request: &Request) -> String {
        match self.scope {
            RateLimitScope::PerHost => format!("http_rate_limit:{}", request.host()),
            RateLimitScope::Global => "http_rate_limit:global".to_string(),
        }
    }
}

#[async_trait]
impl Middleware for RateLimiter {
    async fn call(&self, request: Request, next: Next<'_>) -> Result<Response, SyncError> {
        let bucket = self.bucket_key(&request);
        let count = self.cache.update_windowed_counter(
            &bucket,
            self.window.as_millis() as u64,
            Some(Ttl::Millis(self.window.as_millis() as u64 * 2)),
        )?;

        // Full bucket: refuse locally without contacting the server.
        if count.requests > self.burst_capacity {
            metrics::HTTP_RATE_LIMITED_TOTAL
                .with_label_values(&[&bucket])
                .inc();
            debug!(
                bucket,
                requests = count.requests,
                capacity = self.burst_capacity,
                "Local rate-limit bucket full; rejecting request"
            );
            return Err(SyncError::RateLimited { retry_after: None });
        }

        next.run(request).await
    }
}
