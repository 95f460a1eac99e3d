// src/core/http/dynamic_rate_limiter.rs

//! The header-driven rate limiter for ESI and Discord webhooks.
//!
//! ESI publishes an error budget in `X-ESI-Error-Limit-Remain` /
//! `X-ESI-Error-Limit-Reset`; the limiter caches it per host and blocks
//! proportionally as the budget runs out. Discord webhooks get the global
//! 50 req/s bucket plus 5 req / 2 s per webhook.

use super::middleware::{Middleware, Next};
use super::{Request, Response};
use crate::core::SyncError;
use crate::core::cache::{Cache, Ttl};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Cached ESI error-budget state for one host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct EsiBudget {
    remaining: i64,
    /// Epoch seconds at which the error window resets.
    reset_at: u64,
}

const ESI_BUDGET_NS: &str = "esi_rate_limit";
const DISCORD_NS: &str = "discord_rate_limit";

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn is_discord_webhook(request: &Request) -> Option<String> {
    let url = url::Url::parse(&request.url).ok()?;
    if url.host_str()? != "discord.com" {
        return None;
    }
    let mut segments = url.path_segments()?;
    if segments.next() != Some("api") || segments.next() != Some("webhooks") {
        return None;
    }
    segments.next().map(str::to_string)
}

pub struct DynamicRateLimiter {
    cache: Arc<Cache>,
}

impl DynamicRateLimiter {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }

    /// Blocks before an ESI request when the cached error budget is nearly
    /// exhausted. The wait scales with how close the budget is to zero.
    async fn esi_pre_block(&self, host: &str) {
        let key = format!("{ESI_BUDGET_NS}:{host}");
        let Ok(value) = self.cache.get(&key) else {
            return;
        };
        let Ok(budget) = serde_json::from_value::<EsiBudget>(value) else {
            return;
        };

        let now = now_epoch_secs();
        if budget.reset_at <= now || budget.remaining > 5 {
            return;
        }

        let reset_in = budget.reset_at - now;
        let fraction = if budget.remaining <= 1 {
            1.0
        } else if budget.remaining <= 3 {
            0.3
        } else {
            0.1
        };
        let wait = Duration::from_secs_f64(reset_in as f64 * fraction);
        warn!(
            host,
            remaining = budget.remaining,
            reset_in,
            wait_ms = wait.as_millis() as u64,
            "ESI error budget low; pausing before request"
        );
        tokio::time::sleep(wait).await;
    }

    /// Records the budget headers from an ESI response.
    fn esi_record(&self, host: &str, response: &Response) {
        let remain = response
            .header("x-esi-error-limit-remain")
            .and_then(|v| v.parse::<i64>().ok());
        let reset = response
            .header("x-esi-error-limit-reset")
            .and_then(|v| v.parse::<u64>().ok());
        if let (Some(remaining), Some(reset_in)) = (remain, reset) {
            let budget = EsiBudget {
                remaining,
                reset_at: now_epoch_secs() + reset_in,
            };
            let key = format!("{ESI_BUDGET_NS}:{host}");
            if let Ok(value) = serde_json::to_value(budget) {
                // The budget is only meaningful until the window resets.
                let _ = self
                    .cache
                    .put(&key, value, Ttl::Millis((reset_in + 1) * 1000));
            }
        }
    }

    /// Admission control for Discord webhooks: global 50 req/s plus
    /// 5 req / 2 s per webhook id.
    fn discord_admit(&self, webhook_id: &str) -> Result<(), SyncError> {
        let global = self.cache.update_windowed_counter(
            &format!("{DISCORD_NS}:global"),
            1000,
            Some(Ttl::Millis(5_000)),
        )?;
        if global.requests > 50 {
            return Err(SyncError::RateLimited { retry_after: None });
        }

        let per_webhook = self.cache.update_windowed_counter(
            &format!("{DISCORD_NS}:webhook:{webhook_id}"),
            2000,
            Some(Ttl::Millis(10_000)),
        )?;
        if per_webhook.requests > 5 {
            return Err(SyncError::RateLimited { retry_after: None });
        }
        Ok(())
    }

    /// Reads Discord's `X-RateLimit-*` headers; an exhausted bucket is
    /// recorded so the next admission check sees a fresh window start.
    fn discord_record(&self, webhook_id: &str, response: &Response) {
        let remaining = response
            .header("x-ratelimit-remaining")
            .and_then(|v| v.parse::<i64>().ok());
        let reset_after = response
            .header("x-ratelimit-reset-after")
            .and_then(|v| v.parse::<f64>().ok());
        if let (Some(0), Some(reset_after)) = (remaining, reset_after) {
            debug!(
                webhook_id,
                reset_after, "Discord bucket exhausted; recorded for admission control"
            );
            let key = format!("{DISCORD_NS}:webhook:{webhook_id}");
            // Saturate the local bucket for the advertised reset window.
            let saturated = crate::core::cache::WindowedCount {
                requests: 6,
                window_start: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0),
            };
            if let Ok(value) = serde_json::to_value(saturated) {
                let _ = self.cache.put(
                    &key,
                    value,
                    Ttl::Millis((reset_after * 1000.0).ceil() as u64),
                );
            }
        }
    }
}

#[async_trait]
impl Middleware for DynamicRateLimiter {
    async fn call(&self, request: Request, next: Next<'_>) -> Result<Response, SyncError> {
        if let Some(webhook_id) = is_discord_webhook(&request) {
            self.discord_admit(&webhook_id)?;
            let response = next.run(request).await?;
            self.discord_record(&webhook_id, &response);
            return Ok(response);
        }

        let host = request.host();
        self.esi_pre_block(&host).await;
        let response = next.run(request).await?;
        self.esi_record(&host, &response);
        Ok(response)
    }
}
