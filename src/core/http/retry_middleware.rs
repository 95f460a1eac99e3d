// src/core/http/retry_middleware.rs

//! The retry stage: re-attempts transient failures per the service presets,
//! delegating backoff arithmetic to the shared retry utility.

use super::middleware::{Middleware, Next};
use super::{Request, Response, Service};
use crate::core::SyncError;
use crate::core::retry::RetryPolicy;
use async_trait::async_trait;
use tracing::debug;

pub struct RetryMiddleware {
    policy: RetryPolicy,
}

impl RetryMiddleware {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Builds the retry policy from the service preset table.
    pub fn for_service(service: Service) -> Self {
        let policy = RetryPolicy::http()
            .with_max_attempts(service.max_retries().max(1))
            .with_status_codes(service.retryable_status_codes());
        Self { policy }
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    async fn call(&self, request: Request, next: Next<'_>) -> Result<Response, SyncError> {
        let mut attempt = 1u32;
        loop {
            // `Next` is `Copy`, so each attempt re-runs the tail of the chain.
            match next.run(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    if attempt >= self.policy.max_attempts || !self.policy.is_retryable(&error) {
                        return Err(error);
                    }
                    let delay = self.policy.delay_for(attempt, &error);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "Retrying HTTP request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
