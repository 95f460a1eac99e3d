// src/core/http/telemetry.rs

//! Request telemetry: start/finish/error tracing events and Prometheus
//! request metrics, tagged by service and host.

use super::middleware::{Middleware, Next};
use super::{Request, Response};
use crate::core::SyncError;
use crate::core::metrics;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, warn};

pub struct Telemetry {
    /// When false, only metrics are recorded; per-request logs stay quiet.
    logging_enabled: bool,
}

impl Telemetry {
    pub fn new(logging_enabled: bool) -> Self {
        Self { logging_enabled }
    }
}

fn outcome_tag(result: &Result<Response, SyncError>) -> String {
    match result {
        Ok(response) => response.status.to_string(),
        Err(SyncError::Timeout) | Err(SyncError::ConnectTimeout) => "timeout".into(),
        Err(SyncError::RateLimited { .. }) => "rate_limited".into(),
        Err(error) => match error.status() {
            Some(status) => status.to_string(),
            None => "error".into(),
        },
    }
}

#[async_trait]
impl Middleware for Telemetry {
    async fn call(&self, request: Request, next: Next<'_>) -> Result<Response, SyncError> {
        let service = request.service.tag();
        let host = request.host();
        let method = request.method.clone();
        let started = Instant::now();

        if self.logging_enabled {
            debug!(service, %host, %method, url = %request.url, "HTTP request started");
        }

        let result = next.run(request).await;
        let elapsed = started.elapsed();
        let outcome = outcome_tag(&result);

        metrics::HTTP_REQUEST_SECONDS
            .with_label_values(&[service, &outcome])
            .observe(elapsed.as_secs_f64());

        if self.logging_enabled {
            match &result {
                Ok(response) => debug!(
                    service,
                    %host,
                    %method,
                    status = response.status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "HTTP request finished"
                ),
                Err(error) => warn!(
                    service,
                    %host,
                    %method,
                    %error,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "HTTP request failed"
                ),
            }
        }

        result
    }
}
