// src/core/http/middleware.rs

//! The middleware contract and the terminal transport step.

use super::{Request, Response, parse_retry_after};
use crate::core::SyncError;
use async_trait::async_trait;
use std::sync::Arc;

/// A single pipeline stage. `next` invokes the rest of the chain; a stage
/// may short-circuit, mutate the request, or inspect the response.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn call(&self, request: Request, next: Next<'_>) -> Result<Response, SyncError>;
}

/// The remainder of a middleware chain plus the terminal transport.
/// Holds only borrows, so a stage may copy it to re-run the tail (retry).
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    transport: &'a Transport,
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [Arc<dyn Middleware>], transport: &'a Transport) -> Self {
        Self { chain, transport }
    }

    /// Runs the next stage, or the transport once the chain is exhausted.
    pub async fn run(self, request: Request) -> Result<Response, SyncError> {
        match self.chain.split_first() {
            Some((stage, rest)) => {
                stage
                    .call(
                        request,
                        Next {
                            chain: rest,
                            transport: self.transport,
                        },
                    )
                    .await
            }
            None => self.transport.execute(request).await,
        }
    }
}

/// The terminal step: drives `reqwest` and returns a `Response` for every
/// HTTP status. Network failures surface as the transient error classes.
pub struct Transport {
    client: reqwest::Client,
}

impl Transport {
    pub fn new() -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(SyncError::from)?;
        Ok(Self { client })
    }

    pub async fn execute(&self, request: Request) -> Result<Response, SyncError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);

        if let Some(timeout) = request.service.timeout() {
            builder = builder.timeout(timeout);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            if matches!(
                request.method,
                reqwest::Method::POST | reqwest::Method::PUT | reqwest::Method::PATCH
            ) {
                builder = builder.json(body);
            }
        }

        let response = builder.send().await.map_err(SyncError::from)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(SyncError::from)?;

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

/// Converts non-success statuses into errors, carrying any `Retry-After`
/// hint. Placed innermost so limiter stages still see raw responses.
pub struct StatusCheck;

#[async_trait]
impl Middleware for StatusCheck {
    async fn call(&self, request: Request, next: Next<'_>) -> Result<Response, SyncError> {
        let response = next.run(request).await?;
        if response.is_success() {
            return Ok(response);
        }
        let retry_after = response.header("retry-after").and_then(parse_retry_after);
        Err(SyncError::from_status(response.status, retry_after))
    }
}
