// src/core/retry.rs

//! The shared retry utility: bounded attempts with exponential, linear, or
//! fixed backoff, jitter, and retry-after hints.

use crate::core::SyncError;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Backoff progression between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// `base × 2^(attempt-1)`
    #[default]
    Exponential,
    /// `base × attempt`
    Linear,
    /// `base`
    Fixed,
}

/// The transient network error classes a policy may declare retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Timeout,
    ConnectTimeout,
    ConnectionRefused,
    HostUnreachable,
    ConnectionReset,
}

/// Maps an error to its transient class, when it has one.
pub fn classify(error: &SyncError) -> Option<ErrorClass> {
    match error {
        SyncError::Timeout => Some(ErrorClass::Timeout),
        SyncError::ConnectTimeout => Some(ErrorClass::ConnectTimeout),
        SyncError::ConnectionRefused => Some(ErrorClass::ConnectionRefused),
        SyncError::HostUnreachable => Some(ErrorClass::HostUnreachable),
        SyncError::ConnectionReset => Some(ErrorClass::ConnectionReset),
        _ => None,
    }
}

/// Reads the retry-after hint carried by an error, if the server gave one.
pub fn extract_retry_after(error: &SyncError) -> Option<Duration> {
    match error {
        SyncError::HttpStatus { retry_after, .. } => *retry_after,
        SyncError::RateLimited { retry_after } => *retry_after,
        _ => None,
    }
}

/// Callback invoked before each backoff sleep.
pub type OnRetry = Arc<dyn Fn(u32, &SyncError, Duration) + Send + Sync>;

/// A retry policy. Build one with `RetryPolicy::http()` /
/// `RetryPolicy::fixed()` or tune the fields directly.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max_backoff: Duration,
    pub mode: Backoff,
    /// Added jitter is uniform in `[0, jitter_fraction × delay]`.
    pub jitter_fraction: f64,
    pub retryable_errors: Vec<ErrorClass>,
    pub retryable_status_codes: Vec<u16>,
    pub on_retry: Option<OnRetry>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base", &self.base)
            .field("max_backoff", &self.max_backoff)
            .field("mode", &self.mode)
            .field("jitter_fraction", &self.jitter_fraction)
            .field("retryable_errors", &self.retryable_errors)
            .field("retryable_status_codes", &self.retryable_status_codes)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            mode: Backoff::Exponential,
            jitter_fraction: 0.2,
            retryable_errors: vec![],
            retryable_status_codes: vec![],
            on_retry: None,
        }
    }
}

impl RetryPolicy {
    /// The HTTP preset: transient network errors plus 408/429/5xx.
    pub fn http() -> Self {
        Self {
            retryable_errors: vec![
                ErrorClass::Timeout,
                ErrorClass::ConnectTimeout,
                ErrorClass::ConnectionRefused,
                ErrorClass::HostUnreachable,
            ],
            retryable_status_codes: vec![408, 429, 500, 502, 503, 504],
            ..Default::default()
        }
    }

    /// A fixed-interval preset.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            base: interval,
            mode: Backoff::Fixed,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.retryable_status_codes = codes;
        self
    }

    pub fn with_on_retry(mut self, on_retry: OnRetry) -> Self {
        self.on_retry = Some(on_retry);
        self
    }

    /// Whether the policy considers `error` worth another attempt.
    pub fn is_retryable(&self, error: &SyncError) -> bool {
        if classify(error).is_some_and(|class| self.retryable_errors.contains(&class)) {
            return true;
        }
        error
            .status()
            .is_some_and(|status| self.retryable_status_codes.contains(&status))
    }

    /// The backoff before the attempt after `attempt` (1-based), without
    /// jitter or hints. Capped at `max_backoff`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let delay = match self.mode {
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(31));
                self.base.saturating_mul(factor)
            }
            Backoff::Linear => self.base.saturating_mul(attempt.max(1)),
            Backoff::Fixed => self.base,
        };
        delay.min(self.max_backoff)
    }

    /// The actual sleep before the next attempt: a server retry-after hint
    /// overrides the computed backoff (still capped); jitter is added to
    /// computed delays only.
    pub fn delay_for(&self, attempt: u32, error: &SyncError) -> Duration {
        if let Some(hint) = extract_retry_after(error) {
            return hint.min(self.max_backoff);
        }
        let delay = self.base_delay(attempt);
        let jitter_cap = delay.as_secs_f64() * self.jitter_fraction;
        if jitter_cap <= 0.0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=jitter_cap);
        delay + Duration::from_secs_f64(jitter)
    }
}

/// Runs `f` until it succeeds, exhausts `max_attempts`, or fails with a
/// non-retryable error.
pub async fn run<T, F, Fut>(policy: &RetryPolicy, mut f: F) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 1u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.max_attempts || !policy.is_retryable(&error) {
                    return Err(error);
                }
                let delay = policy.delay_for(attempt, &error);
                if let Some(on_retry) = &policy.on_retry {
                    on_retry(attempt, &error, delay);
                }
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
