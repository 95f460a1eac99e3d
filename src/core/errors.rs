// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::num::ParseIntError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The main error enum, representing all possible failures within the service.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    // --- Network transient errors (retryable) ---
    #[error("Request timed out")]
    Timeout,

    #[error("Connect timed out")]
    ConnectTimeout,

    #[error("Connection refused")]
    ConnectionRefused,

    #[error("Host unreachable")]
    HostUnreachable,

    #[error("Connection reset by peer")]
    ConnectionReset,

    // --- HTTP status classes ---
    /// A non-success HTTP status. Carries a parsed `Retry-After` hint when
    /// the server supplied one.
    #[error("HTTP status {status}")]
    HttpStatus {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("Bad request")]
    BadRequest,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    /// Either our own bucket was full or the server answered 429.
    #[error("Rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("HTTP client error: {0}")]
    HttpClientError(String),

    // --- Data errors (drop with a log, never crash the pipeline) ---
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    // --- Cache errors ---
    #[error("Key not found")]
    KeyNotFound,

    #[error("Value is not an integer or out of range")]
    NotAnInteger,

    // --- Config errors (fail fast at startup) ---
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    // --- Actor plumbing ---
    #[error("Actor '{0}' is not running")]
    ActorUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for SyncError {
    fn clone(&self) -> Self {
        match self {
            SyncError::Io(e) => SyncError::Io(Arc::clone(e)),
            SyncError::Timeout => SyncError::Timeout,
            SyncError::ConnectTimeout => SyncError::ConnectTimeout,
            SyncError::ConnectionRefused => SyncError::ConnectionRefused,
            SyncError::HostUnreachable => SyncError::HostUnreachable,
            SyncError::ConnectionReset => SyncError::ConnectionReset,
            SyncError::HttpStatus {
                status,
                retry_after,
            } => SyncError::HttpStatus {
                status: *status,
                retry_after: *retry_after,
            },
            SyncError::BadRequest => SyncError::BadRequest,
            SyncError::Unauthorized => SyncError::Unauthorized,
            SyncError::Forbidden => SyncError::Forbidden,
            SyncError::NotFound => SyncError::NotFound,
            SyncError::RateLimited { retry_after } => SyncError::RateLimited {
                retry_after: *retry_after,
            },
            SyncError::HttpClientError(s) => SyncError::HttpClientError(s.clone()),
            SyncError::InvalidJson(s) => SyncError::InvalidJson(s.clone()),
            SyncError::MissingField(f) => SyncError::MissingField(f),
            SyncError::SchemaMismatch(s) => SyncError::SchemaMismatch(s.clone()),
            SyncError::KeyNotFound => SyncError::KeyNotFound,
            SyncError::NotAnInteger => SyncError::NotAnInteger,
            SyncError::InvalidConfig(s) => SyncError::InvalidConfig(s.clone()),
            SyncError::MalformedUrl(s) => SyncError::MalformedUrl(s.clone()),
            SyncError::ActorUnavailable(s) => SyncError::ActorUnavailable(s.clone()),
            SyncError::Internal(s) => SyncError::Internal(s.clone()),
        }
    }
}

impl PartialEq for SyncError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SyncError::Io(e1), SyncError::Io(e2)) => e1.to_string() == e2.to_string(),
            (
                SyncError::HttpStatus {
                    status: s1,
                    retry_after: r1,
                },
                SyncError::HttpStatus {
                    status: s2,
                    retry_after: r2,
                },
            ) => s1 == s2 && r1 == r2,
            (
                SyncError::RateLimited { retry_after: r1 },
                SyncError::RateLimited { retry_after: r2 },
            ) => r1 == r2,
            (SyncError::HttpClientError(s1), SyncError::HttpClientError(s2)) => s1 == s2,
            (SyncError::InvalidJson(s1), SyncError::InvalidJson(s2)) => s1 == s2,
            (SyncError::MissingField(f1), SyncError::MissingField(f2)) => f1 == f2,
            (SyncError::SchemaMismatch(s1), SyncError::SchemaMismatch(s2)) => s1 == s2,
            (SyncError::InvalidConfig(s1), SyncError::InvalidConfig(s2)) => s1 == s2,
            (SyncError::MalformedUrl(s1), SyncError::MalformedUrl(s2)) => s1 == s2,
            (SyncError::ActorUnavailable(s1), SyncError::ActorUnavailable(s2)) => s1 == s2,
            (SyncError::Internal(s1), SyncError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl SyncError {
    /// Maps a non-success HTTP status code to its specific error, carrying
    /// the `Retry-After` hint through for 429/503 responses.
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            400 => SyncError::BadRequest,
            401 => SyncError::Unauthorized,
            403 => SyncError::Forbidden,
            404 => SyncError::NotFound,
            429 => SyncError::RateLimited { retry_after },
            _ => SyncError::HttpStatus {
                status,
                retry_after,
            },
        }
    }

    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::HttpStatus { status, .. } => Some(*status),
            SyncError::BadRequest => Some(400),
            SyncError::Unauthorized => Some(401),
            SyncError::Forbidden => Some(403),
            SyncError::NotFound => Some(404),
            SyncError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Io(Arc::new(e))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            if e.is_connect() {
                SyncError::ConnectTimeout
            } else {
                SyncError::Timeout
            }
        } else if e.is_connect() {
            SyncError::ConnectionRefused
        } else {
            SyncError::HttpClientError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::InvalidJson(e.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(e: url::ParseError) -> Self {
        SyncError::MalformedUrl(e.to_string())
    }
}

impl From<ParseIntError> for SyncError {
    fn from(_: ParseIntError) -> Self {
        SyncError::NotAnInteger
    }
}
