// src/core/cache/counters.rs

//! Atomic counter and windowed-counter primitives layered on the cache.
//!
//! Both operations are read-modify-write through the store's entry API, so
//! concurrent updates of the same key serialize and produce consistent counts.

use super::{Cache, Entry, Ttl};
use crate::core::SyncError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// The value held by a windowed counter: the number of requests observed in
/// the current window and the window's start in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowedCount {
    pub requests: u64,
    pub window_start: u64,
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Cache {
    /// Atomically adds `delta` to the integer held at `key`, initializing to
    /// `delta` when the key is absent or expired. A given `ttl` (re)sets the
    /// expiry; otherwise an existing expiry is preserved.
    pub fn update_counter(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Ttl>,
    ) -> Result<i64, SyncError> {
        let now = Instant::now();
        let mut new_value = delta;
        let entry = self
            .entries
            .entry(key.to_string())
            .and_modify(|entry| {
                let current = if entry.is_expired(now) {
                    0
                } else {
                    entry.value.as_i64().unwrap_or(0)
                };
                new_value = current.saturating_add(delta);
                entry.value = Value::from(new_value);
                if let Some(ttl) = ttl {
                    entry.expires_at = ttl.expires_at(now);
                } else if entry.is_expired(now) {
                    entry.expires_at = Ttl::Default.expires_at(now);
                }
            })
            .or_insert_with(|| Entry {
                value: Value::from(delta),
                expires_at: ttl.unwrap_or_default().expires_at(now),
            });
        let result = entry.value.as_i64().ok_or(SyncError::NotAnInteger);
        drop(entry);
        self.index_key(key);
        result
    }

    /// Atomically advances the windowed counter at `key` using the current
    /// wall clock.
    pub fn update_windowed_counter(
        &self,
        key: &str,
        window_ms: u64,
        ttl: Option<Ttl>,
    ) -> Result<WindowedCount, SyncError> {
        self.update_windowed_counter_at(key, window_ms, ttl, now_epoch_ms())
    }

    /// Windowed-counter update against an explicit clock. If no live value
    /// exists the window opens at `now_ms` with one request; within
    /// `window_ms` of the stored start the request count increments; past the
    /// window a fresh one opens at `now_ms`.
    pub fn update_windowed_counter_at(
        &self,
        key: &str,
        window_ms: u64,
        ttl: Option<Ttl>,
        now_ms: u64,
    ) -> Result<WindowedCount, SyncError> {
        let now = Instant::now();
        let fresh = WindowedCount {
            requests: 1,
            window_start: now_ms,
        };

        let mut result = fresh;
        let entry = self
            .entries
            .entry(key.to_string())
            .and_modify(|entry| {
                let current: Option<WindowedCount> = if entry.is_expired(now) {
                    None
                } else {
                    serde_json::from_value(entry.value.clone()).ok()
                };
                result = match current {
                    Some(count) if now_ms.saturating_sub(count.window_start) < window_ms => {
                        WindowedCount {
                            requests: count.requests + 1,
                            window_start: count.window_start,
                        }
                    }
                    _ => fresh,
                };
                entry.value = serde_json::to_value(result).unwrap_or(Value::Null);
                if let Some(ttl) = ttl {
                    entry.expires_at = ttl.expires_at(now);
                }
            })
            .or_insert_with(|| Entry {
                value: serde_json::to_value(fresh).unwrap_or(Value::Null),
                expires_at: ttl.unwrap_or_default().expires_at(now),
            });
        drop(entry);
        self.index_key(key);
        Ok(result)
    }
}
