// src/core/cache/mod.rs

//! The shared namespaced TTL cache.
//!
//! Keys are colon-separated `"namespace:subkey[:…]"` strings and values are
//! arbitrary JSON. Every operation is atomic against single-key concurrent
//! writers: the store is a sharded `DashMap` and all read-modify-write paths
//! go through its entry API while holding the shard guard.

use crate::core::SyncError;
use crate::core::metrics;
use dashmap::DashMap;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub mod counters;
pub mod namespace;
pub mod ttl;

pub use counters::WindowedCount;
pub use namespace::NAMESPACE_INDEX_KEY;
pub use ttl::{CacheKind, DedupStatus};

/// The default expiry applied when a caller does not specify one.
const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Expiry selection for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Ttl {
    /// The 24 h default.
    #[default]
    Default,
    /// Expire after the given number of milliseconds.
    Millis(u64),
    /// Never expire.
    Infinity,
}

impl Ttl {
    fn expires_at(self, now: Instant) -> Option<Instant> {
        match self {
            Ttl::Default => Some(now + DEFAULT_TTL),
            Ttl::Millis(ms) => Some(now + Duration::from_millis(ms)),
            Ttl::Infinity => None,
        }
    }
}

/// A single cache slot.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub value: Value,
    pub expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Outcome of `clear_namespace`.
#[derive(Debug, PartialEq, Eq)]
pub enum ClearOutcome {
    /// The namespace was cleared synchronously; `n` keys were removed.
    Cleared(usize),
    /// Clearing continues on a background task.
    Async,
}

/// A point-in-time snapshot of the cache statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// The shared namespaced TTL store.
#[derive(Debug)]
pub struct Cache {
    pub(crate) entries: DashMap<String, Entry>,
    max_keys: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl Cache {
    pub fn new(max_keys: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_keys,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Looks up a key, dropping it first if its TTL has lapsed.
    pub fn get(&self, key: &str) -> Result<Value, SyncError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::CACHE_HITS_TOTAL.inc();
                return Ok(entry.value.clone());
            }
            None => false,
        };

        if expired {
            self.remove_entry(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::CACHE_MISSES_TOTAL.inc();
        Err(SyncError::KeyNotFound)
    }

    /// Stores a value under `key`, updating the namespace index and running
    /// the eviction check.
    pub fn put(&self, key: &str, value: Value, ttl: Ttl) -> Result<(), SyncError> {
        let expires_at = ttl.expires_at(Instant::now());
        self.entries.insert(
            key.to_string(),
            Entry { value, expires_at },
        );
        self.index_key(key);
        self.maybe_evict();
        Ok(())
    }

    /// Deletes a key and its namespace-index membership.
    pub fn delete(&self, key: &str) {
        self.remove_entry(key);
    }

    /// Whether a live (non-expired) value exists under `key`.
    pub fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) => !entry.is_expired(now),
            None => false,
        }
    }

    /// Bulk lookup. Missing or expired keys yield `None` in the result.
    pub fn get_batch(&self, keys: &[String]) -> Vec<(String, Option<Value>)> {
        keys.iter()
            .map(|key| (key.clone(), self.get(key).ok()))
            .collect()
    }

    /// Bulk store with the default TTL.
    pub fn put_batch(&self, pairs: Vec<(String, Value)>) -> Result<(), SyncError> {
        for (key, value) in pairs {
            self.put(&key, value, Ttl::Default)?;
        }
        Ok(())
    }

    /// Bulk store; entries sharing a TTL are written back to back.
    pub fn put_batch_with_ttl(&self, pairs: Vec<(String, Value, Ttl)>) -> Result<(), SyncError> {
        let mut grouped: std::collections::HashMap<Ttl, Vec<(String, Value)>> =
            std::collections::HashMap::new();
        for (key, value, ttl) in pairs {
            grouped.entry(ttl).or_default().push((key, value));
        }
        for (ttl, group) in grouped {
            for (key, value) in group {
                self.put(&key, value, ttl)?;
            }
        }
        Ok(())
    }

    /// The number of slots currently held, the namespace index included.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    /// Sweeps expired entries out of the store. Called from the background
    /// purger; reads also expire lazily.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut victims = Vec::new();
        for entry in self.entries.iter() {
            if entry.value().is_expired(now) {
                victims.push(entry.key().clone());
            }
        }
        for key in &victims {
            self.remove_entry(key);
        }
        let purged = victims.len();
        if purged > 0 {
            self.expirations.fetch_add(purged as u64, Ordering::Relaxed);
            metrics::CACHE_EXPIRED_TOTAL.inc_by(purged as f64);
            debug!("Purged {} expired cache keys.", purged);
        }
        purged
    }

    /// Writes `value` only when no live entry exists; the dedup primitive.
    pub(crate) fn mark_if_absent(&self, key: &str, value: Value, ttl: Ttl) -> ttl::DedupStatus {
        let now = Instant::now();
        let mut status = ttl::DedupStatus::Duplicate;
        self.entries
            .entry(key.to_string())
            .and_modify(|entry| {
                if entry.is_expired(now) {
                    entry.value = value.clone();
                    entry.expires_at = ttl.expires_at(now);
                    status = ttl::DedupStatus::New;
                }
            })
            .or_insert_with(|| {
                status = ttl::DedupStatus::New;
                Entry {
                    value,
                    expires_at: ttl.expires_at(now),
                }
            });
        self.index_key(key);
        status
    }

    /// Removes the entry and de-indexes it, without touching the stat counters.
    fn remove_entry(&self, key: &str) {
        self.entries.remove(key);
        self.unindex_key(key);
    }

    /// Random eviction when the key count crosses the soft or hard limit.
    /// The namespace index is never a victim.
    fn maybe_evict(&self) {
        if self.max_keys == 0 {
            return;
        }
        let size = self.entries.len();
        let fraction = if size > self.max_keys {
            0.30
        } else if size as f64 > 0.9 * self.max_keys as f64 {
            0.10
        } else {
            return;
        };

        let mut keys: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k != NAMESPACE_INDEX_KEY)
            .collect();
        let mut rng = SmallRng::from_entropy();
        keys.shuffle(&mut rng);

        let victim_count = ((size as f64) * fraction).ceil() as usize;
        let victims: Vec<String> = keys.into_iter().take(victim_count).collect();
        for key in &victims {
            self.remove_entry(key);
        }
        if !victims.is_empty() {
            self.evictions
                .fetch_add(victims.len() as u64, Ordering::Relaxed);
            metrics::CACHE_EVICTIONS_TOTAL.inc_by(victims.len() as f64);
            warn!(
                "Cache over limit ({} keys, limit {}); evicted {} random keys.",
                size,
                self.max_keys,
                victims.len()
            );
        }
    }
}
