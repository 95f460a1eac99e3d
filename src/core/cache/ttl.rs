// src/core/cache/ttl.rs

//! TTL presets per cached data kind, and the notification deduplication
//! helpers layered on top of the store.

use super::{Cache, Ttl};
use crate::core::SyncError;
use serde_json::Value;

/// The kinds of data the service caches, each with its own expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Character,
    Corporation,
    Alliance,
    UniverseType,
    MapData,
    System,
    ItemPrice,
    Killmail,
    License,
    NotificationDedup,
    HealthCheck,
}

impl CacheKind {
    /// The preset expiry in milliseconds.
    pub fn ttl_ms(self) -> u64 {
        const HOUR: u64 = 60 * 60 * 1000;
        const MINUTE: u64 = 60 * 1000;
        match self {
            CacheKind::Character
            | CacheKind::Corporation
            | CacheKind::Alliance
            | CacheKind::UniverseType => 24 * HOUR,
            CacheKind::MapData | CacheKind::System => HOUR,
            CacheKind::ItemPrice => 6 * HOUR,
            CacheKind::Killmail => 30 * MINUTE,
            CacheKind::License => 20 * MINUTE,
            CacheKind::NotificationDedup => 30 * MINUTE,
            CacheKind::HealthCheck => 1000,
        }
    }

    /// The namespace the kind's keys live under.
    pub fn namespace(self) -> &'static str {
        match self {
            CacheKind::Character => "character",
            CacheKind::Corporation => "corporation",
            CacheKind::Alliance => "alliance",
            CacheKind::UniverseType => "universe_type",
            CacheKind::MapData => "map_data",
            CacheKind::System => "system",
            CacheKind::ItemPrice => "item_price",
            CacheKind::Killmail => "killmail",
            CacheKind::License => "license",
            CacheKind::NotificationDedup => "notification_dedup",
            CacheKind::HealthCheck => "health_check",
        }
    }
}

/// The deduplicated notification categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupKind {
    System,
    Character,
    Killmail,
}

impl DedupKind {
    fn tag(self) -> &'static str {
        match self {
            DedupKind::System => "system",
            DedupKind::Character => "character",
            DedupKind::Killmail => "killmail",
        }
    }
}

/// Result of a `check_and_mark` dedup probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupStatus {
    /// The identifier had not been seen inside the dedup window.
    New,
    Duplicate,
}

impl Cache {
    /// Maps a tagged identifier to a namespaced key and marks it seen.
    /// Returns `New` iff the key was absent and was just written. The probe
    /// is atomic: concurrent callers agree on a single `New`.
    pub fn check_and_mark(&self, kind: DedupKind, id: &str) -> Result<DedupStatus, SyncError> {
        let key = format!(
            "{}:{}:{}",
            CacheKind::NotificationDedup.namespace(),
            kind.tag(),
            id
        );
        let status = self.mark_if_absent(
            &key,
            Value::Bool(true),
            Ttl::Millis(CacheKind::NotificationDedup.ttl_ms()),
        );
        Ok(status)
    }
}
