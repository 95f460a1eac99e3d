// src/core/cache/namespace.rs

//! Namespace bookkeeping: the `__namespace_index__` key, prefix clearing,
//! and namespace listing.
//!
//! The index maps namespace → list of keys and is a superset of the live
//! keys with that prefix. It may lag briefly on writes but converges; a
//! missing index triggers a full-scan rebuild.

use super::{Cache, ClearOutcome, Entry, Ttl};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// The cache key holding the namespace index. Exempt from eviction.
pub const NAMESPACE_INDEX_KEY: &str = "__namespace_index__";

/// Options for `clear_namespace`.
#[derive(Debug, Clone, Copy)]
pub struct ClearOptions {
    /// Run the deletion on a background task and return immediately.
    pub asynchronous: bool,
    /// How many keys to delete per batch before yielding.
    pub batch_size: usize,
}

impl Default for ClearOptions {
    fn default() -> Self {
        Self {
            asynchronous: false,
            batch_size: 500,
        }
    }
}

fn namespace_of(key: &str) -> Option<&str> {
    if key == NAMESPACE_INDEX_KEY {
        return None;
    }
    key.split_once(':').map(|(ns, _)| ns)
}

impl Cache {
    /// Adds `key` to its namespace's index list. Read-modify-write while
    /// holding the index entry's shard guard.
    pub(crate) fn index_key(&self, key: &str) {
        let Some(ns) = namespace_of(key) else {
            return;
        };
        let now = Instant::now();
        self.entries
            .entry(NAMESPACE_INDEX_KEY.to_string())
            .and_modify(|entry| {
                if entry.is_expired(now) {
                    entry.value = Value::Object(Map::new());
                    entry.expires_at = None;
                }
                add_to_index(&mut entry.value, ns, key);
            })
            .or_insert_with(|| {
                let mut value = Value::Object(Map::new());
                add_to_index(&mut value, ns, key);
                Entry {
                    value,
                    expires_at: None,
                }
            });
    }

    /// Drops `key` from its namespace's index list.
    pub(crate) fn unindex_key(&self, key: &str) {
        let Some(ns) = namespace_of(key) else {
            return;
        };
        if let Some(mut entry) = self.entries.get_mut(NAMESPACE_INDEX_KEY) {
            remove_from_index(&mut entry.value, ns, key);
        }
    }

    /// Deletes all keys with prefix `"ns:"`. Uses the namespace index when
    /// present, else falls back to a full key scan (and rebuilds the index).
    /// Takes the cache by `Arc` so the async variant can outlive the caller.
    pub fn clear_namespace(self: Arc<Self>, ns: &str, opts: ClearOptions) -> ClearOutcome {
        let keys = self.namespace_keys(ns);

        if opts.asynchronous {
            let cache = Arc::clone(&self);
            let ns = ns.to_string();
            tokio::spawn(async move {
                let mut removed = 0usize;
                for batch in keys.chunks(opts.batch_size.max(1)) {
                    for key in batch {
                        cache.delete(key);
                        removed += 1;
                    }
                    tokio::task::yield_now().await;
                }
                info!("Cleared {} keys from namespace '{}' (async).", removed, ns);
            });
            return ClearOutcome::Async;
        }

        let mut removed = 0usize;
        for key in &keys {
            self.delete(key);
            removed += 1;
        }
        debug!("Cleared {} keys from namespace '{}'.", removed, ns);
        ClearOutcome::Cleared(removed)
    }

    /// The keys currently recorded for `ns`, from the index when it exists.
    /// An absent index falls back to a scan and schedules a rebuild.
    pub(crate) fn namespace_keys(&self, ns: &str) -> Vec<String> {
        let from_index = self
            .entries
            .get(NAMESPACE_INDEX_KEY)
            .and_then(|entry| entry.value.get(ns).cloned())
            .and_then(|keys| serde_json::from_value::<Vec<String>>(keys).ok());

        match from_index {
            Some(keys) => keys,
            None => {
                let prefix = format!("{ns}:");
                let keys: Vec<String> = self
                    .entries
                    .iter()
                    .map(|e| e.key().clone())
                    .filter(|k| k.starts_with(&prefix))
                    .collect();
                self.rebuild_namespace_index();
                keys
            }
        }
    }

    /// Rebuilds the namespace index from a full key scan.
    pub fn rebuild_namespace_index(&self) {
        let mut index = Map::new();
        for entry in self.entries.iter() {
            if let Some(ns) = namespace_of(entry.key()) {
                if let Some(keys) = index
                    .entry(ns.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()))
                    .as_array_mut()
                {
                    keys.push(Value::from(entry.key().clone()));
                }
            }
        }
        self.entries.insert(
            NAMESPACE_INDEX_KEY.to_string(),
            Entry {
                value: Value::Object(index),
                expires_at: None,
            },
        );
        debug!("Rebuilt the namespace index.");
    }

    /// Lists the namespaces currently known, from the index or a scan.
    pub fn list_namespaces(&self, use_index: bool) -> Vec<String> {
        if use_index {
            if let Some(entry) = self.entries.get(NAMESPACE_INDEX_KEY) {
                if let Some(map) = entry.value.as_object() {
                    let mut namespaces: Vec<String> = map.keys().cloned().collect();
                    namespaces.sort();
                    return namespaces;
                }
            }
        }
        let mut namespaces: Vec<String> = self
            .entries
            .iter()
            .filter_map(|e| namespace_of(e.key()).map(str::to_string))
            .collect();
        namespaces.sort();
        namespaces.dedup();
        namespaces
    }

    /// Stores a value with the TTL preset for `kind` (see `ttl.rs`).
    pub fn put_kind(
        &self,
        kind: super::CacheKind,
        key: &str,
        value: Value,
    ) -> Result<(), crate::core::SyncError> {
        self.put(key, value, Ttl::Millis(kind.ttl_ms()))
    }
}

fn add_to_index(index: &mut Value, ns: &str, key: &str) {
    if !index.is_object() {
        *index = Value::Object(Map::new());
    }
    let list = index
        .as_object_mut()
        .expect("index is an object")
        .entry(ns.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !list.is_array() {
        *list = Value::Array(Vec::new());
    }
    let keys = list.as_array_mut().expect("index list is an array");
    if !keys.iter().any(|k| k.as_str() == Some(key)) {
        keys.push(Value::from(key));
    }
}

fn remove_from_index(index: &mut Value, ns: &str, key: &str) {
    if let Some(keys) = index.get_mut(ns).and_then(Value::as_array_mut) {
        keys.retain(|k| k.as_str() != Some(key));
    }
}
