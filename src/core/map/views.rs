// src/core/map/views.rs

//! Cached-view storage and the home-reachability filter.
//!
//! Two tiers per map: the raw view (`maps_all_data_cache:<map_id>`) holds
//! everything the remote last returned or events last modified; the filtered
//! view (`maps_cache:<map_id>`) holds the subgraph reachable from the home
//! system, stamped with the owning map id.

use super::types::MapData;
use crate::core::SyncError;
use crate::core::cache::{Cache, CacheKind, Ttl};
use std::collections::{HashMap, HashSet, VecDeque};

pub const RAW_VIEW_NS: &str = "maps_all_data_cache";
pub const FILTERED_VIEW_NS: &str = "maps_cache";
pub const SHARED_NS: &str = "maps_shared_cache";

pub fn raw_view_key(map_id: &str) -> String {
    format!("{RAW_VIEW_NS}:{map_id}")
}

pub fn filtered_view_key(map_id: &str) -> String {
    format!("{FILTERED_VIEW_NS}:{map_id}")
}

/// Boolean flag set once a map actor has completed start-up.
pub fn started_key(map_id: &str) -> String {
    format!("{FILTERED_VIEW_NS}:{map_id}:started")
}

/// Holds the id of the current main map.
pub fn main_map_key() -> String {
    format!("{SHARED_NS}:main")
}

/// A missing raw view reads as an empty one.
pub fn load_raw_view(cache: &Cache, map_id: &str) -> MapData {
    cache
        .get(&raw_view_key(map_id))
        .ok()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

pub fn load_filtered_view(cache: &Cache, map_id: &str) -> MapData {
    cache
        .get(&filtered_view_key(map_id))
        .ok()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

/// Rebuilds and stores both view tiers from the given raw data.
pub fn store_views(cache: &Cache, map_id: &str, raw: &MapData) -> Result<(), SyncError> {
    let raw_value = serde_json::to_value(raw)?;
    cache.put(
        &raw_view_key(map_id),
        raw_value,
        Ttl::Millis(CacheKind::MapData.ttl_ms()),
    )?;

    let filtered = filtered_view(map_id, raw);
    let filtered_value = serde_json::to_value(&filtered)?;
    cache.put(
        &filtered_view_key(map_id),
        filtered_value,
        Ttl::Millis(CacheKind::MapData.ttl_ms()),
    )?;
    Ok(())
}

/// The subgraph reachable by breadth-first traversal from the home system.
/// Without a home the filtered view is empty. Retained systems have their
/// `map_id` rewritten to the owning map.
pub fn filtered_view(map_id: &str, raw: &MapData) -> MapData {
    let Some(home) = raw.home() else {
        return MapData::default();
    };

    let known: HashSet<i64> = raw.systems.iter().map(|s| s.solar_system_id).collect();

    let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();
    for connection in &raw.connections {
        adjacency
            .entry(connection.solar_system_source)
            .or_default()
            .push(connection.solar_system_target);
        adjacency
            .entry(connection.solar_system_target)
            .or_default()
            .push(connection.solar_system_source);
    }

    let mut reachable: HashSet<i64> = HashSet::new();
    let mut queue = VecDeque::from([home.solar_system_id]);
    reachable.insert(home.solar_system_id);
    while let Some(current) = queue.pop_front() {
        for &neighbor in adjacency.get(&current).into_iter().flatten() {
            // Dangling edges may name systems missing from the raw view.
            if known.contains(&neighbor) && reachable.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }

    let systems = raw
        .systems
        .iter()
        .filter(|s| reachable.contains(&s.solar_system_id))
        .cloned()
        .map(|mut s| {
            s.map_id = Some(map_id.to_string());
            s
        })
        .collect();
    let connections = raw
        .connections
        .iter()
        .filter(|c| {
            reachable.contains(&c.solar_system_source)
                && reachable.contains(&c.solar_system_target)
        })
        .copied()
        .collect();

    MapData {
        systems,
        connections,
    }
}
