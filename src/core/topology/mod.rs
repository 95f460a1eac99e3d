// src/core/topology/mod.rs

//! The across-maps topology pass: border detection, notification fan-out,
//! and the deduplicated cached-view assembly.
//!
//! A border system appears in the main map with a non-empty neighbor set,
//! and in at least one other map whose neighbor set is non-empty and
//! disjoint from main's. In the assembly, maps are visited main-first and
//! each system or edge is claimed by the earliest map that holds it.

pub mod static_info;

use crate::core::SyncError;
use crate::core::cache::{Cache, CacheKind, Ttl};
use crate::core::map::types::{MapData, MapRecord};
use crate::core::map::views::load_raw_view;
use crate::core::metrics;
use crate::core::pubsub::{BusMessage, PubSubManager, server_topic};
use static_info::StaticInfoProvider;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// `solar_system_id → {map_id → neighbor ids}` across every map's raw view.
pub type ConnectionRegistry = HashMap<i64, BTreeMap<String, HashSet<i64>>>;

/// The per-map output of a pass.
pub type CachedByMapId = HashMap<String, MapData>;

pub struct TopologyPass {
    cache: Arc<Cache>,
    pubsub: Arc<PubSubManager>,
    static_info: Arc<dyn StaticInfoProvider>,
}

impl TopologyPass {
    pub fn new(
        cache: Arc<Cache>,
        pubsub: Arc<PubSubManager>,
        static_info: Arc<dyn StaticInfoProvider>,
    ) -> Self {
        Self {
            cache,
            pubsub,
            static_info,
        }
    }

    /// Runs one full pass over the given maps and returns the assembled
    /// views. Results are also parked in the cache for read-only consumers.
    pub async fn run(&self, maps: &[MapRecord]) -> Result<CachedByMapId, SyncError> {
        // Main first; satellite order is otherwise preserved.
        let mut ordered: Vec<&MapRecord> = maps.iter().collect();
        ordered.sort_by_key(|map| !map.is_main);

        let raw_views: HashMap<String, MapData> = ordered
            .iter()
            .map(|map| (map.id.clone(), load_raw_view(&self.cache, &map.id)))
            .collect();

        let registry = build_connection_registry(&ordered, &raw_views);
        let borders = detect_border_systems(&ordered, &registry);

        metrics::BORDER_SYSTEMS.set(borders.len() as f64);

        // Every map hears about the pass, borders or not.
        let mut border_ids: Vec<i64> = borders.keys().copied().collect();
        border_ids.sort_unstable();
        for map in &ordered {
            self.pubsub.broadcast(
                &server_topic(&map.id),
                BusMessage::BorderSystemsDetected {
                    border_systems: border_ids.clone(),
                },
            );
        }

        let mut assembled = self.assemble(&ordered, &raw_views, &borders).await;

        for (map_id, data) in &mut assembled {
            for system in &mut data.systems {
                if let Some(info) = self.static_info.static_info(system.solar_system_id).await {
                    system.static_info = Some(info);
                }
            }
            let key = format!("maps_cache:{map_id}:assembled");
            if let Ok(value) = serde_json::to_value(&data) {
                let _ = self
                    .cache
                    .put(&key, value, Ttl::Millis(CacheKind::MapData.ttl_ms()));
            }
        }

        metrics::TOPOLOGY_PASSES_TOTAL.inc();
        info!(
            maps = ordered.len(),
            borders = borders.len(),
            "Topology pass completed."
        );
        Ok(assembled)
    }

    /// Main-first deduplicated assembly: satellites keep only what earlier
    /// maps did not claim.
    async fn assemble(
        &self,
        ordered: &[&MapRecord],
        raw_views: &HashMap<String, MapData>,
        borders: &HashMap<i64, Vec<String>>,
    ) -> CachedByMapId {
        let mut used_systems: HashSet<i64> = HashSet::new();
        let mut used_connections: HashSet<(i64, i64)> = HashSet::new();
        let mut result = CachedByMapId::new();

        for map in ordered {
            let raw = raw_views.get(&map.id).cloned().unwrap_or_default();

            let mut systems = Vec::new();
            for mut system in raw.systems {
                if !used_systems.insert(system.solar_system_id) {
                    continue;
                }
                if let Some(border_maps) = borders.get(&system.solar_system_id) {
                    system.is_border = true;
                    system.border_maps = border_maps.clone();
                } else {
                    system.is_border = false;
                    system.border_maps = Vec::new();
                }
                systems.push(system);
            }
            let kept: HashSet<i64> = systems.iter().map(|s| s.solar_system_id).collect();

            // An edge survives only when this map kept both endpoints; an
            // endpoint claimed by an earlier map takes its edges with it.
            let mut connections = Vec::new();
            for connection in raw.connections {
                if kept.contains(&connection.solar_system_source)
                    && kept.contains(&connection.solar_system_target)
                    && used_connections.insert(connection.key())
                {
                    connections.push(connection);
                }
            }

            debug!(
                map_id = %map.id,
                systems = systems.len(),
                connections = connections.len(),
                "Assembled deduplicated view."
            );
            result.insert(
                map.id.clone(),
                MapData {
                    systems,
                    connections,
                },
            );
        }

        result
    }
}

/// Builds the per-system connection registry from the raw views. Systems
/// with no edges get an empty neighbor set; dangling edge endpoints that are
/// not systems of the map do not create entries.
pub fn build_connection_registry(
    ordered: &[&MapRecord],
    raw_views: &HashMap<String, MapData>,
) -> ConnectionRegistry {
    let mut registry: ConnectionRegistry = HashMap::new();

    for map in ordered {
        let Some(raw) = raw_views.get(&map.id) else {
            continue;
        };
        let known: HashSet<i64> = raw.systems.iter().map(|s| s.solar_system_id).collect();

        for system in &raw.systems {
            registry
                .entry(system.solar_system_id)
                .or_default()
                .entry(map.id.clone())
                .or_default();
        }
        for connection in &raw.connections {
            let (a, b) = (
                connection.solar_system_source,
                connection.solar_system_target,
            );
            if known.contains(&a) && known.contains(&b) {
                registry
                    .entry(a)
                    .or_default()
                    .entry(map.id.clone())
                    .or_default()
                    .insert(b);
                registry
                    .entry(b)
                    .or_default()
                    .entry(map.id.clone())
                    .or_default()
                    .insert(a);
            }
        }
    }

    registry
}

/// Border detection anchored on the main map. Returns
/// `solar_system_id → [map ids it belongs to, main first]`.
pub fn detect_border_systems(
    ordered: &[&MapRecord],
    registry: &ConnectionRegistry,
) -> HashMap<i64, Vec<String>> {
    let Some(main) = ordered.first().filter(|map| map.is_main) else {
        return HashMap::new();
    };

    let mut borders = HashMap::new();
    for (&solar_system_id, by_map) in registry {
        let Some(main_neighbors) = by_map.get(&main.id) else {
            continue;
        };
        if main_neighbors.is_empty() {
            // An edgeless main system is never a border.
            continue;
        }

        let others: Vec<&String> = ordered
            .iter()
            .skip(1)
            .filter(|map| by_map.contains_key(&map.id))
            .map(|map| &map.id)
            .collect();
        if others.is_empty() {
            continue;
        }

        let all_disjoint = others.iter().all(|map_id| {
            let neighbors = &by_map[map_id.as_str()];
            !neighbors.is_empty() && neighbors.is_disjoint(main_neighbors)
        });
        if !all_disjoint {
            continue;
        }

        let mut border_maps = vec![main.id.clone()];
        border_maps.extend(others.into_iter().cloned());
        borders.insert(solar_system_id, border_maps);
    }

    borders
}
