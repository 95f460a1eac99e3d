use serde_json::json;
use std::sync::Arc;
use wanderer_sync::core::cache::{Cache, Ttl};
use wanderer_sync::core::map::types::{Connection, MapData, MapRecord, System};
use wanderer_sync::core::map::views::store_views;
use wanderer_sync::core::pubsub::{BusMessage, PubSubManager, server_topic};
use wanderer_sync::core::topology::static_info::{
    CachedStaticInfo, NoopStaticInfo, StaticInfoProvider,
};
use wanderer_sync::core::topology::{
    TopologyPass, build_connection_registry, detect_border_systems,
};

fn record(id: &str, is_main: bool) -> MapRecord {
    MapRecord {
        id: id.to_string(),
        url: format!("https://map.example.com/{id}"),
        public_api_key: format!("key-{id}"),
        color: None,
        title: None,
        is_main,
        main_system_eve_id: None,
    }
}

fn system(id: i64, status: i64) -> System {
    System {
        solar_system_id: id,
        name: format!("sys-{id}"),
        position_x: 0.0,
        position_y: 0.0,
        status,
        labels: None,
        static_info: None,
        is_border: false,
        border_maps: Vec::new(),
        map_id: None,
    }
}

/// The minimal border scenario: main holds {A,B,C} with A-B, B-C; the
/// satellite holds {B,D,E} with B-D, D-E. B's neighbor sets ({A,C} vs
/// {D}) are disjoint and non-empty, so B is the border.
fn seed_minimal_border(cache: &Cache) -> (MapRecord, MapRecord) {
    let main = record("main", true);
    let sat = record("sat", false);

    let main_data = MapData {
        systems: vec![system(1, 1), system(2, 0), system(3, 0)],
        connections: vec![Connection::new(1, 2), Connection::new(2, 3)],
    };
    let sat_data = MapData {
        systems: vec![system(2, 1), system(4, 0), system(5, 0)],
        connections: vec![Connection::new(2, 4), Connection::new(4, 5)],
    };
    store_views(cache, "main", &main_data).unwrap();
    store_views(cache, "sat", &sat_data).unwrap();
    (main, sat)
}

#[test]
fn test_connection_registry_shape() {
    let cache = Cache::new(10_000);
    let (main, sat) = seed_minimal_border(&cache);
    let ordered = [&main, &sat];
    let raw_views = std::collections::HashMap::from([
        (
            "main".to_string(),
            wanderer_sync::core::map::views::load_raw_view(&cache, "main"),
        ),
        (
            "sat".to_string(),
            wanderer_sync::core::map::views::load_raw_view(&cache, "sat"),
        ),
    ]);
    let registry = build_connection_registry(&ordered, &raw_views);

    // B (id 2) is known to both maps with different neighbors.
    let entry = &registry[&2];
    assert_eq!(
        entry["main"],
        std::collections::HashSet::from([1i64, 3i64])
    );
    assert_eq!(entry["sat"], std::collections::HashSet::from([4i64]));
}

#[test]
fn test_border_detection_minimal() {
    let cache = Cache::new(10_000);
    let (main, sat) = seed_minimal_border(&cache);
    let ordered = [&main, &sat];
    let raw_views = std::collections::HashMap::from([
        (
            "main".to_string(),
            wanderer_sync::core::map::views::load_raw_view(&cache, "main"),
        ),
        (
            "sat".to_string(),
            wanderer_sync::core::map::views::load_raw_view(&cache, "sat"),
        ),
    ]);
    let registry = build_connection_registry(&ordered, &raw_views);
    let borders = detect_border_systems(&ordered, &registry);

    assert_eq!(borders.len(), 1);
    assert_eq!(borders[&2], vec!["main".to_string(), "sat".to_string()]);
}

#[test]
fn test_border_requires_disjoint_neighbors() {
    let cache = Cache::new(10_000);
    let main = record("main", true);
    let sat = record("sat", false);

    // Shared neighbor 3 in both maps: not disjoint, not a border.
    let main_data = MapData {
        systems: vec![system(2, 1), system(3, 0)],
        connections: vec![Connection::new(2, 3)],
    };
    let sat_data = MapData {
        systems: vec![system(2, 1), system(3, 0)],
        connections: vec![Connection::new(2, 3)],
    };
    store_views(&cache, "main", &main_data).unwrap();
    store_views(&cache, "sat", &sat_data).unwrap();

    let ordered = [&main, &sat];
    let raw_views = std::collections::HashMap::from([
        (
            "main".to_string(),
            wanderer_sync::core::map::views::load_raw_view(&cache, "main"),
        ),
        (
            "sat".to_string(),
            wanderer_sync::core::map::views::load_raw_view(&cache, "sat"),
        ),
    ]);
    let registry = build_connection_registry(&ordered, &raw_views);
    assert!(detect_border_systems(&ordered, &registry).is_empty());
}

#[test]
fn test_edgeless_main_system_is_never_a_border() {
    let cache = Cache::new(10_000);
    let main = record("main", true);
    let sat = record("sat", false);

    let main_data = MapData {
        systems: vec![system(2, 1)],
        connections: vec![],
    };
    let sat_data = MapData {
        systems: vec![system(2, 1), system(4, 0)],
        connections: vec![Connection::new(2, 4)],
    };
    store_views(&cache, "main", &main_data).unwrap();
    store_views(&cache, "sat", &sat_data).unwrap();

    let ordered = [&main, &sat];
    let raw_views = std::collections::HashMap::from([
        (
            "main".to_string(),
            wanderer_sync::core::map::views::load_raw_view(&cache, "main"),
        ),
        (
            "sat".to_string(),
            wanderer_sync::core::map::views::load_raw_view(&cache, "sat"),
        ),
    ]);
    let registry = build_connection_registry(&ordered, &raw_views);
    assert!(detect_border_systems(&ordered, &registry).is_empty());
}

#[tokio::test]
async fn test_full_pass_minimal_scenario() {
    let cache = Arc::new(Cache::new(10_000));
    let pubsub = Arc::new(PubSubManager::new());
    let (main, sat) = seed_minimal_border(&cache);

    let mut main_rx = pubsub.subscribe(&server_topic("main"));
    let mut sat_rx = pubsub.subscribe(&server_topic("sat"));

    let pass = TopologyPass::new(cache.clone(), pubsub.clone(), Arc::new(NoopStaticInfo));
    let assembled = pass.run(&[main, sat]).await.unwrap();

    // Every map hears the result, even with zero borders of its own.
    for rx in [&mut main_rx, &mut sat_rx] {
        match rx.recv().await.unwrap() {
            BusMessage::BorderSystemsDetected { border_systems } => {
                assert_eq!(border_systems, vec![2]);
            }
            other => panic!("expected border notification, got {other:?}"),
        }
    }

    // Main claims all of its systems and edges.
    let main_view = &assembled["main"];
    let main_ids: Vec<i64> = main_view.systems.iter().map(|s| s.solar_system_id).collect();
    assert_eq!(main_ids, vec![1, 2, 3]);
    assert_eq!(main_view.connections.len(), 2);

    // The satellite keeps only what main did not claim.
    let sat_view = &assembled["sat"];
    let sat_ids: Vec<i64> = sat_view.systems.iter().map(|s| s.solar_system_id).collect();
    assert_eq!(sat_ids, vec![4, 5]);
    assert_eq!(sat_view.connections, vec![Connection::new(4, 5)]);

    // B is enriched as a border in main's output.
    let border = main_view.systems.iter().find(|s| s.solar_system_id == 2).unwrap();
    assert!(border.is_border);
    assert_eq!(
        border.border_maps,
        vec!["main".to_string(), "sat".to_string()]
    );
    let plain = main_view.systems.iter().find(|s| s.solar_system_id == 1).unwrap();
    assert!(!plain.is_border);

    // The assembled views are parked for read-only consumers.
    assert!(cache.exists("maps_cache:main:assembled"));
    assert!(cache.exists("maps_cache:sat:assembled"));
}

#[tokio::test]
async fn test_static_info_enrichment_from_cache() {
    let cache = Arc::new(Cache::new(10_000));
    let pubsub = Arc::new(PubSubManager::new());
    let (main, sat) = seed_minimal_border(&cache);

    cache
        .put(
            "system:1",
            json!({"security_status": -0.9, "class": "C5"}),
            Ttl::Default,
        )
        .unwrap();

    let provider = Arc::new(CachedStaticInfo::new(cache.clone()));
    let pass = TopologyPass::new(cache, pubsub, provider);
    let assembled = pass.run(&[main, sat]).await.unwrap();

    let enriched = assembled["main"]
        .systems
        .iter()
        .find(|s| s.solar_system_id == 1)
        .unwrap();
    assert_eq!(
        enriched.static_info,
        Some(json!({"security_status": -0.9, "class": "C5"}))
    );
    // Systems without a parked blob stay unenriched.
    let plain = assembled["main"]
        .systems
        .iter()
        .find(|s| s.solar_system_id == 3)
        .unwrap();
    assert!(plain.static_info.is_none());
}

#[tokio::test]
async fn test_cached_static_info_provider() {
    let cache = Arc::new(Cache::new(1000));
    let provider = CachedStaticInfo::new(cache.clone());
    assert!(provider.static_info(42).await.is_none());
    cache.put("system:42", json!({"name": "X"}), Ttl::Default).unwrap();
    assert_eq!(provider.static_info(42).await, Some(json!({"name": "X"})));
}

#[tokio::test]
async fn test_duplicate_edge_claimed_once() {
    let cache = Arc::new(Cache::new(10_000));
    let pubsub = Arc::new(PubSubManager::new());
    let main = record("main", true);
    let sat = record("sat", false);

    // Both maps hold the same edge (in opposite orientations).
    let main_data = MapData {
        systems: vec![system(1, 1), system(2, 0)],
        connections: vec![Connection::new(1, 2)],
    };
    let sat_data = MapData {
        systems: vec![system(1, 1), system(2, 0)],
        connections: vec![Connection::new(2, 1)],
    };
    store_views(&cache, "main", &main_data).unwrap();
    store_views(&cache, "sat", &sat_data).unwrap();

    let pass = TopologyPass::new(cache, pubsub, Arc::new(NoopStaticInfo));
    let assembled = pass.run(&[sat.clone(), main.clone()]).await.unwrap();

    // Main is visited first regardless of input order.
    assert_eq!(assembled["main"].systems.len(), 2);
    assert_eq!(assembled["main"].connections.len(), 1);
    assert!(assembled["sat"].systems.is_empty());
    assert!(assembled["sat"].connections.is_empty());
}
