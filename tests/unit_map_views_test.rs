use serde_json::json;
use wanderer_sync::core::cache::Cache;
use wanderer_sync::core::map::types::{Connection, MapData, System};
use wanderer_sync::core::map::views::{
    filtered_view, load_raw_view, main_map_key, raw_view_key, started_key, store_views,
};

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

#[test]
fn test_filtered_view_without_home_is_empty() {
    let raw = MapData {
        systems: vec![system(1, 0), system(2, 0)],
        connections: vec![Connection::new(1, 2)],
    };
    let filtered = filtered_view("m1", &raw);
    assert!(filtered.systems.is_empty());
    assert!(filtered.connections.is_empty());
}

#[test]
fn test_filtered_view_reaches_connected_component_only() {
    let raw = MapData {
        systems: vec![system(1, 1), system(2, 0), system(3, 0), system(4, 0)],
        connections: vec![Connection::new(1, 2), Connection::new(3, 4)],
    };
    let filtered = filtered_view("m1", &raw);
    let ids: Vec<i64> = filtered.systems.iter().map(|s| s.solar_system_id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(filtered.connections, vec![Connection::new(1, 2)]);
}

#[test]
fn test_filtered_view_ignores_dangling_edges() {
    // Systems {A(home), B, C}, edges {A-B, X-C} with X absent.
    let raw = MapData {
        systems: vec![system(1, 1), system(2, 0), system(3, 0)],
        connections: vec![Connection::new(1, 2), Connection::new(99, 3)],
    };
    let filtered = filtered_view("m1", &raw);
    let ids: Vec<i64> = filtered.systems.iter().map(|s| s.solar_system_id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(filtered.connections, vec![Connection::new(1, 2)]);
}

#[test]
fn test_filtered_view_stamps_owning_map_id() {
    let raw = MapData {
        systems: vec![system(1, 1)],
        connections: vec![],
    };
    let filtered = filtered_view("map-7", &raw);
    assert_eq!(filtered.systems[0].map_id.as_deref(), Some("map-7"));
}

#[test]
fn test_store_and_load_views_roundtrip() {
    let cache = Cache::new(1000);
    let raw = MapData {
        systems: vec![system(1, 1), system(2, 0)],
        connections: vec![Connection::new(1, 2)],
    };
    store_views(&cache, "m1", &raw).unwrap();

    let loaded = load_raw_view(&cache, "m1");
    assert_eq!(loaded, raw);

    // The filtered tier landed under the maps_cache namespace.
    assert!(cache.exists("maps_cache:m1"));
}

#[test]
fn test_missing_raw_view_reads_as_empty() {
    let cache = Cache::new(1000);
    assert_eq!(load_raw_view(&cache, "ghost"), MapData::default());
}

#[test]
fn test_cache_key_shapes() {
    assert_eq!(raw_view_key("m1"), "maps_all_data_cache:m1");
    assert_eq!(started_key("m1"), "maps_cache:m1:started");
    assert_eq!(main_map_key(), "maps_shared_cache:main");
}

#[test]
fn test_upsert_system_is_idempotent() {
    let mut data = MapData::default();
    data.upsert_system(system(1, 0));
    let snapshot = data.clone();
    data.upsert_system(system(1, 0));
    assert_eq!(data, snapshot);
}

#[test]
fn test_upsert_connection_is_undirected() {
    let mut data = MapData::default();
    data.upsert_connection(Connection::new(1, 2));
    data.upsert_connection(Connection::new(2, 1));
    assert_eq!(data.connections.len(), 1);
    assert!(data.remove_connection(2, 1));
    assert!(data.connections.is_empty());
}

#[test]
fn test_connection_normalizes_long_field_names() {
    let payload = json!({
        "payload": {
            "solar_system_source_id": 31000001,
            "solar_system_target_id": 31000002
        }
    });
    let connection = Connection::from_payload(&payload).unwrap();
    assert_eq!(connection.solar_system_source, 31000001);
    assert_eq!(connection.solar_system_target, 31000002);
}

#[test]
fn test_system_from_nested_payload() {
    let payload = json!({
        "payload": {"solar_system_id": 30000142, "name": "Jita", "status": 0}
    });
    let system = System::from_payload(&payload).unwrap();
    assert_eq!(system.solar_system_id, 30000142);
    assert_eq!(system.name, "Jita");
}

#[test]
fn test_label_roundtrip() {
    let mut system = system(1, 0);
    assert!(system.labels_vec().is_empty());
    assert!(system.add_label("c"));
    assert!(!system.add_label("c"));
    assert_eq!(system.labels_vec(), vec!["c".to_string()]);
    assert_eq!(system.labels.as_deref(), Some("{\"labels\":[\"c\"]}"));
    assert!(system.remove_label("c"));
    assert!(!system.remove_label("c"));
    assert!(system.labels_vec().is_empty());
}

#[test]
fn test_upsert_value_strips_positions() {
    let mut system = system(1, 0);
    system.position_x = 12.5;
    system.position_y = -3.0;
    let value = system.to_upsert_value();
    assert!(value.get("position_x").is_none());
    assert!(value.get("position_y").is_none());
    assert_eq!(value.get("solar_system_id"), Some(&json!(1)));
}
