use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wanderer_sync::core::SyncError;
use wanderer_sync::core::cache::namespace::ClearOptions;
use wanderer_sync::core::cache::{Cache, ClearOutcome, NAMESPACE_INDEX_KEY, Ttl};

#[tokio::test]
async fn test_put_get_roundtrip() {
    let cache = Cache::new(1000);
    cache
        .put("map_data:m1", json!({"systems": []}), Ttl::Default)
        .unwrap();
    assert_eq!(cache.get("map_data:m1").unwrap(), json!({"systems": []}));
}

#[tokio::test]
async fn test_get_missing_key() {
    let cache = Cache::new(1000);
    assert_eq!(cache.get("map_data:absent"), Err(SyncError::KeyNotFound));
}

#[tokio::test]
async fn test_delete_removes_key() {
    let cache = Cache::new(1000);
    cache.put("system:1", json!(1), Ttl::Default).unwrap();
    assert!(cache.exists("system:1"));
    cache.delete("system:1");
    assert!(!cache.exists("system:1"));
}

#[tokio::test]
async fn test_ttl_expiry_on_read() {
    let cache = Cache::new(1000);
    cache.put("system:1", json!(1), Ttl::Millis(20)).unwrap();
    assert!(cache.exists("system:1"));
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(cache.get("system:1"), Err(SyncError::KeyNotFound));
}

#[tokio::test]
async fn test_infinity_ttl_never_expires() {
    let cache = Cache::new(1000);
    cache.put("license:status", json!(true), Ttl::Infinity).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(cache.exists("license:status"));
}

#[tokio::test]
async fn test_purge_expired_sweeps_dead_entries() {
    let cache = Cache::new(1000);
    cache.put("system:1", json!(1), Ttl::Millis(10)).unwrap();
    cache.put("system:2", json!(2), Ttl::Infinity).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let purged = cache.purge_expired();
    assert_eq!(purged, 1);
    assert!(cache.exists("system:2"));
}

#[tokio::test]
async fn test_batch_operations() {
    let cache = Cache::new(1000);
    cache
        .put_batch(vec![
            ("character:1".to_string(), json!("a")),
            ("character:2".to_string(), json!("b")),
        ])
        .unwrap();

    let fetched = cache.get_batch(&[
        "character:1".to_string(),
        "character:2".to_string(),
        "character:3".to_string(),
    ]);
    assert_eq!(fetched[0].1, Some(json!("a")));
    assert_eq!(fetched[1].1, Some(json!("b")));
    assert_eq!(fetched[2].1, None);
}

#[tokio::test]
async fn test_put_batch_with_ttl_groups() {
    let cache = Cache::new(1000);
    cache
        .put_batch_with_ttl(vec![
            ("killmail:1".to_string(), json!(1), Ttl::Millis(10)),
            ("killmail:2".to_string(), json!(2), Ttl::Infinity),
        ])
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!cache.exists("killmail:1"));
    assert!(cache.exists("killmail:2"));
}

#[tokio::test]
async fn test_clear_namespace_sync() {
    let cache = Arc::new(Cache::new(1000));
    cache.put("map_data:m1", json!(1), Ttl::Default).unwrap();
    cache.put("map_data:m2", json!(2), Ttl::Default).unwrap();
    cache.put("system:1", json!(3), Ttl::Default).unwrap();

    let outcome = cache.clone().clear_namespace("map_data", ClearOptions::default());
    assert_eq!(outcome, ClearOutcome::Cleared(2));
    assert!(!cache.exists("map_data:m1"));
    assert!(!cache.exists("map_data:m2"));
    assert!(cache.exists("system:1"));
}

#[tokio::test]
async fn test_clear_namespace_async() {
    let cache = Arc::new(Cache::new(1000));
    for i in 0..20 {
        cache
            .put(&format!("map_data:{i}"), json!(i), Ttl::Default)
            .unwrap();
    }
    let outcome = cache.clone().clear_namespace(
        "map_data",
        ClearOptions {
            asynchronous: true,
            batch_size: 5,
        },
    );
    assert_eq!(outcome, ClearOutcome::Async);

    // The background task drains the namespace shortly after.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!cache.exists("map_data:0"));
    assert!(!cache.exists("map_data:19"));
}

#[tokio::test]
async fn test_clear_namespace_without_index_falls_back_to_scan() {
    let cache = Arc::new(Cache::new(1000));
    cache.put("map_data:m1", json!(1), Ttl::Default).unwrap();
    // Simulate a lost index; the clear must still find the key by scan.
    cache.delete(NAMESPACE_INDEX_KEY);
    let outcome = cache.clone().clear_namespace("map_data", ClearOptions::default());
    assert_eq!(outcome, ClearOutcome::Cleared(1));
}

#[tokio::test]
async fn test_list_namespaces() {
    let cache = Cache::new(1000);
    cache.put("map_data:m1", json!(1), Ttl::Default).unwrap();
    cache.put("system:1", json!(2), Ttl::Default).unwrap();
    cache.put("system:2", json!(3), Ttl::Default).unwrap();

    let from_index = cache.list_namespaces(true);
    assert_eq!(from_index, vec!["map_data".to_string(), "system".to_string()]);
    let from_scan = cache.list_namespaces(false);
    assert_eq!(from_scan, vec!["map_data".to_string(), "system".to_string()]);
}

#[tokio::test]
async fn test_eviction_spares_namespace_index() {
    let cache = Cache::new(10);
    for i in 0..20 {
        cache
            .put(&format!("system:{i}"), json!(i), Ttl::Default)
            .unwrap();
    }
    // Over the hard limit, evictions have happened, but the index survives.
    assert!(cache.size() < 20);
    assert!(cache.exists(NAMESPACE_INDEX_KEY));
    let stats = cache.stats();
    assert!(stats.evictions > 0);
}

#[tokio::test]
async fn test_stats_counts_hits_and_misses() {
    let cache = Cache::new(1000);
    cache.put("system:1", json!(1), Ttl::Default).unwrap();
    let _ = cache.get("system:1");
    let _ = cache.get("system:2");
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_check_and_mark_dedup() {
    use wanderer_sync::core::cache::ttl::{DedupKind, DedupStatus};
    let cache = Cache::new(1000);
    assert_eq!(
        cache.check_and_mark(DedupKind::Killmail, "km-1").unwrap(),
        DedupStatus::New
    );
    assert_eq!(
        cache.check_and_mark(DedupKind::Killmail, "km-1").unwrap(),
        DedupStatus::Duplicate
    );
    assert_eq!(
        cache.check_and_mark(DedupKind::System, "km-1").unwrap(),
        DedupStatus::New
    );
}
