use std::sync::Arc;
use wanderer_sync::core::monitor::ConnectionMonitor;
use wanderer_sync::core::pubsub::PubSubManager;
use wanderer_sync::core::sse::{SseClient, SseClientConfig};

fn client(config: SseClientConfig) -> SseClient {
    SseClient::new(
        config,
        Arc::new(PubSubManager::new()),
        Arc::new(ConnectionMonitor::new()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_stream_url_assembly() {
    let config = SseClientConfig::new("M1", "https://map.example.com/alpha", "token");
    let client = client(config);
    let url = client.stream_url().unwrap();
    assert!(url.starts_with("https://map.example.com/api/maps/alpha/events/stream?"));
    assert!(url.contains(
        "events=add_system%2Cdeleted_system%2Cconnection_added%2Cconnection_removed%2Cconnection_updated%2Csystem_metadata_changed"
    ));
    assert!(!url.contains("last_event_id"));
}

#[tokio::test]
async fn test_stream_url_carries_resume_point() {
    let mut config = SseClientConfig::new("M1", "https://map.example.com/alpha", "token");
    config.last_event_id = Some("01HXYZ".to_string());
    let client = client(config);
    let url = client.stream_url().unwrap();
    assert!(url.contains("last_event_id=01HXYZ"));
    assert_eq!(client.last_event_id(), Some("01HXYZ"));
}

#[tokio::test]
async fn test_stream_url_preserves_port_and_scheme() {
    let config = SseClientConfig::new("M1", "http://localhost:4001/beta", "token");
    let client = client(config);
    let url = client.stream_url().unwrap();
    assert!(url.starts_with("http://localhost:4001/api/maps/beta/events/stream?"));
}

#[tokio::test]
async fn test_custom_event_filter() {
    let mut config = SseClientConfig::new("M1", "https://map.example.com/alpha", "token");
    config.events = vec!["add_system".to_string()];
    let client = client(config);
    let url = client.stream_url().unwrap();
    assert!(url.contains("events=add_system"));
    assert!(!url.contains("deleted_system"));
}

#[tokio::test]
async fn test_connection_id_shape() {
    let config = SseClientConfig::new("M1", "https://map.example.com/alpha", "token");
    assert_eq!(client(config).connection_id(), "sse:M1");
}
