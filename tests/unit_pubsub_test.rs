use wanderer_sync::core::pubsub::{BusMessage, PubSubManager, server_topic};

fn data_updated(map_id: &str) -> BusMessage {
    BusMessage::DataUpdated {
        map_id: map_id.to_string(),
    }
}

#[tokio::test]
async fn test_broadcast_reaches_subscriber() {
    let pubsub = PubSubManager::new();
    let mut rx = pubsub.subscribe("https://map.example/alpha");
    let delivered = pubsub.broadcast("https://map.example/alpha", data_updated("m1"));
    assert_eq!(delivered, 1);
    let message = rx.recv().await.unwrap();
    assert!(matches!(message, BusMessage::DataUpdated { map_id } if map_id == "m1"));
}

#[tokio::test]
async fn test_broadcast_without_subscribers_is_dropped() {
    let pubsub = PubSubManager::new();
    assert_eq!(pubsub.broadcast("nobody-home", data_updated("m1")), 0);
}

#[tokio::test]
async fn test_per_topic_fifo_order() {
    let pubsub = PubSubManager::new();
    let mut rx = pubsub.subscribe("topic");
    for i in 0..50 {
        pubsub.broadcast("topic", data_updated(&format!("m{i}")));
    }
    for i in 0..50 {
        let message = rx.recv().await.unwrap();
        match message {
            BusMessage::DataUpdated { map_id } => assert_eq!(map_id, format!("m{i}")),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_topics_are_independent() {
    let pubsub = PubSubManager::new();
    let mut rx_a = pubsub.subscribe("a");
    let mut rx_b = pubsub.subscribe("b");
    pubsub.broadcast("a", data_updated("only-a"));
    assert!(matches!(
        rx_a.recv().await.unwrap(),
        BusMessage::DataUpdated { map_id } if map_id == "only-a"
    ));
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn test_every_subscriber_receives_a_copy() {
    let pubsub = PubSubManager::new();
    let mut rx1 = pubsub.subscribe("topic");
    let mut rx2 = pubsub.subscribe("topic");
    let delivered = pubsub.broadcast("topic", data_updated("m1"));
    assert_eq!(delivered, 2);
    assert!(rx1.recv().await.is_ok());
    assert!(rx2.recv().await.is_ok());
}

#[tokio::test]
async fn test_purge_empty_topics() {
    let pubsub = PubSubManager::new();
    {
        let _rx = pubsub.subscribe("short-lived");
    }
    pubsub.subscribe("kept"); // receiver dropped immediately as well
    let mut _kept = pubsub.subscribe("kept");

    let purged = pubsub.purge_empty_topics();
    assert_eq!(purged, 1);
    assert_eq!(pubsub.topics(), vec!["kept".to_string()]);
    assert_eq!(pubsub.subscriber_count("kept"), 1);
}

#[tokio::test]
async fn test_server_topic_format() {
    assert_eq!(server_topic("map-1"), "server:map-1");
}
