// src/core/pubsub/mod.rs

//! The in-process publish-subscribe bus.
//!
//! Topics are strings: a map's `url` carries that map's events, and
//! `server:<map_id>` carries server-scoped control messages. Delivery is
//! best-effort per subscriber over bounded broadcast channels; a slow
//! consumer never blocks the broadcaster.

use crate::core::map::types::Connection;
use crate::core::sse::events::MapEvent;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::debug;

/// The capacity of each per-topic broadcast channel. A subscriber that falls
/// further behind than this loses the oldest messages (and logs the drop).
const TOPIC_CAPACITY: usize = 128;

/// The typed message set carried on the bus.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// A validated inbound SSE event, routed to the owning map's topic.
    Event(MapEvent),
    /// Main instructs a satellite to upsert a system (positions stripped).
    UpdateSystem { system: Value },
    /// Main instructs a satellite to remove a system.
    RemoveSystem { solar_system_id: i64 },
    /// Main instructs a satellite to upsert a connection.
    AddConnection { connection: Connection },
    /// Main instructs a satellite to remove a connection.
    RemoveConnection { source: i64, target: i64 },
    /// A map's cached views were rebuilt.
    DataUpdated { map_id: String },
    /// Topology pass fan-out on `server:<map_id>`.
    BorderSystemsDetected { border_systems: Vec<i64> },
}

/// The topic name for server-scoped control messages of a map.
pub fn server_topic(map_id: &str) -> String {
    format!("server:{map_id}")
}

/// `PubSubManager` is the central hub for topic-addressed broadcast.
/// It uses `DashMap` for thread-safe management of topic subscriptions.
#[derive(Debug, Default)]
pub struct PubSubManager {
    topics: DashMap<String, Arc<Sender<BusMessage>>>,
}

impl PubSubManager {
    pub fn new() -> Self {
        Default::default()
    }

    /// Subscribes the caller to a topic, creating it on first use. Returns a
    /// `Receiver` the subscriber's select loop listens on.
    pub fn subscribe(&self, topic: &str) -> Receiver<BusMessage> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(broadcast::channel(TOPIC_CAPACITY).0))
            .value()
            .subscribe()
    }

    /// Unsubscribing is implicit: dropping the `Receiver` leaves the topic.
    /// Empty topics are reclaimed by `purge_empty_topics`.
    pub fn unsubscribe(&self, _topic: &str) {}

    /// Publishes a message to every current subscriber of `topic`, in the
    /// order this producer issues them. Returns the number of subscribers
    /// the message was delivered to.
    pub fn broadcast(&self, topic: &str, message: BusMessage) -> usize {
        match self.topics.get(topic) {
            // `send` fails only when there are no receivers; that is not an
            // error for a broadcast.
            Some(sender) => sender.send(message).unwrap_or(0),
            None => 0,
        }
    }

    /// A maintenance sweep that removes topics with no subscribers left.
    pub fn purge_empty_topics(&self) -> usize {
        let mut purged = 0;
        self.topics.retain(|_topic, sender| {
            if sender.receiver_count() == 0 {
                purged += 1;
                false
            } else {
                true
            }
        });
        if purged > 0 {
            debug!("Purged {} empty pub/sub topics.", purged);
        }
        purged
    }

    /// Returns a list of all active topics.
    pub fn topics(&self) -> Vec<String> {
        self.topics.iter().map(|e| e.key().clone()).collect()
    }

    /// Returns the number of subscribers on a specific topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |s| s.receiver_count())
    }
}
