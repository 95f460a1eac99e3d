// src/core/map/registry.rs

//! The process registry for map actors: `map_id → handle`, with
//! lookup-then-send addressing.

use super::types::System;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Commands a map actor accepts on its mailbox, besides bus messages.
#[derive(Debug)]
pub enum MapCommand {
    /// Reads one system from the actor's raw view.
    GetSystem {
        solar_system_id: i64,
        reply: oneshot::Sender<Option<System>>,
    },
    /// Forces a full refresh from the remote REST API.
    RefreshNow,
    Stop,
}

/// A cloneable address for one map actor.
#[derive(Debug, Clone)]
pub struct MapActorHandle {
    pub map_id: String,
    tx: mpsc::Sender<MapCommand>,
}

impl MapActorHandle {
    pub fn new(map_id: String, tx: mpsc::Sender<MapCommand>) -> Self {
        Self { map_id, tx }
    }

    /// Fetches a system from the actor's raw view; `None` when the actor is
    /// gone or does not hold the system.
    pub async fn get_system(&self, solar_system_id: i64) -> Option<System> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MapCommand::GetSystem {
                solar_system_id,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    pub async fn refresh_now(&self) {
        let _ = self.tx.send(MapCommand::RefreshNow).await;
    }

    pub async fn stop(&self) {
        let _ = self.tx.send(MapCommand::Stop).await;
    }
}

/// `map_id → actor handle`. Handles are replaced on actor restart.
#[derive(Debug, Default)]
pub struct MapRegistry {
    actors: DashMap<String, MapActorHandle>,
}

impl MapRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register(&self, handle: MapActorHandle) {
        debug!(map_id = %handle.map_id, "Map actor registered.");
        self.actors.insert(handle.map_id.clone(), handle);
    }

    pub fn unregister(&self, map_id: &str) {
        self.actors.remove(map_id);
    }

    pub fn lookup(&self, map_id: &str) -> Option<MapActorHandle> {
        self.actors.get(map_id).map(|h| h.clone())
    }

    pub fn ids(&self) -> Vec<String> {
        self.actors.iter().map(|e| e.key().clone()).collect()
    }
}
