// src/core/map/actor.rs

//! The per-map actor: a long-lived task that applies inbound events to the
//! raw view, reconciles with the remote REST API, propagates changes between
//! the main map and satellites, and rebuilds the cached views after every
//! mutation.

use super::api_client::MapApi;
use super::registry::{MapCommand, MapRegistry};
use super::store::MapStore;
use super::types::{BORDER_LABEL, Connection, MapData, MapRecord, System};
use super::views::{load_raw_view, main_map_key, started_key, store_views};
use crate::core::SyncError;
use crate::core::cache::{Cache, Ttl};
use crate::core::pubsub::{BusMessage, PubSubManager, server_topic};
use crate::core::sse::events::{EventKind, MapEvent};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Delay before the scheduled stop of an actor that could not bind its
/// remote identity, and before the first data refresh.
const STARTUP_GRACE: Duration = Duration::from_millis(100);

/// Everything a map actor needs from the outside.
#[derive(Clone)]
pub struct MapDeps {
    pub cache: Arc<Cache>,
    pub pubsub: Arc<PubSubManager>,
    pub api: Arc<dyn MapApi>,
    pub store: Arc<dyn MapStore>,
    pub registry: Arc<MapRegistry>,
    pub refresh_interval: Duration,
    /// Nudges the topology scheduler after a raw-view mutation.
    pub topology_trigger: mpsc::Sender<()>,
}

/// The per-map state machine.
pub struct MapActor {
    map_id: String,
    deps: MapDeps,
    map: MapRecord,
    /// Id returned by the remote identity endpoint; bound during boot.
    server_map_id: Option<String>,
    raw: MapData,
    last_api_refresh_at: Option<std::time::Instant>,
}

impl MapActor {
    /// Boots and runs the actor: `init → load_state → start_map`, then the
    /// event loop until stop or shutdown.
    pub async fn run(
        map_id: String,
        deps: MapDeps,
        mut commands: mpsc::Receiver<MapCommand>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        // load_state: the Map record comes from the CRUD facade.
        let map = match deps.store.get_map(&map_id).await {
            Ok(map) => map,
            Err(error) => {
                error!(%map_id, %error, "Failed to load map record; actor exiting.");
                return;
            }
        };

        if map.is_main {
            let _ = deps
                .cache
                .put(&main_map_key(), json!(map.id.clone()), Ttl::Infinity);
        }

        let server_map_id = match deps.api.get_map_identity(&map).await {
            Ok(id) => Some(id),
            Err(error) => {
                warn!(%map_id, %error, "Could not bind remote map identity.");
                None
            }
        };

        // start_map: without a bound identity the actor stops shortly.
        if server_map_id.is_none() {
            warn!(%map_id, "No remote identity; stopping map actor.");
            tokio::time::sleep(STARTUP_GRACE).await;
            return;
        }

        let mut map_rx = deps.pubsub.subscribe(&map.url);
        let mut server_rx = deps.pubsub.subscribe(&server_topic(&map.id));
        let _ = deps
            .cache
            .put(&started_key(&map.id), json!(true), Ttl::Infinity);

        let raw = load_raw_view(&deps.cache, &map.id);
        let mut actor = Self {
            map_id: map_id.clone(),
            deps: deps.clone(),
            map,
            server_map_id,
            raw,
            last_api_refresh_at: None,
        };

        info!(%map_id, "Map actor started.");

        // First refresh shortly after start, then on the periodic schedule.
        let first_tick = tokio::time::Instant::now() + STARTUP_GRACE;
        let mut refresh = tokio::time::interval_at(first_tick, deps.refresh_interval);
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = refresh.tick() => {
                    actor.refresh_data().await;
                }
                message = map_rx.recv() => match message {
                    Ok(message) => actor.dispatch(message).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(%map_id, missed, "Map topic subscriber lagged; events dropped.");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!(%map_id, "Map topic closed; actor exiting.");
                        return;
                    }
                },
                message = server_rx.recv() => match message {
                    Ok(message) => actor.dispatch(message).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(%map_id, missed, "Server topic subscriber lagged; messages dropped.");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!(%map_id, "Server topic closed; actor exiting.");
                        return;
                    }
                },
                command = commands.recv() => match command {
                    Some(MapCommand::GetSystem { solar_system_id, reply }) => {
                        let _ = reply.send(actor.raw.system(solar_system_id).cloned());
                    }
                    Some(MapCommand::RefreshNow) => actor.refresh_data().await,
                    Some(MapCommand::Stop) | None => {
                        info!(%map_id, "Map actor stopping.");
                        return;
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!(%map_id, "Map actor shutting down.");
                    return;
                }
            }
        }
    }

    /// The remote id bound at boot.
    pub fn server_map_id(&self) -> Option<&str> {
        self.server_map_id.as_deref()
    }

    /// Replaces the raw view wholesale from the remote REST API. On failure
    /// the existing view is kept and the schedule continues.
    async fn refresh_data(&mut self) {
        match self.deps.api.get_map_systems(&self.map).await {
            Ok(data) => {
                debug!(
                    map_id = %self.map_id,
                    systems = data.systems.len(),
                    connections = data.connections.len(),
                    since_last_secs = self
                        .last_api_refresh_at
                        .map(|at| at.elapsed().as_secs())
                        .unwrap_or(0),
                    "Raw view refreshed from the remote API."
                );
                self.raw = data;
                self.last_api_refresh_at = Some(std::time::Instant::now());
                self.commit();
            }
            Err(error) => {
                warn!(map_id = %self.map_id, %error, "Periodic refresh failed; keeping current view.");
            }
        }
    }

    /// Routes one bus message. A failing handler is logged and skipped; a
    /// single bad event must not take the actor down.
    async fn dispatch(&mut self, message: BusMessage) {
        let result = match message {
            BusMessage::Event(event) => self.handle_event(event).await,
            BusMessage::UpdateSystem { system } => self.handle_update_system(system).await,
            BusMessage::RemoveSystem { solar_system_id } => {
                self.handle_remove_system(solar_system_id).await
            }
            BusMessage::AddConnection { connection } => {
                self.handle_add_connection(connection).await
            }
            BusMessage::RemoveConnection { source, target } => {
                self.handle_remove_connection(source, target).await
            }
            BusMessage::BorderSystemsDetected { border_systems } => {
                self.handle_border_systems(border_systems).await
            }
            BusMessage::DataUpdated { .. } => Ok(()),
        };
        if let Err(error) = result {
            warn!(map_id = %self.map_id, %error, "Event handling failed; continuing.");
        }
    }

    /// Applies one validated SSE event.
    async fn handle_event(&mut self, event: MapEvent) -> Result<(), SyncError> {
        let payload = event.payload.clone().unwrap_or(Value::Null);
        match event.kind {
            EventKind::AddSystem => self.on_add_system(&payload).await,
            EventKind::DeletedSystem => self.on_deleted_system(&payload).await,
            EventKind::SystemMetadataChanged => self.on_system_metadata_changed(&payload).await,
            EventKind::ConnectionAdded => self.on_connection_added(&payload).await,
            EventKind::ConnectionUpdated => self.on_connection_updated(&payload).await,
            EventKind::ConnectionRemoved => self.on_connection_removed(&payload).await,
            other => {
                debug!(map_id = %self.map_id, kind = other.as_str(), "Ignoring event.");
                Ok(())
            }
        }
    }

    async fn on_add_system(&mut self, payload: &Value) -> Result<(), SyncError> {
        let system = System::from_payload(payload)?;

        if self.map.is_main {
            self.raw.upsert_system(system);
            self.commit();
            return Ok(());
        }

        // Satellite: mirror the system as main knows it, minus positions.
        let solar_system_id = system.solar_system_id;
        let mut local = match self.fetch_from_main(solar_system_id).await {
            Some(main_system) => main_system,
            None => system,
        };
        self.deps
            .api
            .upsert_systems_and_connections(
                &self.map,
                vec![local.to_upsert_value()],
                vec![],
                true,
            )
            .await?;

        // Positions are strictly per-map: keep the local ones when present.
        match self.raw.system(solar_system_id) {
            Some(existing) => {
                local.position_x = existing.position_x;
                local.position_y = existing.position_y;
            }
            None => {
                local.position_x = 0.0;
                local.position_y = 0.0;
            }
        }
        self.raw.upsert_system(local);
        self.commit();
        Ok(())
    }

    async fn on_deleted_system(&mut self, payload: &Value) -> Result<(), SyncError> {
        let solar_system_id = payload_system_id(payload)?;
        self.raw.remove_system(solar_system_id);
        self.commit();

        if self.map.is_main {
            for satellite in self.satellites().await? {
                self.deps.pubsub.broadcast(
                    &satellite.url,
                    BusMessage::RemoveSystem { solar_system_id },
                );
            }
        }
        Ok(())
    }

    async fn on_system_metadata_changed(&mut self, payload: &Value) -> Result<(), SyncError> {
        if !self.map.is_main {
            debug!(map_id = %self.map_id, "system_metadata_changed is main-only; ignoring.");
            return Ok(());
        }

        for satellite in self.satellites().await? {
            self.deps.pubsub.broadcast(
                &satellite.url,
                BusMessage::UpdateSystem {
                    system: payload.clone(),
                },
            );
        }

        let solar_system_id = payload_system_id(payload)?;
        if let Some(system) = self.raw.system_mut(solar_system_id) {
            system.merge(payload);
        }
        self.commit();
        Ok(())
    }

    async fn on_connection_added(&mut self, payload: &Value) -> Result<(), SyncError> {
        let connection = Connection::from_payload(payload)?;
        self.raw.upsert_connection(connection);
        self.commit();
        Ok(())
    }

    async fn on_connection_updated(&mut self, payload: &Value) -> Result<(), SyncError> {
        let connection = Connection::from_payload(payload)?;
        self.raw.upsert_connection(connection);
        self.commit();

        if self.map.is_main {
            // Resolve the authoritative connection before fanning out.
            let resolved = self
                .deps
                .api
                .get_connections(
                    &self.map,
                    connection.solar_system_source,
                    connection.solar_system_target,
                )
                .await
                .ok()
                .and_then(|found| found.into_iter().next())
                .unwrap_or(connection);
            for satellite in self.satellites().await? {
                self.deps.pubsub.broadcast(
                    &satellite.url,
                    BusMessage::AddConnection {
                        connection: resolved,
                    },
                );
            }
        }
        Ok(())
    }

    async fn on_connection_removed(&mut self, payload: &Value) -> Result<(), SyncError> {
        let connection = Connection::from_payload(payload)?;
        self.raw.remove_connection(
            connection.solar_system_source,
            connection.solar_system_target,
        );
        self.commit();

        if self.map.is_main {
            for satellite in self.satellites().await? {
                self.deps.pubsub.broadcast(
                    &satellite.url,
                    BusMessage::RemoveConnection {
                        source: connection.solar_system_source,
                        target: connection.solar_system_target,
                    },
                );
            }
        }
        Ok(())
    }

    /// Satellite side of main's `system_metadata_changed` fan-out.
    async fn handle_update_system(&mut self, system: Value) -> Result<(), SyncError> {
        let solar_system_id = payload_system_id(&system)?;
        if self.raw.system(solar_system_id).is_none() {
            return Ok(());
        }

        if let Some(main_system) = self.fetch_from_main(solar_system_id).await {
            self.deps
                .api
                .upsert_systems_and_connections(
                    &self.map,
                    vec![main_system.to_upsert_value()],
                    vec![],
                    true,
                )
                .await?;
            if let Some(local) = self.raw.system_mut(solar_system_id) {
                local.name = main_system.name;
                local.status = main_system.status;
                local.labels = main_system.labels;
            }
        } else if let Some(local) = self.raw.system_mut(solar_system_id) {
            local.merge(&system);
        }
        self.commit();
        Ok(())
    }

    /// Satellite side of main's `deleted_system` fan-out.
    async fn handle_remove_system(&mut self, solar_system_id: i64) -> Result<(), SyncError> {
        if let Err(error) = self.deps.api.delete_system(&self.map, solar_system_id).await {
            warn!(map_id = %self.map_id, %error, "Remote system delete failed.");
        }
        if self.raw.remove_system(solar_system_id) {
            self.commit();
        }
        Ok(())
    }

    /// Satellite side of main's connection fan-out.
    async fn handle_add_connection(&mut self, connection: Connection) -> Result<(), SyncError> {
        self.deps
            .api
            .upsert_systems_and_connections(&self.map, vec![], vec![connection], false)
            .await?;
        self.raw.upsert_connection(connection);
        self.commit();
        Ok(())
    }

    async fn handle_remove_connection(&mut self, source: i64, target: i64) -> Result<(), SyncError> {
        if let Err(error) = self
            .deps
            .api
            .delete_connection(&self.map, source, target)
            .await
        {
            warn!(map_id = %self.map_id, %error, "Remote connection delete failed.");
        }
        if self.raw.remove_connection(source, target) {
            self.commit();
        }
        Ok(())
    }

    /// Main-only: reconciles the border label `"c"` across the raw view,
    /// pushes changed labels upstream, and refreshes when anything moved.
    async fn handle_border_systems(&mut self, border_systems: Vec<i64>) -> Result<(), SyncError> {
        if !self.map.is_main {
            return Ok(());
        }

        let mut changed: Vec<(i64, Option<String>)> = Vec::new();
        for system in &mut self.raw.systems {
            let should_mark = border_systems.contains(&system.solar_system_id);
            let touched = if should_mark {
                system.add_label(BORDER_LABEL)
            } else {
                system.remove_label(BORDER_LABEL)
            };
            if touched {
                changed.push((system.solar_system_id, system.labels.clone()));
            }
        }

        if changed.is_empty() {
            return Ok(());
        }
        self.commit();

        for (solar_system_id, labels) in &changed {
            let attributes = json!({ "labels": labels });
            if let Err(error) = self
                .deps
                .api
                .update_system(&self.map, *solar_system_id, attributes)
                .await
            {
                warn!(
                    map_id = %self.map_id,
                    solar_system_id,
                    %error,
                    "Failed to push border label upstream."
                );
            }
        }

        info!(
            map_id = %self.map_id,
            changed = changed.len(),
            "Border labels changed; refreshing raw view."
        );
        self.refresh_data().await;
        Ok(())
    }

    /// Stores both view tiers and announces the update on the map-id topic.
    fn commit(&self) {
        if let Err(error) = store_views(&self.deps.cache, &self.map_id, &self.raw) {
            error!(map_id = %self.map_id, %error, "Failed to store cached views.");
        }
        self.deps.pubsub.broadcast(
            &self.map_id,
            BusMessage::DataUpdated {
                map_id: self.map_id.clone(),
            },
        );
        // A full scheduler queue already guarantees a pass is coming.
        let _ = self.deps.topology_trigger.try_send(());
    }

    /// Reads a system as the main map knows it, through the registry.
    async fn fetch_from_main(&self, solar_system_id: i64) -> Option<System> {
        let main_id = self
            .deps
            .cache
            .get(&main_map_key())
            .ok()?
            .as_str()
            .map(str::to_string)?;
        if main_id == self.map.id {
            return self.raw.system(solar_system_id).cloned();
        }
        self.deps
            .registry
            .lookup(&main_id)?
            .get_system(solar_system_id)
            .await
    }

    /// Every configured map except this one and the main map.
    async fn satellites(&self) -> Result<Vec<MapRecord>, SyncError> {
        Ok(self
            .deps
            .store
            .list_maps()
            .await?
            .into_iter()
            .filter(|m| !m.is_main && m.id != self.map.id)
            .collect())
    }
}

/// Pulls `solar_system_id` out of an event payload, unwrapping the nested
/// `payload` key when present.
fn payload_system_id(payload: &Value) -> Result<i64, SyncError> {
    let attrs = payload.get("payload").unwrap_or(payload);
    attrs
        .get("solar_system_id")
        .and_then(Value::as_i64)
        .ok_or(SyncError::MissingField("solar_system_id"))
}
