// src/core/map/supervisor.rs

//! Per-map supervision: the (map actor, SSE client) pair runs as a linked
//! group. A member that dies abnormally is restarted within a budget; a
//! clean exit of either member tears the pair down.

use super::actor::{MapActor, MapDeps};
use super::registry::{MapActorHandle, MapCommand};
use crate::config::SseConfig;
use crate::core::monitor::ConnectionMonitor;
use crate::core::sse::{SseClient, SseClientConfig};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Restart budget: at most this many abnormal exits per window.
const MAX_RESTARTS: usize = 5;
const RESTART_WINDOW: Duration = Duration::from_secs(60);

/// Tracks abnormal exits inside the sliding window.
struct RestartBudget {
    events: VecDeque<Instant>,
}

impl RestartBudget {
    fn new() -> Self {
        Self {
            events: VecDeque::new(),
        }
    }

    /// Records one abnormal exit; returns whether a restart is still allowed.
    fn allow(&mut self) -> bool {
        let now = Instant::now();
        while self
            .events
            .front()
            .is_some_and(|&at| now - at > RESTART_WINDOW)
        {
            self.events.pop_front();
        }
        self.events.push_back(now);
        self.events.len() <= MAX_RESTARTS
    }
}

/// Supervises one map's actor + SSE client pair until shutdown or a
/// permanent failure.
pub async fn supervise_map(
    map_id: String,
    deps: MapDeps,
    sse_settings: SseConfig,
    monitor: Arc<ConnectionMonitor>,
    shutdown_tx: broadcast::Sender<()>,
) {
    let map = match deps.store.get_map(&map_id).await {
        Ok(map) => map,
        Err(error) => {
            error!(%map_id, %error, "Cannot supervise unknown map.");
            return;
        }
    };

    let mut budget = RestartBudget::new();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let mut actor_join = spawn_actor(&map_id, &deps, &shutdown_tx);
    let mut sse_join = spawn_sse(&map.url, &map.public_api_key, &map_id, &deps, &sse_settings, &monitor, &shutdown_tx);

    loop {
        tokio::select! {
            result = &mut actor_join => {
                match result {
                    Ok(()) => {
                        // A clean actor exit is significant: the pair goes
                        // down with it.
                        info!(%map_id, "Map actor exited cleanly; tearing the pair down.");
                        break;
                    }
                    Err(join_error) => {
                        error!(%map_id, %join_error, "Map actor terminated abnormally.");
                        if budget.allow() {
                            actor_join = spawn_actor(&map_id, &deps, &shutdown_tx);
                            continue;
                        }
                        warn!(%map_id, "Restart budget exhausted; tearing the pair down.");
                        break;
                    }
                }
            }
            result = &mut sse_join => {
                match result {
                    Ok(()) => {
                        info!(%map_id, "SSE client exited cleanly; tearing the pair down.");
                        break;
                    }
                    Err(join_error) => {
                        error!(%map_id, %join_error, "SSE client terminated abnormally.");
                        monitor.mark_dead(&format!("sse:{map_id}"));
                        if budget.allow() {
                            sse_join = spawn_sse(&map.url, &map.public_api_key, &map_id, &deps, &sse_settings, &monitor, &shutdown_tx);
                            continue;
                        }
                        warn!(%map_id, "Restart budget exhausted; tearing the pair down.");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!(%map_id, "Supervisor shutting down.");
                break;
            }
        }
    }

    // Teardown: stop whatever is still running and drop the registration.
    actor_join.abort();
    sse_join.abort();
    deps.registry.unregister(&map_id);
}

fn spawn_actor(
    map_id: &str,
    deps: &MapDeps,
    shutdown_tx: &broadcast::Sender<()>,
) -> JoinHandle<()> {
    let (tx, rx) = mpsc::channel::<MapCommand>(64);
    deps.registry
        .register(MapActorHandle::new(map_id.to_string(), tx));

    let map_id = map_id.to_string();
    let deps = deps.clone();
    let shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        MapActor::run(map_id, deps, rx, shutdown_rx).await;
    })
}

#[allow(clippy::too_many_arguments)]
fn spawn_sse(
    map_url: &str,
    api_token: &str,
    map_id: &str,
    deps: &MapDeps,
    sse_settings: &SseConfig,
    monitor: &Arc<ConnectionMonitor>,
    shutdown_tx: &broadcast::Sender<()>,
) -> JoinHandle<()> {
    let mut config = SseClientConfig::new(map_id, map_url, api_token);
    config.connect_timeout = Duration::from_millis(sse_settings.connect_timeout_ms);
    config.recv_timeout = sse_settings.recv_timeout_ms.map(Duration::from_millis);
    config.keepalive_interval = Duration::from_secs(sse_settings.keepalive_interval_secs.max(1));

    let pubsub = deps.pubsub.clone();
    let monitor = monitor.clone();
    let shutdown_rx = shutdown_tx.subscribe();
    let map_id = map_id.to_string();
    tokio::spawn(async move {
        match SseClient::new(config, pubsub, monitor) {
            Ok(client) => client.run(shutdown_rx).await,
            Err(error) => {
                error!(%map_id, %error, "Failed to construct SSE client.");
            }
        }
    })
}
