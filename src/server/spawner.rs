// src/server/spawner.rs

//! Spawns all of the service's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use crate::core::map::supervisor::supervise_map;
use crate::core::state::AppState;
use crate::core::tasks::cache_purger::CachePurgerTask;
use crate::core::tasks::topology_scheduler::TopologyScheduler;
use crate::core::topology::TopologyPass;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

/// The interval for the pub/sub empty-topic sweep.
const TOPIC_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// The context once every background task is running.
pub struct RunningContext {
    pub state: Arc<AppState>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<()>,
}

/// Spawns all background tasks and hands back the running context.
pub async fn spawn_all(ctx: ServerContext) -> Result<RunningContext> {
    let ServerContext {
        state,
        init,
        shutdown_tx,
        mut background_tasks,
    } = ctx;

    // --- Metrics Server ---
    if state.config.metrics.enabled {
        let metrics_state = state.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(metrics_state, shutdown_rx).await;
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    // --- Core Maintenance Tasks ---
    let purger = CachePurgerTask::new(state.cache.clone());
    let shutdown_rx = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        purger.run(shutdown_rx).await;
    });

    let pubsub = state.pubsub.clone();
    let mut shutdown_rx = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        let mut interval = tokio::time::interval(TOPIC_PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => { pubsub.purge_empty_topics(); }
                _ = shutdown_rx.recv() => return,
            }
        }
    });

    // --- License Validator ---
    let shutdown_rx = shutdown_tx.subscribe();
    let license_validator = init.license_validator;
    background_tasks.spawn(async move {
        license_validator.run(shutdown_rx).await;
    });

    // --- Topology Scheduler ---
    let pass = TopologyPass::new(
        state.cache.clone(),
        state.pubsub.clone(),
        state.static_info.clone(),
    );
    let scheduler = TopologyScheduler::new(
        pass,
        state.store.clone(),
        Duration::from_millis(state.config.topology_interval_ms),
        init.topology_trigger_rx,
    );
    let shutdown_rx = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    // --- Map Supervisors: one (actor + SSE client) pair per map ---
    for map in &state.config.maps {
        let map_id = map.id.clone();
        let deps = state.map_deps();
        let sse_settings = state.config.sse.clone();
        let monitor = state.monitor.clone();
        let shutdown_tx_pair = shutdown_tx.clone();
        background_tasks.spawn(async move {
            supervise_map(map_id, deps, sse_settings, monitor, shutdown_tx_pair).await;
        });
    }

    info!("All background tasks have been spawned.");
    Ok(RunningContext {
        state,
        shutdown_tx,
        background_tasks,
    })
}
