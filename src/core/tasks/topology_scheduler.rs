// src/core/tasks/topology_scheduler.rs

//! Drives the topology pass: on a fixed interval, and on demand whenever a
//! map actor commits a raw-view mutation. Bursts of triggers coalesce into
//! one pass.

use crate::core::map::MapStore;
use crate::core::topology::TopologyPass;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

pub struct TopologyScheduler {
    pass: TopologyPass,
    store: Arc<dyn MapStore>,
    interval: Duration,
    trigger_rx: mpsc::Receiver<()>,
}

impl TopologyScheduler {
    pub fn new(
        pass: TopologyPass,
        store: Arc<dyn MapStore>,
        interval: Duration,
        trigger_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            pass,
            store,
            interval,
            trigger_rx,
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let Self {
            pass,
            store,
            interval: pass_interval,
            mut trigger_rx,
        } = self;

        info!(interval = ?pass_interval, "Topology scheduler started.");
        let mut interval = tokio::time::interval(pass_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    run_pass(&pass, &store).await;
                }
                triggered = trigger_rx.recv() => {
                    if triggered.is_none() {
                        return;
                    }
                    // Drain queued triggers so a burst runs one pass.
                    while trigger_rx.try_recv().is_ok() {}
                    run_pass(&pass, &store).await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Topology scheduler shutting down.");
                    return;
                }
            }
        }
    }
}

async fn run_pass(pass: &TopologyPass, store: &Arc<dyn MapStore>) {
    let maps = match store.list_maps().await {
        Ok(maps) => maps,
        Err(error) => {
            warn!(%error, "Topology pass skipped: map roster unavailable.");
            return;
        }
    };
    if let Err(error) = pass.run(&maps).await {
        warn!(%error, "Topology pass failed.");
    }
}
