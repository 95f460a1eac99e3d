// src/core/tasks/cache_purger.rs

//! Active expiry for the shared cache. Reads also expire lazily; this task
//! keeps idle namespaces from accumulating dead entries.

use crate::core::cache::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

/// The interval between expiry sweeps.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// `CachePurgerTask` periodically sweeps expired keys out of the store.
pub struct CachePurgerTask {
    cache: Arc<Cache>,
}

impl CachePurgerTask {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }

    /// Runs the purger until shutdown.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Cache purger started.");
        let mut interval = tokio::time::interval(PURGE_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.cache.purge_expired();
                }
                _ = shutdown_rx.recv() => {
                    info!("Cache purger shutting down.");
                    return;
                }
            }
        }
    }
}
