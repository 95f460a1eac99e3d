// src/server/initialization.rs

//! Builds the shared state and logs the effective configuration before the
//! background tasks start.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::AppState;
use anyhow::Result;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Initializes all service components before starting the main loop.
pub fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let init = AppState::initialize(config)?;
    let state = init.state.clone();
    info!(run_id = %state.run_id, "Service state initialized.");

    Ok(ServerContext {
        state,
        init,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        env = ?config.env,
        maps = config.maps.len(),
        "Starting wanderer-sync."
    );
    match config.maps.iter().find(|m| m.is_main) {
        Some(main) => info!(map_id = %main.id, "Main map configured."),
        None => warn!("No main map in the roster; border detection will be idle."),
    }
    if config.license.license_key.is_none() && config.env.is_dev_or_test() {
        warn!("No license key set; running with the development license shortcut.");
    }
    if !config.notifications_enabled {
        info!("Outbound notifications are disabled by configuration.");
    }
    info!(
        cache_max_keys = config.cache.max_keys,
        refresh_interval_ms = config.map_refresh_interval_ms,
        topology_interval_ms = config.topology_interval_ms,
        "Core intervals configured."
    );
}
