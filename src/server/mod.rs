// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod context;
mod initialization;
mod metrics_server;
mod run_loop;
mod spawner;

/// The main service startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Initialize shared state.
    let server_context = initialization::setup(config)?;

    // 2. Spawn all background tasks.
    let running = spawner::spawn_all(server_context).await?;

    // 3. Wait for shutdown. This function runs until the process stops.
    run_loop::run(running).await;

    Ok(())
}
