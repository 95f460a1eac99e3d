// src/server/context.rs

use crate::core::state::{AppInit, AppState};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Everything the spawner and the main loop need, produced by initialization.
pub struct ServerContext {
    pub state: Arc<AppState>,
    pub init: AppInit,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<()>,
}
