// src/core/state/mod.rs

//! Defines the central `AppState` struct, holding all shared service-wide state.

use crate::config::Config;
use crate::core::SyncError;
use crate::core::cache::Cache;
use crate::core::http::HttpClient;
use crate::core::license::{LicenseHandle, LicenseValidator};
use crate::core::map::{ConfigMapStore, HttpMapApi, MapApi, MapDeps, MapRegistry, MapStore};
use crate::core::monitor::ConnectionMonitor;
use crate::core::pubsub::PubSubManager;
use crate::core::topology::static_info::{EsiStaticInfo, StaticInfoProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Depth of the topology trigger queue; a full queue means a pass is
/// already pending.
const TOPOLOGY_TRIGGER_CAPACITY: usize = 16;

/// Contains all initialized components required to spawn the service's
/// background tasks. Created once during initialization and consumed by the
/// spawner.
pub struct AppInit {
    /// The fully initialized, shared service state.
    pub state: Arc<AppState>,
    /// The license validator actor, ready to run.
    pub license_validator: LicenseValidator,
    /// Receives on-demand topology pass triggers from map actors.
    pub topology_trigger_rx: mpsc::Receiver<()>,
}

/// The central struct holding all shared, service-wide state. Wrapped in an
/// `Arc` and passed to every task, providing a single source of truth.
pub struct AppState {
    /// Unique id for this service run; shows up in logs and reports.
    pub run_id: String,
    pub config: Config,
    pub cache: Arc<Cache>,
    pub pubsub: Arc<PubSubManager>,
    pub monitor: Arc<ConnectionMonitor>,
    pub http: Arc<HttpClient>,
    pub registry: Arc<MapRegistry>,
    pub api: Arc<dyn MapApi>,
    pub store: Arc<dyn MapStore>,
    pub static_info: Arc<dyn StaticInfoProvider>,
    pub license: LicenseHandle,
    topology_trigger: mpsc::Sender<()>,
}

impl AppState {
    /// Initializes the entire service state from the given configuration.
    pub fn initialize(config: Config) -> Result<AppInit, SyncError> {
        let cache = Arc::new(Cache::new(config.cache.max_keys));
        let pubsub = Arc::new(PubSubManager::new());
        let monitor = Arc::new(ConnectionMonitor::new());
        let http = Arc::new(HttpClient::new(
            cache.clone(),
            config.telemetry_logging_enabled,
        )?);
        let registry = Arc::new(MapRegistry::new());
        let api: Arc<dyn MapApi> = Arc::new(HttpMapApi::new(http.clone()));
        let store: Arc<dyn MapStore> = Arc::new(ConfigMapStore::new(config.maps.clone()));
        let static_info: Arc<dyn StaticInfoProvider> =
            Arc::new(EsiStaticInfo::new(http.clone(), cache.clone()));

        let (topology_trigger, topology_trigger_rx) = mpsc::channel(TOPOLOGY_TRIGGER_CAPACITY);

        let (license_validator, license) = LicenseValidator::new(
            config.license.clone(),
            config.env,
            http.clone(),
            cache.clone(),
        );

        let state = Arc::new(Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            config,
            cache,
            pubsub,
            monitor,
            http,
            registry,
            api,
            store,
            static_info,
            license,
            topology_trigger,
        });

        Ok(AppInit {
            state,
            license_validator,
            topology_trigger_rx,
        })
    }

    /// The dependency bundle handed to each map actor.
    pub fn map_deps(&self) -> MapDeps {
        MapDeps {
            cache: self.cache.clone(),
            pubsub: self.pubsub.clone(),
            api: self.api.clone(),
            store: self.store.clone(),
            registry: self.registry.clone(),
            refresh_interval: Duration::from_millis(self.config.map_refresh_interval_ms),
            topology_trigger: self.topology_trigger.clone(),
        }
    }
}
