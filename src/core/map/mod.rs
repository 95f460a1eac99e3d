// src/core/map/mod.rs

//! Per-map actors and their supporting pieces: the data model, the cached
//! views, the remote API client, the registry, and supervision.

pub mod actor;
pub mod api_client;
pub mod registry;
pub mod store;
pub mod supervisor;
pub mod types;
pub mod views;

pub use actor::{MapActor, MapDeps};
pub use api_client::{HttpMapApi, MapApi};
pub use registry::{MapActorHandle, MapCommand, MapRegistry};
pub use store::{ConfigMapStore, MapStore};
pub use types::{Connection, MapData, MapRecord, System};
