// src/core/map/store.rs

//! The map CRUD facade. Map records are owned by an external service; the
//! core only ever reads them. The shipped implementation serves the roster
//! loaded at boot.

use super::types::MapRecord;
use crate::core::SyncError;
use async_trait::async_trait;

#[async_trait]
pub trait MapStore: Send + Sync {
    async fn get_map(&self, map_id: &str) -> Result<MapRecord, SyncError>;

    async fn list_maps(&self) -> Result<Vec<MapRecord>, SyncError>;
}

/// Serves map records from the configuration roster.
pub struct ConfigMapStore {
    maps: Vec<MapRecord>,
}

impl ConfigMapStore {
    pub fn new(maps: Vec<MapRecord>) -> Self {
        Self { maps }
    }
}

#[async_trait]
impl MapStore for ConfigMapStore {
    async fn get_map(&self, map_id: &str) -> Result<MapRecord, SyncError> {
        self.maps
            .iter()
            .find(|m| m.id == map_id)
            .cloned()
            .ok_or(SyncError::NotFound)
    }

    async fn list_maps(&self) -> Result<Vec<MapRecord>, SyncError> {
        Ok(self.maps.clone())
    }
}
