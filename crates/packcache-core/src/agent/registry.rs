//! The agent's durable record of fully committed packs.
//!
//! Stored as a JSON blob at a fixed internal locator inside its own
//! partition, so it survives agent restarts and is never served to clients.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{DownloadedPackMap, DownloadedPackRecord};
use crate::store::{CacheStorage, CachedResponse, StoreResult};
use crate::offline::PACK_REGISTRY_CACHE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallMarker {
    build_id: String,
}

/// Locators of the registry blobs, resolved against the agent's origin.
///
/// Clones share one upsert lock, so commits of different packs running in
/// parallel never drop each other's records.
#[derive(Debug, Clone)]
pub struct PackRegistry {
    registry_url: String,
    install_url: String,
    upsert_lock: Arc<Mutex<()>>,
}

impl PackRegistry {
    pub fn new(registry_url: String, install_url: String) -> Self {
        Self {
            registry_url,
            install_url,
            upsert_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Read the registry. Missing or malformed content reads as empty.
    pub fn read(&self, storage: &CacheStorage) -> DownloadedPackMap {
        let Some(response) = storage.match_in(PACK_REGISTRY_CACHE, &self.registry_url) else {
            return DownloadedPackMap::new();
        };

        match serde_json::from_slice(&response.body) {
            Ok(registry) => registry,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed pack registry");
                DownloadedPackMap::new()
            }
        }
    }

    pub fn write(&self, storage: &CacheStorage, registry: &DownloadedPackMap) -> StoreResult<()> {
        let body = serde_json::to_vec(registry)?;
        storage.open_partition(PACK_REGISTRY_CACHE)?;
        storage.put(PACK_REGISTRY_CACHE, &self.registry_url, CachedResponse::json(body))
    }

    /// Insert or replace one record. The read and the write happen under
    /// one lock; a later upsert for the same slug wins.
    pub fn upsert(&self, storage: &CacheStorage, record: DownloadedPackRecord) -> StoreResult<()> {
        let _guard = self
            .upsert_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut registry = self.read(storage);
        registry.insert(record.slug.clone(), record);
        self.write(storage, &registry)
    }

    /// Build id of the agent that last completed its install step.
    pub fn installed_build(&self, storage: &CacheStorage) -> Option<String> {
        let response = storage.match_in(PACK_REGISTRY_CACHE, &self.install_url)?;
        serde_json::from_slice::<InstallMarker>(&response.body)
            .ok()
            .map(|marker| marker.build_id)
    }

    pub fn mark_installed(&self, storage: &CacheStorage, build_id: &str) -> StoreResult<()> {
        let body = serde_json::to_vec(&InstallMarker {
            build_id: build_id.to_string(),
        })?;
        storage.open_partition(PACK_REGISTRY_CACHE)?;
        storage.put(PACK_REGISTRY_CACHE, &self.install_url, CachedResponse::json(body))
    }
}
