use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::DownloadError;
use super::listeners::{ListenerRegistry, Subscription};
use super::resources::build_offline_resource_set;
use crate::models::{parse_downloaded_pack_map, CityPack, DownloadedPackMap, DownloadedPackRecord};
use crate::offline::{ACTIVE_PACK_STORAGE_KEY, DOWNLOADED_PACKS_STORAGE_KEY, MANDATORY_PACK_SLUGS};
use crate::rpc::{AgentRequest, AgentResponse, AgentTransport, CachePackPayload};
use crate::store::{LocalStorage, StoreError, StoreResult};

/// Client-side owner of the offline pack state.
///
/// Reads are synchronous against the key-value store. Downloads go through
/// the agent, and local state changes only after the agent confirms.
pub struct OfflinePackCoordinator {
    storage: LocalStorage,
    transport: AgentTransport,
    mandatory_packs: Vec<String>,
    listeners: Arc<ListenerRegistry>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    downloading: Mutex<HashSet<String>>,
}

/// Marks a slug as downloading for as long as it lives.
struct DownloadGuard<'a> {
    downloading: &'a Mutex<HashSet<String>>,
    slug: String,
}

impl<'a> DownloadGuard<'a> {
    fn acquire(downloading: &'a Mutex<HashSet<String>>, slug: &str) -> Result<Self, DownloadError> {
        if !lock(downloading).insert(slug.to_string()) {
            return Err(DownloadError::AlreadyDownloading(slug.to_string()));
        }
        Ok(Self {
            downloading,
            slug: slug.to_string(),
        })
    }
}

impl Drop for DownloadGuard<'_> {
    fn drop(&mut self) {
        lock(self.downloading).remove(&self.slug);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn is_offline_state_key(key: Option<&str>) -> bool {
    match key {
        // Missed events: anything may have changed.
        None => true,
        Some(key) => key == ACTIVE_PACK_STORAGE_KEY || key == DOWNLOADED_PACKS_STORAGE_KEY,
    }
}

impl OfflinePackCoordinator {
    pub fn new(storage: LocalStorage, transport: AgentTransport) -> Self {
        Self {
            storage,
            transport,
            mandatory_packs: MANDATORY_PACK_SLUGS.iter().map(|s| s.to_string()).collect(),
            listeners: ListenerRegistry::new(),
            watcher: Mutex::new(None),
            downloading: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_mandatory_packs(mut self, mandatory_packs: Vec<String>) -> Self {
        self.mandatory_packs = mandatory_packs;
        self
    }

    // ===== Local state =====

    pub fn active_launch_identifier(&self) -> Option<String> {
        self.storage
            .get_item(ACTIVE_PACK_STORAGE_KEY)
            .filter(|slug| !slug.is_empty())
    }

    pub fn downloaded_packs(&self) -> DownloadedPackMap {
        parse_downloaded_pack_map(self.storage.get_item(DOWNLOADED_PACKS_STORAGE_KEY).as_deref())
    }

    /// Make `slug` the pack opened on launch. Not checked against the
    /// downloaded map, so a mandatory default can be chosen before it is
    /// downloaded.
    pub fn set_active_launch_identifier(&self, slug: &str) -> StoreResult<()> {
        self.storage.set_item(ACTIVE_PACK_STORAGE_KEY, slug)?;
        self.listeners.notify_all();
        Ok(())
    }

    fn set_downloaded_packs(&self, downloaded: &DownloadedPackMap) -> StoreResult<()> {
        let json = serde_json::to_string(downloaded)?;
        self.storage.set_item(DOWNLOADED_PACKS_STORAGE_KEY, &json)?;
        self.listeners.notify_all();
        Ok(())
    }

    /// The pack a launch without routing context should open: the active
    /// pack, else any downloaded pack, else the first mandatory pack.
    pub fn launch_target(&self) -> String {
        self.active_launch_identifier()
            .or_else(|| self.downloaded_packs().into_keys().next())
            .or_else(|| self.mandatory_packs.first().cloned())
            .unwrap_or_else(|| MANDATORY_PACK_SLUGS[0].to_string())
    }

    pub fn is_downloading(&self, slug: &str) -> bool {
        lock(&self.downloading).contains(slug)
    }

    // ===== Agent round-trips =====

    /// Ask the agent to cache `pack`, then record it and make it active.
    ///
    /// On any failure the local state is left exactly as it was.
    pub async fn download_pack(&self, pack: &CityPack) -> Result<DownloadedPackRecord, DownloadError> {
        let _guard = DownloadGuard::acquire(&self.downloading, &pack.slug)?;

        let request = AgentRequest::CachePack(CachePackPayload {
            slug: pack.slug.clone(),
            version: pack.version.clone(),
            resources: build_offline_resource_set(pack),
        });
        info!(slug = %pack.slug, version = %pack.version, "Downloading pack for offline use");

        match self.transport.request(&request).await? {
            AgentResponse::CachePackSuccess { payload }
                if payload.slug == pack.slug && payload.version == pack.version => {}
            AgentResponse::CachePackError { error } => {
                warn!(slug = %pack.slug, error = %error, "Agent failed to cache pack");
                return Err(DownloadError::Agent(error));
            }
            other => return Err(DownloadError::UnexpectedResponse(format!("{:?}", other))),
        }

        let record = DownloadedPackRecord::new(pack.slug.clone(), pack.version.clone());
        let mut downloaded = self.downloaded_packs();
        downloaded.insert(pack.slug.clone(), record.clone());
        self.set_downloaded_packs(&downloaded)?;
        self.set_active_launch_identifier(&pack.slug)?;

        info!(slug = %pack.slug, version = %pack.version, "Pack available offline");
        Ok(record)
    }

    /// Ask the agent to (re)seed the mandatory packs.
    pub async fn seed_mandatory_packs(&self) -> Result<(), DownloadError> {
        match self.transport.request(&AgentRequest::CacheMandatoryPacks).await? {
            AgentResponse::CachePackSuccess { .. } => Ok(()),
            AgentResponse::CachePackError { error } => Err(DownloadError::Agent(error)),
            other => Err(DownloadError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// The agent's registry, which is authoritative over the local map.
    pub async fn pack_registry(&self) -> Result<DownloadedPackMap, DownloadError> {
        match self.transport.request(&AgentRequest::GetPackRegistry).await? {
            AgentResponse::PackRegistry { payload } => Ok(payload),
            other => Err(DownloadError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// Bring the local map in line with the agent registry.
    ///
    /// The active identifier is cleared if it lost its record, unless it is a
    /// mandatory pack. Subscribers are notified once if anything changed.
    pub async fn reconcile_with_registry(&self) -> Result<DownloadedPackMap, DownloadError> {
        let registry = self.pack_registry().await?;
        let local = self.downloaded_packs();
        let mut changed = false;

        let differs = local.len() != registry.len()
            || registry
                .iter()
                .any(|(slug, record)| local.get(slug).map(|l| &l.version) != Some(&record.version));
        if differs {
            debug!(local = local.len(), registry = registry.len(), "Local pack map out of date");
            let json = serde_json::to_string(&registry).map_err(StoreError::from)?;
            self.storage.set_item(DOWNLOADED_PACKS_STORAGE_KEY, &json)?;
            changed = true;
        }

        if let Some(active) = self.active_launch_identifier() {
            if !registry.contains_key(&active) && !self.mandatory_packs.contains(&active) {
                info!(slug = %active, "Clearing active pack that is no longer cached");
                self.storage.remove_item(ACTIVE_PACK_STORAGE_KEY)?;
                changed = true;
            }
        }

        if changed {
            self.listeners.notify_all();
        }
        Ok(registry)
    }

    // ===== Subscriptions =====

    /// Call `listener` whenever the offline state changes, from this context
    /// or from another one sharing the same store.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.ensure_watcher();
        self.listeners.add(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Forward other contexts' storage changes to our listeners.
    fn ensure_watcher(&self) {
        let mut watcher = lock(&self.watcher);
        if watcher.is_some() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime; changes from other contexts will not be observed");
            return;
        };

        let mut changes = self.storage.changes();
        let listeners = Arc::downgrade(&self.listeners);
        *watcher = Some(runtime.spawn(async move {
            while let Some(event) = changes.recv().await {
                if !is_offline_state_key(event.key.as_deref()) {
                    continue;
                }
                match listeners.upgrade() {
                    Some(listeners) => listeners.notify_all(),
                    None => break,
                }
            }
        }));
    }
}

impl Drop for OfflinePackCoordinator {
    fn drop(&mut self) {
        if let Some(watcher) = lock(&self.watcher).take() {
            watcher.abort();
        }
    }
}
