//! Background caching agent.
//!
//! Every handler works only from durable state in `CacheStorage`; nothing in
//! memory is expected to survive between two messages.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::error::{CacheError, CacheResult};
use super::fetch::Fetcher;
use super::registry::PackRegistry;
use crate::models::{DownloadedPackMap, DownloadedPackRecord};
use crate::offline::{
    final_partition_name, is_pack_partition, is_temp_partition, pack_data_path,
    pack_manifest_path, pack_page_path, partition_prefix, temp_partition_name,
    AGENT_INSTALL_PATH, MANDATORY_PACK_SLUGS, MANDATORY_PACK_VERSION, MANDATORY_SENTINEL_SLUG,
    OFFLINE_LAUNCH_PATH, PACK_REGISTRY_PATH,
};
use crate::rpc::{AgentRequest, AgentResponse, CachePackConfirmation, CachePackPayload};
use crate::store::{CacheStorage, CachedResponse, StoreError};

/// Maximum concurrent resource fetches within one pack download.
/// Packs list a handful of documents; 4 keeps a slow origin from stalling.
const MAX_CONCURRENT_FETCHES: usize = 4;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Origin that root-relative resources resolve against
    pub origin: Url,
    pub mandatory_packs: Vec<String>,
    /// Identifies this agent build; a change re-runs the install step
    pub build_id: String,
}

impl AgentConfig {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            mandatory_packs: MANDATORY_PACK_SLUGS.iter().map(|s| s.to_string()).collect(),
            build_id: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

struct AgentInner {
    config: AgentConfig,
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    registry: PackRegistry,
}

/// The caching agent.
/// Clone is cheap - every handler invocation gets its own clone.
#[derive(Clone)]
pub struct CachingAgent {
    inner: Arc<AgentInner>,
}

impl CachingAgent {
    pub fn new(config: AgentConfig, storage: Arc<CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Self {
        let registry = PackRegistry::new(
            resolve_locator(&config.origin, PACK_REGISTRY_PATH),
            resolve_locator(&config.origin, AGENT_INSTALL_PATH),
        );
        Self {
            inner: Arc::new(AgentInner {
                config,
                storage,
                fetcher,
                registry,
            }),
        }
    }

    fn storage(&self) -> &CacheStorage {
        &self.inner.storage
    }

    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    // ===== Lifecycle =====

    /// Seed the mandatory packs unless this build already did.
    pub async fn install(&self) -> CacheResult<()> {
        let build_id = &self.inner.config.build_id;
        if self.inner.registry.installed_build(self.storage()).as_deref() == Some(build_id.as_str()) {
            debug!(build_id = %build_id, "Agent build already installed");
            return Ok(());
        }

        info!(build_id = %build_id, "Installing caching agent");
        let seeded = self.cache_mandatory_packs().await;
        info!(seeded = seeded, total = self.inner.config.mandatory_packs.len(), "Mandatory packs seeded");
        self.inner.registry.mark_installed(self.storage(), build_id)?;
        Ok(())
    }

    /// Drop temporary partitions left behind by attempts that never
    /// finished. Runs before the agent serves any message.
    pub fn activate(&self) {
        let orphans: Vec<String> = self
            .storage()
            .keys()
            .into_iter()
            .filter(|name| is_temp_partition(name))
            .collect();

        for name in &orphans {
            if let Err(e) = self.storage().delete(name) {
                warn!(partition = %name, error = %e, "Failed to sweep orphaned partition");
            }
        }
        if !orphans.is_empty() {
            info!(count = orphans.len(), "Swept orphaned temporary partitions");
        }
    }

    // ===== Messages =====

    /// Decode and answer one message. Anything that is not a known request
    /// gets no reply.
    pub async fn handle_message(&self, data: Value) -> Option<AgentResponse> {
        let request: AgentRequest = match serde_json::from_value(data) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognized agent message");
                return None;
            }
        };

        let response = match request {
            AgentRequest::CachePack(payload) => match self.cache_pack(&payload).await {
                Ok(()) => AgentResponse::CachePackSuccess {
                    payload: CachePackConfirmation {
                        slug: payload.slug,
                        version: payload.version,
                    },
                },
                Err(e) => {
                    warn!(slug = %payload.slug, version = %payload.version, error = %e, "Pack caching failed");
                    AgentResponse::CachePackError {
                        error: e.to_string(),
                    }
                }
            },
            AgentRequest::CacheMandatoryPacks => {
                self.cache_mandatory_packs().await;
                AgentResponse::CachePackSuccess {
                    payload: CachePackConfirmation {
                        slug: MANDATORY_SENTINEL_SLUG.to_string(),
                        version: MANDATORY_PACK_VERSION.to_string(),
                    },
                }
            }
            AgentRequest::GetPackRegistry => AgentResponse::PackRegistry {
                payload: self.get_pack_registry(),
            },
        };
        Some(response)
    }

    pub fn get_pack_registry(&self) -> DownloadedPackMap {
        self.inner.registry.read(self.storage())
    }

    /// Cache-only lookup across committed pack partitions.
    pub fn match_resource(&self, resource: &str) -> Option<CachedResponse> {
        let url = self.inner.config.origin.join(resource).ok()?;
        self.storage().match_any(url.as_str(), is_pack_partition)
    }

    // ===== Caching =====

    /// Seed every mandatory pack. Failures are logged, never propagated.
    /// Returns how many packs were cached.
    pub async fn cache_mandatory_packs(&self) -> usize {
        let mut seeded = 0;
        for slug in &self.inner.config.mandatory_packs {
            let payload = CachePackPayload {
                slug: slug.clone(),
                version: MANDATORY_PACK_VERSION.to_string(),
                resources: vec![
                    OFFLINE_LAUNCH_PATH.to_string(),
                    pack_manifest_path(slug),
                    pack_page_path(slug),
                    pack_data_path(slug),
                ],
            };
            match self.cache_pack(&payload).await {
                Ok(()) => seeded += 1,
                Err(e) => warn!(slug = %slug, error = %e, "Mandatory pack caching failed"),
            }
        }
        seeded
    }

    /// Fetch every resource of a pack and commit them as one partition.
    ///
    /// Either the final partition for (slug, version) appears fully
    /// populated and replaces every older partition of the slug, or nothing
    /// committed changes. The temporary partition is removed on every path.
    pub async fn cache_pack(&self, payload: &CachePackPayload) -> CacheResult<()> {
        validate_identifier(&payload.slug)?;
        let resources = self.resolve_resources(&payload.resources)?;

        let final_name = final_partition_name(&payload.slug, &payload.version);
        let token = format!("{}-{:08x}", Utc::now().timestamp_millis(), rand::random::<u32>());
        let temp_name = temp_partition_name(&payload.slug, &payload.version, &token);

        let result = self
            .commit_pack(payload, &resources, &final_name, &temp_name)
            .await;

        if let Err(e) = self.storage().delete(&temp_name) {
            warn!(partition = %temp_name, error = %e, "Failed to delete temporary partition");
        }
        result
    }

    async fn commit_pack(
        &self,
        payload: &CachePackPayload,
        resources: &[Url],
        final_name: &str,
        temp_name: &str,
    ) -> CacheResult<()> {
        debug!(partition = %temp_name, resources = resources.len(), "Opening temporary partition");
        self.storage().open_partition(temp_name)?;

        stream::iter(resources.to_vec())
            .map(|url| {
                let agent = self.clone();
                let temp_name = temp_name.to_string();
                async move { agent.fetch_into(&temp_name, &url).await }
            })
            .buffered(MAX_CONCURRENT_FETCHES)
            .try_collect::<Vec<()>>()
            .await?;

        // Copy in resource order, then swap the whole partition in at once.
        let mut entries = Vec::with_capacity(resources.len());
        for url in resources {
            let response = self
                .storage()
                .match_in(temp_name, url.as_str())
                .ok_or_else(|| StoreError::MissingPartition(temp_name.to_string()))?;
            entries.push((url.to_string(), response));
        }
        self.storage().install_partition(final_name, entries)?;

        self.clear_superseded(&payload.slug, final_name)?;

        self.inner.registry.upsert(
            self.storage(),
            DownloadedPackRecord::new(payload.slug.clone(), payload.version.clone()),
        )?;

        info!(slug = %payload.slug, version = %payload.version, resources = resources.len(), "Pack committed");
        Ok(())
    }

    async fn fetch_into(&self, temp_name: &str, url: &Url) -> CacheResult<()> {
        debug!(url = %url, "Fetching pack resource");
        let response = self
            .inner
            .fetcher
            .fetch(url)
            .await
            .map_err(|e| CacheError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(CacheError::FetchStatus {
                url: url.to_string(),
                status: response.status,
            });
        }
        self.storage().put(temp_name, url.as_str(), response)?;
        Ok(())
    }

    /// Delete every committed partition of `slug` except `keep`. Temporary
    /// partitions live under their own prefix and are never touched here.
    fn clear_superseded(&self, slug: &str, keep: &str) -> CacheResult<()> {
        let prefix = partition_prefix(slug);
        for name in self.storage().keys() {
            if name.starts_with(&prefix) && name != keep {
                debug!(partition = %name, "Deleting superseded partition");
                self.storage().delete(&name)?;
            }
        }
        Ok(())
    }

    /// Resolve against the origin and drop duplicates, keeping first
    /// occurrence order.
    fn resolve_resources(&self, resources: &[String]) -> CacheResult<Vec<Url>> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(resources.len());
        for resource in resources {
            let url = self
                .inner
                .config
                .origin
                .join(resource)
                .map_err(|e| CacheError::InvalidResource {
                    resource: resource.clone(),
                    reason: e.to_string(),
                })?;
            if seen.insert(url.as_str().to_string()) {
                resolved.push(url);
            }
        }
        Ok(resolved)
    }
}

fn resolve_locator(origin: &Url, path: &str) -> String {
    origin
        .join(path)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| format!("{}{}", origin.as_str().trim_end_matches('/'), path))
}

fn validate_identifier(slug: &str) -> CacheResult<()> {
    if slug.is_empty() || slug.contains(':') {
        return Err(CacheError::InvalidIdentifier(slug.to_string()));
    }
    Ok(())
}
