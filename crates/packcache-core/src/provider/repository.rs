use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use super::PackProvider;
use crate::models::{CityPack, PackCatalogEntry};

/// Remote-first pack lookup with the static documents as fallback.
///
/// The remote provider is only consulted while the repository believes it
/// is online. Any remote failure falls back to the static provider.
pub struct PackRepository {
    static_provider: Arc<dyn PackProvider>,
    remote_provider: Option<Arc<dyn PackProvider>>,
    online: AtomicBool,
}

impl PackRepository {
    pub fn new(
        static_provider: Arc<dyn PackProvider>,
        remote_provider: Option<Arc<dyn PackProvider>>,
    ) -> Self {
        Self {
            static_provider,
            remote_provider,
            online: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    fn remote(&self) -> Option<&Arc<dyn PackProvider>> {
        self.remote_provider.as_ref().filter(|_| self.is_online())
    }

    pub async fn get_catalog(&self) -> Result<Vec<PackCatalogEntry>> {
        if let Some(remote) = self.remote() {
            match remote.get_catalog().await {
                Ok(catalog) => return Ok(catalog),
                Err(e) => warn!(error = %e, "Remote catalog failed, using static catalog"),
            }
        }
        self.static_provider.get_catalog().await
    }

    pub async fn get_pack(&self, slug: &str) -> Result<Option<CityPack>> {
        if let Some(remote) = self.remote() {
            match remote.get_pack(slug).await {
                Ok(Some(pack)) => return Ok(Some(pack)),
                Ok(None) => debug!(slug = %slug, "Remote has no such pack, trying static"),
                Err(e) => warn!(slug = %slug, error = %e, "Remote pack failed, using static pack"),
            }
        }
        self.static_provider.get_pack(slug).await
    }
}
