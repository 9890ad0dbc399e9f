//! Application configuration management.
//!
//! Configuration is stored at `~/.config/packcache/config.json`. Missing
//! fields take their defaults, and `PACKCACHE_ORIGIN` / `PACK_API_BASE_URL`
//! from the environment override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::offline::MANDATORY_PACK_SLUGS;
use crate::rpc::DEFAULT_RPC_TIMEOUT;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "packcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Origin of a locally served build of the app
const DEFAULT_ORIGIN: &str = "http://localhost:4173";

pub const ORIGIN_ENV: &str = "PACKCACHE_ORIGIN";
pub const API_BASE_URL_ENV: &str = "PACK_API_BASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Origin that pack resources resolve against
    pub origin: String,
    /// Optional content API; without it only the static documents are used
    pub api_base_url: Option<String>,
    pub rpc_timeout_secs: u64,
    pub mandatory_packs: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            api_base_url: None,
            rpc_timeout_secs: DEFAULT_RPC_TIMEOUT.as_secs(),
            mandatory_packs: MANDATORY_PACK_SLUGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Where the key-value store, the partitions and the logs live.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Non-empty values from `lookup` replace the file's settings.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(origin) = non_empty(ORIGIN_ENV) {
            self.origin = origin;
        }
        if let Some(base_url) = non_empty(API_BASE_URL_ENV) {
            self.api_base_url = Some(base_url);
        }
    }

    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin).with_context(|| format!("Invalid origin {:?}", self.origin))
    }

    /// Never shorter than one second; a zero timeout would fail every call.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs.max(1))
    }
}
