use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::error::ProviderError;
use super::{get_json, http_client, PackProvider};
use crate::models::{parse_catalog_entries, parse_city_pack, CityPack, PackCatalogEntry};

/// Reads packs from a content API: `{base}/packs` and `{base}/packs/{slug}`.
#[derive(Clone)]
pub struct ApiPackProvider {
    client: Client,
    base_url: String,
}

impl ApiPackProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PackProvider for ApiPackProvider {
    async fn get_catalog(&self) -> Result<Vec<PackCatalogEntry>> {
        let url = format!("{}/packs", self.base_url);
        let payload = get_json(&self.client, &url, "API catalog")
            .await?
            .ok_or(ProviderError::CatalogNotFound)?;
        let packs = payload.get("packs").unwrap_or(&Value::Null);
        Ok(parse_catalog_entries(packs, "packs").map_err(ProviderError::from)?)
    }

    async fn get_pack(&self, slug: &str) -> Result<Option<CityPack>> {
        let url = format!("{}/packs/{}", self.base_url, slug);
        let what = format!("API pack {}", slug);
        match get_json(&self.client, &url, &what).await? {
            Some(value) => Ok(Some(parse_city_pack(&value).map_err(ProviderError::from)?)),
            None => Ok(None),
        }
    }
}
