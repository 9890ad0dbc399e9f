use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::error::ProviderError;
use super::{get_json, http_client, PackProvider};
use crate::models::{parse_catalog_response, parse_city_pack, CityPack, PackCatalogEntry};
use crate::offline::{pack_data_path, PACK_INDEX_PATH};

/// Reads the pack documents published alongside the app at its origin.
#[derive(Clone)]
pub struct StaticPackProvider {
    client: Client,
    origin: Url,
}

impl StaticPackProvider {
    pub fn new(origin: Url) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            origin,
        })
    }

    fn url(&self, path: &str) -> Result<String> {
        Ok(self.origin.join(path)?.to_string())
    }
}

#[async_trait]
impl PackProvider for StaticPackProvider {
    async fn get_catalog(&self) -> Result<Vec<PackCatalogEntry>> {
        let url = self.url(PACK_INDEX_PATH)?;
        let value = get_json(&self.client, &url, "pack catalog")
            .await?
            .ok_or(ProviderError::CatalogNotFound)?;
        let catalog = parse_catalog_response(&value).map_err(ProviderError::from)?;
        Ok(catalog.packs)
    }

    async fn get_pack(&self, slug: &str) -> Result<Option<CityPack>> {
        let url = self.url(&pack_data_path(slug))?;
        let what = format!("pack {}", slug);
        match get_json(&self.client, &url, &what).await? {
            Some(value) => Ok(Some(parse_city_pack(&value).map_err(ProviderError::from)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn catalog_entry(slug: &str) -> Value {
        json!({
            "slug": slug,
            "city": "Lisbon",
            "country": "Portugal",
            "rank": 12,
            "internationalArrivalsMillions": 9.5,
            "mandatory": false,
            "tagline": "Hills and trams",
            "accent": "#ff7a00"
        })
    }

    pub(crate) fn pack_document(slug: &str, version: &str) -> Value {
        json!({
            "slug": slug,
            "city": "Lisbon",
            "country": "Portugal",
            "rank": 12,
            "internationalArrivalsMillions": 9.5,
            "version": version,
            "updatedAt": "2026-03-01",
            "hero": {"title": "Lisbon", "subtitle": "Seven hills"},
            "painPoints": ["Steep streets"],
            "sections": [
                {"id": "transit", "title": "Transit", "summary": "Trams", "actions": ["Buy a Viva card"]}
            ],
            "emergency": [{"label": "Emergency", "value": "112"}],
            "offlineResources": ["/content/packs/lisbon-map.json"]
        })
    }

    fn provider(server: &MockServer) -> StaticPackProvider {
        StaticPackProvider::new(Url::parse(&server.uri()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_static_catalog() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/content/packs/index.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "generatedAt": "2026-03-01T00:00:00Z",
                "dataset": "unwto-2024",
                "packs": [catalog_entry("lisbon"), catalog_entry("porto")]
            })))
            .mount(&server)
            .await;

        let catalog = provider(&server).get_catalog().await.unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[1].slug, "porto");
    }

    #[tokio::test]
    async fn test_static_pack_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/content/packs/atlantis.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(provider(&server).get_pack("atlantis").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_static_pack_parsed_and_validated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/content/packs/lisbon.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pack_document("lisbon", "v2")))
            .mount(&server)
            .await;

        let mut broken = pack_document("porto", "v1");
        broken["sections"][0]["actions"][0] = json!(7);
        Mock::given(method("GET"))
            .and(path("/content/packs/porto.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(broken))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let pack = provider.get_pack("lisbon").await.unwrap().unwrap();
        assert_eq!(pack.version, "v2");
        assert_eq!(pack.offline_resources, vec!["/content/packs/lisbon-map.json"]);

        let err = provider.get_pack("porto").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid pack.sections[0].actions[0]: expected string");
    }

    #[tokio::test]
    async fn test_static_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider(&server).get_catalog().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to load pack catalog (503)");
    }
}
