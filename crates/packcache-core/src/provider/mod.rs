//! Where pack content comes from.
//!
//! The offline subsystem only needs a `CityPack` to download; these
//! providers are how a client finds one. Payloads always pass through
//! `models::validate` before they reach the caller.

pub mod api;
pub mod error;
pub mod repository;
pub mod static_provider;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;

use crate::models::{CityPack, PackCatalogEntry};

pub use api::ApiPackProvider;
pub use error::ProviderError;
pub use repository::PackRepository;
pub use static_provider::StaticPackProvider;

/// HTTP request timeout in seconds.
/// Same budget as the agent's fetcher.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[async_trait]
pub trait PackProvider: Send + Sync {
    async fn get_catalog(&self) -> Result<Vec<PackCatalogEntry>>;

    /// `None` when the provider has no pack with this slug.
    async fn get_pack(&self, slug: &str) -> Result<Option<CityPack>>;
}

fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()?)
}

/// GET a JSON document. A 404 is `Ok(None)`; any other failure status is
/// an error naming `what`.
async fn get_json(client: &Client, url: &str, what: &str) -> Result<Option<Value>> {
    let response = client
        .get(url)
        .header(header::ACCEPT, "application/json")
        .send()
        .await
        .with_context(|| format!("Failed to send GET request to {}", url))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(ProviderError::Status {
            what: what.to_string(),
            status: status.as_u16(),
        }
        .into());
    }

    let value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", what))?;
    Ok(Some(value))
}
