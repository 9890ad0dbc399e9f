//! Network access for the caching agent.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use thiserror::Error;
use url::Url;

use crate::store::CachedResponse;

/// HTTP request timeout in seconds.
/// Pack resources are small documents; 30s tolerates slow mobile links.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct FetchError(pub String);

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError(e.to_string())
    }
}

/// Fetches resources straight from the network, never from a cache layer.
///
/// A non-success status is returned as a response, not an error; only
/// transport failures are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<CachedResponse, FetchError>;
}

/// `Fetcher` backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<CachedResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(header::CACHE_CONTROL, "no-store")
            .header(header::PRAGMA, "no-cache")
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(CachedResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_fetcher_bypasses_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.json"))
            .and(header_is("cache-control", "no-store"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{\"a\":1}", "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&format!("{}/a.json", server.uri())).unwrap();
        let response = fetcher.fetch(&url).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
        assert_eq!(response.body, b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_http_fetcher_returns_error_status_as_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/b.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&format!("{}/b.json", server.uri())).unwrap();
        let response = fetcher.fetch(&url).await.unwrap();
        assert_eq!(response.status, 500);
        assert!(!response.is_success());
    }
}
