//! Scripted network for agent and coordinator tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::fetch::{FetchError, Fetcher};
use crate::store::CachedResponse;

enum Outcome {
    Status(u16),
    NetworkError,
}

/// Serves every path with a 200 JSON body naming the path, unless told
/// otherwise for that path.
pub(crate) struct ScriptedFetcher {
    outcomes: Mutex<HashMap<String, Outcome>>,
    requests: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub(crate) fn serving_everything() -> Self {
        Self {
            outcomes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub(crate) fn with_status(self, path: &str, status: u16) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .insert(path.to_string(), Outcome::Status(status));
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn fail_network(&self, path: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(path.to_string(), Outcome::NetworkError);
    }

    /// Every URL fetched so far, in call order.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> Result<CachedResponse, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let status = match self.outcomes.lock().unwrap().get(url.path()) {
            Some(Outcome::NetworkError) => {
                return Err(FetchError(format!("connection reset fetching {}", url)))
            }
            Some(Outcome::Status(status)) => *status,
            None => 200,
        };

        Ok(CachedResponse {
            status,
            content_type: Some("application/json".to_string()),
            body: format!("{{\"path\":\"{}\"}}", url.path()).into_bytes(),
        })
    }
}
