use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Caching agent is not active yet. Refresh and retry.")]
    NotReady,

    #[error("Timed out waiting for caching agent response after {0:?}")]
    Timeout(Duration),

    #[error("Caching agent closed the channel without responding")]
    Disconnected,

    #[error("Failed to encode agent request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode agent response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Malformed agent response: {0}")]
    Malformed(String),
}
