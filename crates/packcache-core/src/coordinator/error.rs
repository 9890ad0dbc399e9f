use thiserror::Error;

use crate::rpc::TransportError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The agent tried and failed; the message is safe to show and retry.
    #[error("{0}")]
    Agent(String),

    #[error("Unexpected agent response: {0}")]
    UnexpectedResponse(String),

    #[error("A download for {0} is already in progress")]
    AlreadyDownloading(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}
