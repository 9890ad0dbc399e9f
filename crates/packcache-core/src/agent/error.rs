use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid pack identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid resource locator {resource:?}: {reason}")]
    InvalidResource { resource: String, reason: String },

    #[error("Failed to cache {url} ({status})")]
    FetchStatus { url: String, status: u16 },

    #[error("Failed to cache {url} (network error: {message})")]
    Network { url: String, message: String },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type CacheResult<T> = Result<T, CacheError>;
