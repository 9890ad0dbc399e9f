use thiserror::Error;

use crate::models::ValidationError;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to load {what} ({status})")]
    Status { what: String, status: u16 },

    #[error("Pack catalog not found")]
    CatalogNotFound,

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}
