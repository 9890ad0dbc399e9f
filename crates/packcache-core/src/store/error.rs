use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Cache partition does not exist: {0}")]
    MissingPartition(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
