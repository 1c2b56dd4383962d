use burrow_core::StorageError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShortenerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShortenerError {
    #[error("short link not found: {0}")]
    NotFound(String),
    #[error("short link is deleted: {0}")]
    Deleted(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(id) => Self::NotFound(id.to_string()),
            StorageError::Deleted(id) => Self::Deleted(id.to_string()),
            StorageError::InvalidUrl(message) => Self::InvalidUrl(message),
            other => Self::Storage(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
