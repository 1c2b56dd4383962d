use crate::link::LinkId;
use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid link id: {0}")]
    InvalidLinkId(String),
}

/// Errors surfaced by the storage contract.
///
/// [`StorageError::AlreadyExists`] is the only non-fatal kind: the batch was
/// fully processed and the variant carries one id per input URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("url already exists")]
    AlreadyExists(Vec<LinkId>),
    #[error("link not found: {0}")]
    NotFound(LinkId),
    #[error("link is deleted: {0}")]
    Deleted(LinkId),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("transaction rolled back: {0}")]
    Transaction(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage i/o failed: {0}")]
    Io(String),
    #[error("schema migration failed: {0}")]
    Migration(String),
}

impl StorageError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StorageError::AlreadyExists(_))
    }

    /// Returns the ids carried by an [`StorageError::AlreadyExists`] signal.
    pub fn existing_ids(&self) -> Option<&[LinkId]> {
        match self {
            StorageError::AlreadyExists(ids) => Some(ids),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
