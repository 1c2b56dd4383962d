use crate::error::Result;
use crate::link::LinkId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One entry of a user's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPair {
    /// The composed short URL (`<base_url>/<id>`).
    pub short_url: String,
    /// The original URL that was shortened.
    pub original_url: String,
}

/// Usage counters of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistic {
    /// Total number of stored links, deleted ones included.
    pub urls: usize,
    /// Number of distinct owners that created at least one link.
    pub users: usize,
}

/// The storage contract shared by every backend.
///
/// Ids are allocated sequentially and never reused. Links are never
/// physically removed; deletion only flags them.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    /// Stores every URL under `owner` and returns one id per input, in order.
    ///
    /// A URL that is already stored keeps its id. If any input was already
    /// present, the whole batch is still processed and the ids are returned
    /// inside `Err(StorageError::AlreadyExists(ids))`.
    async fn create_short(&self, owner: &str, urls: &[String]) -> Result<Vec<LinkId>>;

    /// Returns the original URL of a live link.
    ///
    /// Fails with `NotFound` for ids that were never assigned and with
    /// `Deleted` for soft-deleted ones.
    async fn get_original(&self, id: LinkId) -> Result<String>;

    /// Flags the given links as deleted.
    ///
    /// Only links owned by `owner` are touched; anything else is skipped
    /// without error.
    async fn mark_as_deleted(&self, owner: &str, ids: &[LinkId]) -> Result<()>;

    /// Returns every link created by `owner` in creation order.
    ///
    /// An unknown owner yields an empty list.
    async fn get_urls_by_user(&self, owner: &str) -> Result<Vec<UrlPair>>;

    /// Checks that the backing medium is reachable.
    async fn ping(&self) -> Result<()>;

    /// Returns the total link count and the distinct owner count.
    async fn statistic(&self) -> Result<Statistic>;

    /// The base URL used to compose short links.
    fn base_url(&self) -> &str;
}
