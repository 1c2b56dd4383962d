use crate::error::{Result, ShortenerError};
use burrow_core::{LinkId, Repository, Statistic, StorageError, UrlPair};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a shorten call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub ids: Vec<LinkId>,
    /// `<base_url>/<id>` for every id, in input order.
    pub short_urls: Vec<String>,
    /// At least one URL was already stored and kept its old id.
    pub conflict: bool,
}

/// Use-case layer over a [`Repository`].
///
/// Ids arrive here as strings from the outside world. Strings that are not
/// valid ids can never have been assigned, so they are answered without
/// touching storage.
#[derive(Debug)]
pub struct ShortenerService<R> {
    repository: Arc<R>,
}

impl<R> Clone for ShortenerService<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<R: Repository> ShortenerService<R> {
    pub fn new(repository: R) -> Self {
        Self::from_arc(Arc::new(repository))
    }

    pub fn from_arc(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn short_url(&self, id: LinkId) -> String {
        id.to_url(self.repository.base_url())
    }

    pub async fn shorten(&self, owner: &str, urls: &[String]) -> Result<Shortened> {
        let (ids, conflict) = match self.repository.create_short(owner, urls).await {
            Ok(ids) => (ids, false),
            Err(StorageError::AlreadyExists(ids)) => (ids, true),
            Err(err) => return Err(err.into()),
        };
        debug!(owner, count = ids.len(), conflict, "shortened urls");

        let short_urls = ids.iter().map(|id| self.short_url(*id)).collect();
        Ok(Shortened {
            ids,
            short_urls,
            conflict,
        })
    }

    pub async fn resolve(&self, id: &str) -> Result<String> {
        let Ok(link) = id.parse::<LinkId>() else {
            debug!(id, "unparsable id resolved as not found");
            return Err(ShortenerError::NotFound(id.to_string()));
        };
        Ok(self.repository.get_original(link).await?)
    }

    pub async fn delete(&self, owner: &str, ids: &[String]) -> Result<()> {
        let parsed: Vec<LinkId> = ids
            .iter()
            .filter_map(|id| match id.parse::<LinkId>() {
                Ok(link) => Some(link),
                Err(err) => {
                    warn!(owner, id = %id, error = %err, "skipping unparsable id");
                    None
                }
            })
            .collect();

        if parsed.is_empty() {
            return Ok(());
        }
        Ok(self.repository.mark_as_deleted(owner, &parsed).await?)
    }

    pub async fn history(&self, owner: &str) -> Result<Vec<UrlPair>> {
        Ok(self.repository.get_urls_by_user(owner).await?)
    }

    pub async fn ping(&self) -> Result<()> {
        Ok(self.repository.ping().await?)
    }

    pub async fn statistic(&self) -> Result<Statistic> {
        Ok(self.repository.statistic().await?)
    }
}
