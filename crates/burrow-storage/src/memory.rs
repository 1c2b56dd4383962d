use async_trait::async_trait;
use burrow_core::error::{Result, StorageError};
use burrow_core::{LinkId, Repository, Statistic, UrlPair};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use url::Url;

#[derive(Debug, Default)]
struct Tables {
    /// id -> original url
    locations: HashMap<LinkId, String>,
    /// owner -> ids in creation order
    users: HashMap<String, Vec<LinkId>>,
    deleted: HashSet<LinkId>,
}

impl Tables {
    /// Finds the live link storing `url`.
    fn find_by_url(&self, url: &str) -> Option<LinkId> {
        // Linear scan. Fine for the sizes this backend is meant for.
        self.locations
            .iter()
            .find(|(id, original)| original.as_str() == url && !self.deleted.contains(*id))
            .map(|(id, _)| *id)
    }

    fn next_id(&self) -> LinkId {
        LinkId::new(self.locations.len() as u64 + 1)
    }

    fn owns(&self, owner: &str, id: LinkId) -> bool {
        self.users
            .get(owner)
            .is_some_and(|ids| ids.contains(&id))
    }
}

/// In-memory implementation of the [`Repository`] contract.
///
/// All three tables sit behind one mutex, so every operation on an instance
/// is serialized. Nothing survives a restart.
#[derive(Debug)]
pub struct InMemoryRepository {
    base_url: String,
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    /// Creates an empty repository composing short links with `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            tables: Mutex::new(Tables::default()),
        }
    }
}

/// Only syntactically absolute URLs are accepted.
fn validate_url(url: &str) -> Result<()> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|e| StorageError::InvalidUrl(format!("wrong url {url}: {e}")))
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_short(&self, owner: &str, urls: &[String]) -> Result<Vec<LinkId>> {
        // Reject the whole batch before touching any table.
        for url in urls {
            validate_url(url)?;
        }

        let mut tables = self.tables.lock();
        let mut ids = Vec::with_capacity(urls.len());
        let mut conflict = false;

        for url in urls {
            if let Some(existing) = tables.find_by_url(url) {
                debug!(id = %existing, url = %url, "url already stored");
                conflict = true;
                ids.push(existing);
                continue;
            }

            let id = tables.next_id();
            tables.locations.insert(id, url.clone());
            tables.users.entry(owner.to_owned()).or_default().push(id);
            debug!(id = %id, url = %url, "stored new link");
            ids.push(id);
        }

        if conflict {
            return Err(StorageError::AlreadyExists(ids));
        }
        Ok(ids)
    }

    async fn get_original(&self, id: LinkId) -> Result<String> {
        let tables = self.tables.lock();

        let Some(original) = tables.locations.get(&id) else {
            return Err(StorageError::NotFound(id));
        };
        if tables.deleted.contains(&id) {
            return Err(StorageError::Deleted(id));
        }
        Ok(original.clone())
    }

    async fn mark_as_deleted(&self, owner: &str, ids: &[LinkId]) -> Result<()> {
        let mut tables = self.tables.lock();

        for &id in ids {
            if tables.owns(owner, id) {
                tables.deleted.insert(id);
            } else {
                debug!(id = %id, owner = %owner, "skipping delete of foreign or unknown link");
            }
        }
        Ok(())
    }

    async fn get_urls_by_user(&self, owner: &str) -> Result<Vec<UrlPair>> {
        let tables = self.tables.lock();

        let Some(ids) = tables.users.get(owner) else {
            return Ok(Vec::new());
        };

        let history = ids
            .iter()
            .map(|id| UrlPair {
                short_url: id.to_url(&self.base_url),
                original_url: tables.locations.get(id).cloned().unwrap_or_default(),
            })
            .collect();
        Ok(history)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn statistic(&self) -> Result<Statistic> {
        let tables = self.tables.lock();
        Ok(Statistic {
            urls: tables.locations.len(),
            users: tables.users.len(),
        })
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
