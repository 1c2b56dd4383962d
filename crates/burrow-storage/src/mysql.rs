use crate::config::StorageConfig;
use async_trait::async_trait;
use burrow_core::error::{Result, StorageError};
use burrow_core::{LinkId, Repository, Statistic, UrlPair};
use sqlx::migrate::Migrator;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{Connection, MySql, MySqlPool, Row, Transaction};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const WRITER_LOCK: &str = "create_short";

/// MySQL implementation of the repository contract.
///
/// Each batch runs in one transaction, so a failed call leaves nothing
/// behind. Creating batches serialize on a lock row, which keeps one live
/// record per URL even across processes. The only in-process state is the
/// id allocator: it starts from the highest stored id, catches up with it
/// under the lock and is advanced atomically. Ids burned by a rolled back
/// transaction are not reused.
#[derive(Debug)]
pub struct MySqlRepository {
    pool: MySqlPool,
    base_url: String,
    timeout: Duration,
    last_id: AtomicU64,
}

impl MySqlRepository {
    /// Opens a pool, applies pending migrations and seeds the allocator.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let dsn = config
            .dsn()
            .ok_or_else(|| StorageError::Unavailable("database dsn is empty".to_string()))?;

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.operation_timeout)
            .connect(dsn)
            .await
            .map_err(map_sqlx_error)?;

        Self::migrate(&pool, &config.migrations_path).await?;
        Self::from_pool(pool, config.base_url.clone(), config.operation_timeout).await
    }

    /// Creates a repository from an existing, already migrated pool.
    pub async fn from_pool(
        pool: MySqlPool,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let last_id: Option<u64> = with_deadline(
            timeout,
            sqlx::query_scalar("SELECT MAX(id) FROM short_links").fetch_one(&pool),
        )
        .await?;
        let last_id = last_id.unwrap_or(0);

        info!(last_id, "seeded link id allocator");

        Ok(Self {
            pool,
            base_url: base_url.into(),
            timeout,
            last_id: AtomicU64::new(last_id),
        })
    }

    /// Applies the migration scripts found under `path`.
    pub async fn migrate(pool: &MySqlPool, path: &Path) -> Result<()> {
        let migrator = Migrator::new(path.to_path_buf())
            .await
            .map_err(|e| StorageError::Migration(format!("{}: {e}", path.display())))?;
        migrator
            .run(pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;

        info!(path = %path.display(), "database migrations applied");
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn allocate(&self) -> LinkId {
        LinkId::new(self.last_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Bounds a whole operation. Dropping an unfinished transaction rolls
    /// it back, so a timeout never leaves partial writes.
    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or_else(|_| Err(timed_out(self.timeout)))
    }

    async fn insert_batch(
        &self,
        tx: &mut Transaction<'static, MySql>,
        owner: &str,
        urls: &[String],
    ) -> std::result::Result<(Vec<LinkId>, bool), sqlx::Error> {
        // Held until commit or rollback. Batches from every process queue
        // here, so two of them can never both miss the same URL.
        sqlx::query(
            r#"
            SELECT name
            FROM short_link_locks
            WHERE name = ?
            FOR UPDATE
            "#,
        )
        .bind(WRITER_LOCK)
        .fetch_optional(&mut **tx)
        .await?;

        // Another process may have written since this one was seeded.
        let stored: Option<u64> = sqlx::query_scalar("SELECT MAX(id) FROM short_links")
            .fetch_one(&mut **tx)
            .await?;
        self.last_id.fetch_max(stored.unwrap_or(0), Ordering::SeqCst);

        let mut ids = Vec::with_capacity(urls.len());
        let mut conflict = false;

        for url in urls {
            let existing: Option<u64> = sqlx::query_scalar(
                r#"
                SELECT id
                FROM short_links
                WHERE original_url = ?
                  AND deleted = FALSE
                ORDER BY id
                LIMIT 1
                "#,
            )
            .bind(url)
            .fetch_optional(&mut **tx)
            .await?;

            if let Some(id) = existing {
                debug!(id, url = %url, "url already stored");
                conflict = true;
                ids.push(LinkId::new(id));
                continue;
            }

            let id = self.allocate();
            sqlx::query(
                r#"
                INSERT INTO short_links (id, original_url, owner, deleted)
                VALUES (?, ?, ?, FALSE)
                "#,
            )
            .bind(id.get())
            .bind(url)
            .bind(owner)
            .execute(&mut **tx)
            .await?;
            ids.push(id);
        }

        Ok((ids, conflict))
    }

    async fn create_short_tx(&self, owner: &str, urls: &[String]) -> Result<Vec<LinkId>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let (ids, conflict) = match self.insert_batch(&mut tx, owner, urls).await {
            Ok(outcome) => outcome,
            Err(err) => return Err(rollback(tx, "create_short", err).await),
        };
        tx.commit()
            .await
            .map_err(|e| StorageError::Transaction(e.to_string()))?;

        debug!(count = ids.len(), conflict, "link batch committed");
        if conflict {
            return Err(StorageError::AlreadyExists(ids));
        }
        Ok(ids)
    }

    async fn mark_as_deleted_tx(&self, owner: &str, ids: &[LinkId]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let mut flipped = 0;
        for id in ids {
            let result = sqlx::query(
                r#"
                UPDATE short_links
                SET deleted = TRUE
                WHERE id = ?
                  AND owner = ?
                "#,
            )
            .bind(id.get())
            .bind(owner)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(done) => flipped += done.rows_affected(),
                Err(err) => return Err(rollback(tx, "mark_as_deleted", err).await),
            }
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Transaction(e.to_string()))?;

        debug!(requested = ids.len(), flipped, owner = %owner, "links marked as deleted");
        Ok(())
    }
}

/// Rolls `tx` back and turns the failure that caused it into a
/// [`StorageError::Transaction`].
async fn rollback(tx: Transaction<'static, MySql>, op: &str, cause: sqlx::Error) -> StorageError {
    error!(op, error = %cause, "transaction failed, rolling back");
    if let Err(rollback_err) = tx.rollback().await {
        warn!(op, error = %rollback_err, "rollback failed");
    }
    StorageError::Transaction(cause.to_string())
}

fn timed_out(timeout: Duration) -> StorageError {
    StorageError::Timeout(format!("operation exceeded {timeout:?}"))
}

async fn with_deadline<T>(
    timeout: Duration,
    fut: impl Future<Output = std::result::Result<T, sqlx::Error>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(map_sqlx_error),
        Err(_) => Err(timed_out(timeout)),
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl Repository for MySqlRepository {
    async fn create_short(&self, owner: &str, urls: &[String]) -> Result<Vec<LinkId>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        self.bounded(self.create_short_tx(owner, urls)).await
    }

    async fn get_original(&self, id: LinkId) -> Result<String> {
        let row = with_deadline(
            self.timeout,
            sqlx::query(
                r#"
                SELECT original_url, deleted
                FROM short_links
                WHERE id = ?
                LIMIT 1
                "#,
            )
            .bind(id.get())
            .fetch_optional(&self.pool),
        )
        .await?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(id));
        };

        let deleted: bool = row.try_get("deleted").map_err(map_sqlx_error)?;
        if deleted {
            return Err(StorageError::Deleted(id));
        }
        row.try_get("original_url").map_err(map_sqlx_error)
    }

    async fn mark_as_deleted(&self, owner: &str, ids: &[LinkId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.bounded(self.mark_as_deleted_tx(owner, ids)).await
    }

    async fn get_urls_by_user(&self, owner: &str) -> Result<Vec<UrlPair>> {
        let rows = with_deadline(
            self.timeout,
            sqlx::query(
                r#"
                SELECT id, original_url
                FROM short_links
                WHERE owner = ?
                ORDER BY id
                "#,
            )
            .bind(owner)
            .fetch_all(&self.pool),
        )
        .await?;

        rows.iter()
            .map(|row| {
                let id: u64 = row.try_get("id").map_err(map_sqlx_error)?;
                let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
                Ok(UrlPair {
                    short_url: LinkId::new(id).to_url(&self.base_url),
                    original_url,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        self.bounded(async {
            let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
            conn.ping().await.map_err(map_sqlx_error)
        })
        .await
    }

    async fn statistic(&self) -> Result<Statistic> {
        let row = with_deadline(
            self.timeout,
            sqlx::query(
                r#"
                SELECT COUNT(*) AS urls, COUNT(DISTINCT owner) AS users
                FROM short_links
                "#,
            )
            .fetch_one(&self.pool),
        )
        .await?;

        let urls: i64 = row.try_get("urls").map_err(map_sqlx_error)?;
        let users: i64 = row.try_get("users").map_err(map_sqlx_error)?;
        let to_count = |value: i64| {
            usize::try_from(value)
                .map_err(|e| StorageError::InvalidData(format!("invalid count {value}: {e}")))
        };

        Ok(Statistic {
            urls: to_count(urls)?,
            users: to_count(users)?,
        })
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
