use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use burrow_storage::{
    BackendKind, LinkId, MySqlRepository, Repository, Statistic, Storage, StorageConfig,
    StorageError, UrlPair,
};
use burrow_test_infra::mysql::{MySqlServer, MysqlConfig};
use sqlx::mysql::MySqlPoolOptions;

const BASE_URL: &str = "http://127.0.0.1:8080";

struct Fixture {
    _mysql: MySqlServer,
    url: String,
    repo: MySqlRepository,
}

impl Fixture {
    async fn start() -> Self {
        let mysql = MySqlServer::new(MysqlConfig::builder().build())
            .await
            .expect("start mysql");
        let url = mysql.database_url().await.expect("mysql url");
        let pool = connect_with_retry(&url).await;

        MySqlRepository::migrate(&pool, &migrations_dir())
            .await
            .expect("run migrations");
        let repo = MySqlRepository::from_pool(pool, BASE_URL, Duration::from_secs(5))
            .await
            .expect("seed repository");

        Self {
            _mysql: mysql,
            url,
            repo,
        }
    }

    /// A second repository over the same database, as after a restart.
    async fn reopen(&self) -> MySqlRepository {
        MySqlRepository::from_pool(self.repo.pool().clone(), BASE_URL, Duration::from_secs(5))
            .await
            .expect("reopen repository")
    }
}

fn migrations_dir() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

async fn connect_with_retry(url: &str) -> sqlx::MySqlPool {
    let mut last_error = None;

    for _ in 0..20 {
        match MySqlPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
        {
            Ok(pool) => return pool,
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect mysql: {last_error:?}");
}

/// Installs a trigger. Trigger bodies are not preparable, so this goes
/// through the text protocol.
async fn create_trigger(pool: &sqlx::MySqlPool, sql: &str) {
    sqlx::raw_sql(sql)
        .execute(pool)
        .await
        .expect("create trigger");
}

fn urls(values: &[&str]) -> Vec<String> {
    values.iter().map(|u| u.to_string()).collect()
}

fn ids(values: &[u64]) -> Vec<LinkId> {
    values.iter().copied().map(LinkId::new).collect()
}

#[tokio::test]
async fn create_and_resolve() {
    let fixture = Fixture::start().await;

    let got = fixture
        .repo
        .create_short("user1", &urls(&["https://a.com", "https://b.com"]))
        .await
        .unwrap();

    assert_eq!(got, ids(&[1, 2]));
    assert_eq!(fixture.repo.get_original(got[0]).await.unwrap(), "https://a.com");
    assert_eq!(fixture.repo.get_original(got[1]).await.unwrap(), "https://b.com");
}

#[tokio::test]
async fn resubmission_signals_already_exists() {
    let fixture = Fixture::start().await;
    let batch = urls(&["https://example.com"]);

    let first = fixture.repo.create_short("user1", &batch).await.unwrap();
    let err = fixture.repo.create_short("user1", &batch).await.unwrap_err();

    assert_eq!(err, StorageError::AlreadyExists(first));
    assert_eq!(fixture.repo.statistic().await.unwrap().urls, 1);
}

#[tokio::test]
async fn repeated_url_within_batch_collapses() {
    let fixture = Fixture::start().await;

    let err = fixture
        .repo
        .create_short(
            "user1",
            &urls(&["https://a.com", "https://b.com", "https://a.com"]),
        )
        .await
        .unwrap_err();

    assert_eq!(err, StorageError::AlreadyExists(ids(&[1, 2, 1])));
    assert_eq!(fixture.repo.statistic().await.unwrap().urls, 2);
}

#[tokio::test]
async fn url_matching_is_case_sensitive() {
    let fixture = Fixture::start().await;

    let got = fixture
        .repo
        .create_short("user1", &urls(&["https://a.com/Path", "https://a.com/path"]))
        .await
        .unwrap();

    assert_eq!(got, ids(&[1, 2]));
}

#[tokio::test]
async fn trailing_space_is_significant() {
    let fixture = Fixture::start().await;

    let got = fixture
        .repo
        .create_short("user1", &urls(&["https://a.com", "https://a.com "]))
        .await
        .unwrap();

    assert_eq!(got, ids(&[1, 2]));
    assert_eq!(fixture.repo.get_original(got[1]).await.unwrap(), "https://a.com ");
}

#[tokio::test]
async fn long_values_round_trip() {
    let fixture = Fixture::start().await;
    let url = format!("https://example.com/{}", "a".repeat(5000));
    let sibling = format!("https://example.com/{}b", "a".repeat(4999));
    let owner = "o".repeat(1000);

    let got = fixture
        .repo
        .create_short(&owner, &[url.clone(), sibling.clone()])
        .await
        .unwrap();

    assert_eq!(got, ids(&[1, 2]));
    assert_eq!(fixture.repo.get_original(got[0]).await.unwrap(), url);
    assert_eq!(fixture.repo.get_original(got[1]).await.unwrap(), sibling);

    let history = fixture.repo.get_urls_by_user(&owner).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].original_url, url);
}

#[tokio::test]
async fn syntax_is_not_validated() {
    let fixture = Fixture::start().await;

    let got = fixture
        .repo
        .create_short("user1", &urls(&["not_url"]))
        .await
        .unwrap();

    assert_eq!(fixture.repo.get_original(got[0]).await.unwrap(), "not_url");
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let fixture = Fixture::start().await;

    let err = fixture
        .repo
        .get_original(LinkId::new(999_999))
        .await
        .unwrap_err();

    assert_eq!(err, StorageError::NotFound(LinkId::new(999_999)));
}

#[tokio::test]
async fn owner_deletes_own_links_only() {
    let fixture = Fixture::start().await;
    let mine = fixture
        .repo
        .create_short("user1", &urls(&["https://a.com"]))
        .await
        .unwrap()[0];
    let theirs = fixture
        .repo
        .create_short("user2", &urls(&["https://b.com"]))
        .await
        .unwrap()[0];

    fixture
        .repo
        .mark_as_deleted("user1", &[mine, theirs, LinkId::new(77)])
        .await
        .unwrap();

    assert_eq!(
        fixture.repo.get_original(mine).await.unwrap_err(),
        StorageError::Deleted(mine)
    );
    assert_eq!(fixture.repo.get_original(theirs).await.unwrap(), "https://b.com");
}

#[tokio::test]
async fn resubmitting_deleted_url_creates_new_link() {
    let fixture = Fixture::start().await;
    let batch = urls(&["https://a.com"]);
    let old = fixture.repo.create_short("user1", &batch).await.unwrap()[0];
    fixture.repo.mark_as_deleted("user1", &[old]).await.unwrap();

    let new = fixture.repo.create_short("user1", &batch).await.unwrap()[0];

    assert_eq!(new, LinkId::new(2));
    assert_eq!(fixture.repo.get_original(new).await.unwrap(), "https://a.com");
    assert_eq!(
        fixture.repo.get_original(old).await.unwrap_err(),
        StorageError::Deleted(old)
    );
}

#[tokio::test]
async fn history_is_scoped_and_ordered() {
    let fixture = Fixture::start().await;
    let batch: Vec<String> = (1..=12).map(|i| format!("https://site{i}.com")).collect();
    fixture.repo.create_short("u1", &batch).await.unwrap();
    fixture
        .repo
        .create_short("u2", &urls(&["https://other.com"]))
        .await
        .unwrap();

    let history = fixture.repo.get_urls_by_user("u1").await.unwrap();
    let expected: Vec<UrlPair> = batch
        .iter()
        .enumerate()
        .map(|(i, url)| UrlPair {
            short_url: format!("{BASE_URL}/{}", i + 1),
            original_url: url.clone(),
        })
        .collect();
    assert_eq!(history, expected);

    let history = fixture.repo.get_urls_by_user("u2").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].short_url, format!("{BASE_URL}/13"));

    assert!(fixture.repo.get_urls_by_user("unknown").await.unwrap().is_empty());
}

#[tokio::test]
async fn statistic_counts_distinct_owners() {
    let fixture = Fixture::start().await;
    assert_eq!(fixture.repo.statistic().await.unwrap(), Statistic::default());

    fixture
        .repo
        .create_short("u1", &urls(&["https://a.com", "https://b.com"]))
        .await
        .unwrap();
    fixture
        .repo
        .create_short("u2", &urls(&["https://c.com"]))
        .await
        .unwrap();

    assert_eq!(
        fixture.repo.statistic().await.unwrap(),
        Statistic { urls: 3, users: 2 }
    );
}

#[tokio::test]
async fn ping_reaches_database() {
    let fixture = Fixture::start().await;
    fixture.repo.ping().await.unwrap();
}

#[tokio::test]
async fn failed_batch_is_rolled_back() {
    let fixture = Fixture::start().await;
    create_trigger(
        fixture.repo.pool(),
        r#"
        CREATE TRIGGER reject_blocked_url BEFORE INSERT ON short_links
        FOR EACH ROW
        BEGIN
            IF NEW.original_url = 'https://blocked.com' THEN
                SIGNAL SQLSTATE '45000' SET MESSAGE_TEXT = 'insert rejected';
            END IF;
        END
        "#,
    )
    .await;

    let err = fixture
        .repo
        .create_short("user1", &urls(&["https://ok.com", "https://blocked.com"]))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Transaction(_)));
    assert_eq!(fixture.repo.statistic().await.unwrap(), Statistic::default());
    assert!(fixture.repo.get_urls_by_user("user1").await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_delete_batch_flips_nothing() {
    let fixture = Fixture::start().await;
    let batch = urls(&["https://a.com", "https://b.com", "https://c.com"]);
    let created = fixture.repo.create_short("user1", &batch).await.unwrap();
    create_trigger(
        fixture.repo.pool(),
        r#"
        CREATE TRIGGER reject_second_link BEFORE UPDATE ON short_links
        FOR EACH ROW
        BEGIN
            IF OLD.id = 2 THEN
                SIGNAL SQLSTATE '45000' SET MESSAGE_TEXT = 'update rejected';
            END IF;
        END
        "#,
    )
    .await;

    let err = fixture
        .repo
        .mark_as_deleted("user1", &created)
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Transaction(_)));
    for (id, url) in created.iter().zip(&batch) {
        assert_eq!(&fixture.repo.get_original(*id).await.unwrap(), url);
    }
}

#[tokio::test]
async fn exhausted_pool_times_out_instead_of_blocking() {
    let fixture = Fixture::start().await;
    let pool = MySqlPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_millis(200))
        .connect(&fixture.url)
        .await
        .expect("connect single-connection pool");
    let repo = MySqlRepository::from_pool(pool.clone(), BASE_URL, Duration::from_millis(500))
        .await
        .unwrap();
    let held = pool.acquire().await.unwrap();

    assert!(matches!(
        repo.create_short("user1", &urls(&["https://a.com"])).await,
        Err(StorageError::Timeout(_))
    ));
    assert!(matches!(
        repo.mark_as_deleted("user1", &ids(&[1])).await,
        Err(StorageError::Timeout(_))
    ));
    assert!(matches!(repo.ping().await, Err(StorageError::Timeout(_))));
    assert!(matches!(
        repo.get_original(LinkId::new(1)).await,
        Err(StorageError::Timeout(_))
    ));

    drop(held);
    assert_eq!(fixture.repo.statistic().await.unwrap(), Statistic::default());
}

#[tokio::test]
async fn blocked_batch_times_out_and_leaves_nothing() {
    let fixture = Fixture::start().await;
    let repo = MySqlRepository::from_pool(
        fixture.repo.pool().clone(),
        BASE_URL,
        Duration::from_millis(500),
    )
    .await
    .unwrap();
    let mut writer = fixture.repo.pool().begin().await.unwrap();
    sqlx::query("SELECT name FROM short_link_locks WHERE name = 'create_short' FOR UPDATE")
        .fetch_optional(&mut *writer)
        .await
        .unwrap();

    let err = repo
        .create_short("user1", &urls(&["https://a.com"]))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Timeout(_)));
    writer.rollback().await.unwrap();
    assert_eq!(fixture.repo.statistic().await.unwrap(), Statistic::default());
}

#[tokio::test]
async fn reopen_resumes_after_highest_id() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .create_short("user1", &urls(&["https://a.com", "https://b.com"]))
        .await
        .unwrap();

    let reopened = fixture.reopen().await;
    let got = reopened
        .create_short("user1", &urls(&["https://c.com"]))
        .await
        .unwrap();

    assert_eq!(got, ids(&[3]));
}

#[tokio::test]
async fn concurrent_batches_get_distinct_ids() {
    let fixture = Fixture::start().await;
    let repo = Arc::new(fixture.reopen().await);
    let mut handles = vec![];

    for i in 0..20 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            repo.create_short(&format!("user{i}"), &[format!("https://site{i}.com")])
                .await
                .unwrap()[0]
        }));
    }

    let mut got = Vec::new();
    for handle in handles {
        got.push(handle.await.unwrap().get());
    }
    got.sort_unstable();
    got.dedup();

    assert_eq!(got.len(), 20);
    assert_eq!(
        repo.statistic().await.unwrap(),
        Statistic {
            urls: 20,
            users: 20
        }
    );
}

#[tokio::test]
async fn concurrent_identical_urls_share_one_link() {
    let fixture = Fixture::start().await;
    let repo = Arc::new(fixture.reopen().await);
    let mut handles = vec![];

    for i in 0..20 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            match repo
                .create_short(&format!("user{i}"), &urls(&["https://same.com"]))
                .await
            {
                Ok(ids) | Err(StorageError::AlreadyExists(ids)) => ids[0],
                Err(err) => panic!("unexpected error: {err}"),
            }
        }));
    }

    let mut got = Vec::new();
    for handle in handles {
        got.push(handle.await.unwrap());
    }
    got.dedup();

    assert_eq!(got, ids(&[1]));
    assert_eq!(repo.statistic().await.unwrap().urls, 1);
}

#[tokio::test]
async fn second_process_does_not_reuse_ids() {
    let fixture = Fixture::start().await;
    let other = fixture.reopen().await;
    fixture
        .repo
        .create_short("user1", &urls(&["https://a.com"]))
        .await
        .unwrap();

    let got = other
        .create_short("user2", &urls(&["https://b.com"]))
        .await
        .unwrap();

    assert_eq!(got, ids(&[2]));
}

#[tokio::test]
async fn facade_opens_mysql_from_dsn() {
    let fixture = Fixture::start().await;
    let config = StorageConfig::builder()
        .database_dsn(fixture.url.clone())
        .migrations_path(migrations_dir())
        .operation_timeout(Duration::from_secs(5))
        .build();

    let storage = Storage::open(&config).await.unwrap();

    assert_eq!(storage.kind(), BackendKind::MySql);
    storage.ping().await.unwrap();
    let got = storage
        .create_short("user1", &urls(&["https://a.com"]))
        .await
        .unwrap();
    assert_eq!(storage.get_original(got[0]).await.unwrap(), "https://a.com");
}
