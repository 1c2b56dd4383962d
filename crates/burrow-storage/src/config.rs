use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use typed_builder::TypedBuilder;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_MIGRATIONS_PATH: &str = "migrations";
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// The backend a [`StorageConfig`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    File,
    MySql,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::File => write!(f, "file"),
            BackendKind::MySql => write!(f, "mysql"),
        }
    }
}

/// Settings the storage layer is built from.
///
/// Empty strings are treated the same as unset values.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct StorageConfig {
    /// Path of the append-only link file.
    #[builder(default, setter(strip_option, into))]
    pub file_storage_path: Option<PathBuf>,
    /// Connection string of the relational database.
    #[builder(default, setter(strip_option, into))]
    pub database_dsn: Option<String>,
    /// Base URL short links are composed with.
    #[builder(default = DEFAULT_BASE_URL.to_string(), setter(into))]
    pub base_url: String,
    /// Directory holding the SQL migration scripts.
    #[builder(default = PathBuf::from(DEFAULT_MIGRATIONS_PATH), setter(into))]
    pub migrations_path: PathBuf,
    /// Upper bound for every database round trip.
    #[builder(default = DEFAULT_OPERATION_TIMEOUT)]
    pub operation_timeout: Duration,
    #[builder(default = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl StorageConfig {
    /// Picks the backend: a file path wins over a DSN, and with neither set
    /// links are kept in memory.
    pub fn backend(&self) -> BackendKind {
        if self.file_path().is_some() {
            BackendKind::File
        } else if self.dsn().is_some() {
            BackendKind::MySql
        } else {
            BackendKind::Memory
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_storage_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    pub fn dsn(&self) -> Option<&str> {
        self.database_dsn.as_deref().filter(|dsn| !dsn.is_empty())
    }
}
