use crate::error::ConfigError;
use burrow_storage::config::{DEFAULT_BASE_URL, DEFAULT_MIGRATIONS_PATH};
use burrow_storage::StorageConfig;
use clap::builder::FalseyValueParser;
use clap::Args;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "CONFIG";
pub const SERVER_ADDRESS_ENV: &str = "SERVER_ADDRESS";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const ENABLE_HTTPS_ENV: &str = "ENABLE_HTTPS";
pub const DATABASE_MIGRATIONS_ENV: &str = "DATABASE_MIGRATIONS";

pub const DEFAULT_SERVER_ADDRESS: &str = ":8080";

/// Configuration flags shared by every subcommand.
///
/// Each flag falls back to its environment variable; clap already gives a
/// flag priority over the variable.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// JSON config file, applied below the environment and flags.
    #[arg(short = 'c', long = "config", env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[arg(short = 'a', long, env = SERVER_ADDRESS_ENV)]
    pub server_address: Option<String>,

    /// Base URL short links are composed with.
    #[arg(short = 'b', long, env = BASE_URL_ENV)]
    pub base_url: Option<String>,

    /// Append-only link file; selects the file backend.
    #[arg(short = 'f', long = "file-storage-path", env = FILE_STORAGE_PATH_ENV)]
    pub storage_path: Option<String>,

    /// MySQL connection string; selects the database backend.
    #[arg(short = 'd', long = "database-dsn", env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    #[arg(
        short = 's',
        long,
        env = ENABLE_HTTPS_ENV,
        value_parser = FalseyValueParser::new()
    )]
    pub enable_https: bool,

    #[arg(long, env = DATABASE_MIGRATIONS_ENV)]
    pub migrations_path: Option<String>,
}

impl ConfigArgs {
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            server_address: self.server_address.clone(),
            base_url: self.base_url.clone(),
            storage_path: self.storage_path.clone(),
            base_path: self.database_dsn.clone(),
            enable_https: self.enable_https,
            migrations_path: self.migrations_path.clone(),
        }
    }
}

/// One configuration source. Keys follow the JSON config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    server_address: Option<String>,
    base_url: Option<String>,
    storage_path: Option<String>,
    base_path: Option<String>,
    enable_https: bool,
    migrations_path: Option<String>,
}

impl ConfigLayer {
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// The process configuration.
///
/// Sources from lowest to highest priority: built-in defaults, the JSON
/// file, environment variables, flags. Empty values never override.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Listen address for an HTTP front end. Not used by this crate.
    pub server_address: String,
    pub base_url: String,
    pub storage_path: String,
    pub database_dsn: String,
    pub migrations_path: PathBuf,
    pub enable_https: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            storage_path: String::new(),
            database_dsn: String::new(),
            migrations_path: PathBuf::from(DEFAULT_MIGRATIONS_PATH),
            enable_https: false,
        }
    }
}

impl AppConfig {
    pub fn load(args: &ConfigArgs) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = args
            .config
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
        {
            config.merge(ConfigLayer::from_file(path)?);
        }
        config.merge(args.layer());

        Ok(config)
    }

    fn merge(&mut self, layer: ConfigLayer) {
        override_with(&mut self.server_address, layer.server_address);
        override_with(&mut self.base_url, layer.base_url);
        override_with(&mut self.storage_path, layer.storage_path);
        override_with(&mut self.database_dsn, layer.base_path);
        if let Some(path) = layer.migrations_path.filter(|path| !path.is_empty()) {
            self.migrations_path = PathBuf::from(path);
        }
        if layer.enable_https {
            self.enable_https = true;
        }
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            file_storage_path: non_empty(&self.storage_path).map(PathBuf::from),
            database_dsn: non_empty(&self.database_dsn).map(str::to_string),
            base_url: self.base_url.clone(),
            migrations_path: self.migrations_path.clone(),
            ..StorageConfig::default()
        }
    }
}

fn override_with(slot: &mut String, value: Option<String>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        *slot = value;
    }
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}
