//! Storage backends for the Burrow URL shortener.
//!
//! Three interchangeable implementations of [`Repository`]: an in-memory
//! map, an append-only line file and MySQL. [`Storage::open`] picks one from
//! a [`StorageConfig`].

pub mod config;
pub mod file;
pub mod memory;
pub mod mysql;
pub mod storage;

pub use burrow_core::error::{Result, StorageError};
pub use burrow_core::{LinkId, Repository, Statistic, UrlPair};
pub use config::{BackendKind, StorageConfig};
pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use mysql::MySqlRepository;
pub use storage::Storage;
