//! Core types and traits for the Burrow URL shortener.
//!
//! This crate defines the storage contract every backend implements and the
//! types that cross it. Backends live in `burrow-storage`; callers such as
//! the shortener service only depend on [`Repository`].

pub mod error;
pub mod link;
pub mod repository;

pub use error::{CoreError, StorageError};
pub use link::LinkId;
pub use repository::{Repository, Statistic, UrlPair};
