//! URL shortener service on top of the Burrow storage layer.
//!
//! [`ShortenerService`] is what request handlers talk to: it accepts ids as
//! strings, turns the storage conflict signal into a flag and logs every
//! call. [`config::AppConfig`] assembles the process configuration from a
//! JSON file, the environment and command-line flags.

pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;

pub use config::{AppConfig, ConfigArgs};
pub use error::{ConfigError, ShortenerError};
pub use service::{Shortened, ShortenerService};
