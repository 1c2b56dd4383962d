use burrow_shortener::telemetry::{LogFormat, LOG_FORMAT_ENV};
use burrow_shortener::ConfigArgs;
use clap::{Parser, Subcommand};

pub const OWNER_ENV: &str = "BURROW_OWNER";

#[derive(Debug, Parser)]
#[command(name = "burrow", about = "Shorten, resolve and manage links")]
pub struct CLI {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[arg(
        long,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormat::Text
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store URLs and print their short links.
    Shorten {
        #[arg(long, env = OWNER_ENV)]
        owner: String,
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Print the original URL behind a short link id.
    Resolve { id: String },
    /// Soft-delete links owned by `owner`.
    Delete {
        #[arg(long, env = OWNER_ENV)]
        owner: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Print every link created by `owner` as JSON.
    History {
        #[arg(long, env = OWNER_ENV)]
        owner: String,
    },
    /// Print link and owner counts as JSON.
    Stats,
    /// Check that the storage medium is reachable.
    Ping,
}
