mod cli;

use crate::cli::{Command, CLI};
use anyhow::Context;
use burrow_shortener::{telemetry, AppConfig, ShortenerError, ShortenerService};
use burrow_storage::Storage;
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};

const EXIT_NOT_FOUND: u8 = 2;
const EXIT_DELETED: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CLI::parse();

    if let Err(err) = telemetry::init(cli.log_format) {
        eprintln!("failed to initialise logging: {err}");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: CLI) -> anyhow::Result<ExitCode> {
    let config = AppConfig::load(&cli.config).context("failed to load configuration")?;
    let storage_config = config.storage_config();

    info!(
        backend = %storage_config.backend(),
        base_url = %config.base_url,
        enable_https = config.enable_https,
        "starting burrow"
    );

    let storage = Storage::open(&storage_config)
        .await
        .context("failed to open storage")?;
    let service = ShortenerService::new(storage);

    match cli.command {
        Command::Shorten { owner, urls } => {
            let shortened = service.shorten(&owner, &urls).await?;
            if shortened.conflict {
                eprintln!("conflict: some urls were already shortened");
            }
            for short_url in shortened.short_urls {
                println!("{short_url}");
            }
        }
        Command::Resolve { id } => match service.resolve(&id).await {
            Ok(original) => println!("{original}"),
            Err(ShortenerError::NotFound(id)) => {
                eprintln!("short link {id} not found");
                return Ok(ExitCode::from(EXIT_NOT_FOUND));
            }
            Err(ShortenerError::Deleted(id)) => {
                eprintln!("short link {id} is deleted");
                return Ok(ExitCode::from(EXIT_DELETED));
            }
            Err(err) => return Err(err.into()),
        },
        Command::Delete { owner, ids } => {
            service.delete(&owner, &ids).await?;
        }
        Command::History { owner } => {
            let history = service.history(&owner).await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Command::Stats => {
            let statistic = service.statistic().await?;
            println!("{}", serde_json::to_string_pretty(&statistic)?);
        }
        Command::Ping => {
            service.ping().await.context("storage is unreachable")?;
            println!("ok");
        }
    }

    Ok(ExitCode::SUCCESS)
}
