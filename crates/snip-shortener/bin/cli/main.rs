mod cli;

use crate::cli::{Command, LogFormat, CLI};
use anyhow::{bail, Context, Result};
use clap::Parser;
use snip_generator::RandomGenerator;
use snip_shortener::{BatchRequestItem, Shortened, ShortenerError, ShortenerService};
use snip_storage::{open_repository, Repository, ShortCode};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type Service = ShortenerService<dyn Repository, RandomGenerator>;

#[tokio::main]
async fn main() -> Result<()> {
    let config = CLI::parse();
    init_tracing(&config.log_level, config.log_format)?;

    let storage = config.storage_config();
    info!(
        storage = storage.backend().name(),
        base_url = %config.base_url,
        log_format = %config.log_format,
        "starting snip"
    );

    let repository = open_repository(&storage)
        .await
        .context("failed to open storage")?;
    let service = ShortenerService::new(
        repository,
        RandomGenerator::new(),
        config.service_config(),
    );

    let outcome = run(&service, config.command, &config.user).await;
    // Deletions are applied before exit; a one-shot process has no later chance.
    service.drain().await.context("failed to close storage")?;
    outcome
}

fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level).with_context(|| format!("invalid log level {level:?}"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

async fn run(service: &Service, command: Command, user: &str) -> Result<()> {
    match command {
        Command::Shorten { url } => {
            let shortened = service.shorten(&url, user).await?;
            if let Shortened::Existing(_) = shortened {
                warn!(url = %url, "url was already shortened");
            }
            println!("{}", shortened.url());
        }
        Command::Batch { urls } => {
            let items = urls
                .into_iter()
                .enumerate()
                .map(|(i, original_url)| BatchRequestItem {
                    correlation_id: i.to_string(),
                    original_url,
                })
                .collect();
            let response = service.shorten_batch(items, user).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Resolve { code } => match service.resolve(&ShortCode::new(code.as_str())).await {
            Ok(Some(url)) => println!("{url}"),
            Ok(None) => bail!("short code not found: {code}"),
            Err(ShortenerError::Gone(_)) => bail!("short code has been deleted: {code}"),
            Err(err) => return Err(err.into()),
        },
        Command::List => {
            let urls = service.user_urls(user).await?;
            println!("{}", serde_json::to_string_pretty(&urls)?);
        }
        Command::Delete { codes } => {
            let count = codes.len();
            let codes = codes.into_iter().map(ShortCode::new).collect();
            service.delete_urls(codes, user).await?;
            println!("accepted {count} code(s) for deletion");
        }
        Command::Ping => {
            service.ping().await.context("storage is unreachable")?;
            println!("ok");
        }
        Command::Stats => {
            let stats = service.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
