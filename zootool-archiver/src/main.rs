mod config;
mod sync;

use std::path::PathBuf;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zootool_core::ZootoolClient;

use config::{API_KEY_VAR, ArchiverConfig, USERNAME_VAR};
use sync::engine::SyncEngine;
use sync::index::MetadataIndex;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CliArgs {
    directory: Option<PathBuf>,
    username: Option<String>,
    api_key: Option<String>,
    drop_orphans: bool,
    help: bool,
}

fn parse_cli_args<I>(args: I) -> anyhow::Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut iter = args.into_iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-u" | "--username" => {
                parsed.username = Some(iter.next().context("--username needs a value")?);
            }
            "-k" | "--key" => {
                parsed.api_key = Some(iter.next().context("--key needs a value")?);
            }
            "--drop-orphans" => parsed.drop_orphans = true,
            "--help" | "-h" => parsed.help = true,
            other if !other.starts_with('-') && parsed.directory.is_none() => {
                parsed.directory = Some(PathBuf::from(other));
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(parsed)
}

fn print_usage() {
    println!("Usage: zootool-archiver [options] <directory>");
    println!();
    println!("Options:");
    println!("  -u, --username <username>  Zootool username (or {USERNAME_VAR})");
    println!("  -k, --key <api key>        Zootool API key (or {API_KEY_VAR})");
    println!("      --drop-orphans         Remove index entries whose file is gone");
    println!("  -h, --help                 Show this help");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args = parse_cli_args(std::env::args())?;
    if args.help {
        print_usage();
        return Ok(());
    }
    let Some(directory) = args.directory else {
        print_usage();
        anyhow::bail!("destination directory is required");
    };
    let config = ArchiverConfig::resolve(directory, args.username, args.api_key, args.drop_orphans)?;

    std::fs::create_dir_all(&config.root)
        .with_context(|| format!("create destination directory {}", config.root.display()))?;

    let client = match config.endpoint.as_deref() {
        Some(endpoint) => ZootoolClient::with_base_url(endpoint, config.api_key.as_str())?,
        None => ZootoolClient::new(config.api_key.as_str())?,
    };
    let index = MetadataIndex::load(&config.root, config.orphan_policy)?;

    let cancel = CancellationToken::new();
    let trip = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing up");
            trip.cancel();
        }
    });

    let mut engine = SyncEngine::new(
        client,
        index,
        config.root.clone(),
        config.username.clone(),
        cancel,
    );
    engine.run().await?;
    Ok(())
}
