//! Panel sync CLI
//!
//! Command-line interface for watching dashboard panels and running
//! repository imports against a collaboration server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use panel_sync::auth::StaticTokenStore;
use panel_sync::job::JobOutcome;
use panel_sync::{load_config, Config, PanelSyncBuilder};
use tokio_util::sync::CancellationToken;
use tracing::Level;

#[derive(Parser)]
#[command(name = "panel-sync")]
#[command(about = "Keeps dashboard panels in sync with a collaboration server")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server base URL (overrides config file)
    #[arg(long)]
    base_url: Option<String>,

    /// Anti-forgery token (overrides the configured cookies)
    #[arg(long)]
    csrf_token: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info", value_parser = parse_log_level)]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll every configured panel and print each render until ctrl-c
    Watch,
    /// Import a repository and wait until the import job finishes
    ImportRepository {
        /// Repository name, e.g. owner/repo
        name: String,
    },
}

fn parse_log_level(s: &str) -> Result<Level, String> {
    s.parse().map_err(|_| {
        format!(
            "Invalid log level: {}. Use: trace, debug, info, warn, error",
            s
        )
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, base_url={:?}, command={:?}, log_level={:?}",
        args.config,
        args.base_url,
        args.command,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    if let Some(base_url) = args.base_url {
        config.server.base_url = base_url;
    }

    let cancel = CancellationToken::new();
    let mut builder = PanelSyncBuilder::new(config).with_cancellation_token(cancel.clone());
    if let Some(token) = args.csrf_token {
        builder = builder.with_token_store(Arc::new(StaticTokenStore::new(Some(token))));
    }
    let sync = builder.build()?;

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                cancel.cancel();
            }
            Err(e) => tracing::warn!("Failed to listen for ctrl-c: {}", e),
        }
    });

    match args.command {
        Command::Watch => {
            tracing::info!("Starting panel-sync");
            sync.watch().await?;
            tracing::info!("Panel-sync stopped");
        }
        Command::ImportRepository { name } => match sync.import_repository(&name).await? {
            JobOutcome::Ready { message } => println!("{}", message),
            JobOutcome::Failed { message } => {
                return Err(panel_sync::SyncError::Job(message).into());
            }
            JobOutcome::Cancelled => tracing::info!("Import of '{}' cancelled", name),
        },
    }

    Ok(())
}
