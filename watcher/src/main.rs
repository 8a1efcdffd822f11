//! linkwatch daemon. Loads config.yaml, then watches Telegram until Ctrl+C.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use linkwatch_core::config;
use linkwatch_core::relay::telegram::{run_telegram_watcher, DialPolicy};

#[derive(Debug, Parser)]
#[command(name = "linkwatch", version, about = "Watch Telegram chats and forward subscription links")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, env = "LINKWATCH_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Skip the history backfill for this run even if the config enables it.
    #[arg(long)]
    no_history: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if cli.no_history {
        config = config.with_history(false);
    }
    config.log_summary();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, shutting down");
                on_signal.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl+C"),
        }
    });

    run_telegram_watcher(&config, DialPolicy::default(), cancel).await?;
    info!("bye");
    Ok(())
}
