//! Digest Bot: one-shot entrypoint for a scheduler (cron, CI job).
//! Loads config, runs a single fetch → select → post cycle, persists state.
//!
//! Always exits successfully: failures are logged so an unattended schedule never breaks.

use clap::Parser;
use digest_bot::{AppConfig, Coordinator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "digest-bot", version, about = "Fetch, select and post a news digest")]
struct Cli {
    /// TOML config (default: $DIGEST_CONFIG, then config/digest.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// State file path; overrides config and STATE_PATH
    #[arg(long)]
    state: Option<PathBuf>,

    /// Summarize and log statuses without posting
    #[arg(long)]
    dry_run: bool,

    /// Ignore the stored state and start empty
    #[arg(long)]
    reset_state: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("digest_bot=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = match &cli.config {
        Some(p) => AppConfig::load_from(p)?,
        None => AppConfig::load_default()?,
    };
    cfg.apply_env(|k| std::env::var(k).ok());
    if let Some(p) = cli.state {
        cfg.state_path = p;
    }

    if !cli.dry_run && cfg.publish.token.is_empty() {
        tracing::info!("MASTODON_TOKEN not set; nothing to do");
        return Ok(());
    }

    let coordinator = Coordinator::from_config(cfg, cli.dry_run)?;
    let report = coordinator.run(cli.reset_state).await?;
    tracing::info!(?report, "done");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = ?e, "run failed");
    }
    ExitCode::SUCCESS
}
