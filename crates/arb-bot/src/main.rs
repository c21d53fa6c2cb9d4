//! arb-bot: cross-exchange perpetual-futures arbitrage engine.
//!
//! Usage:
//!   arb-bot [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>     Config file path (default: config/bots.toml)
//!   -l, --log-level <LVL>   Log level override (trace..error)
//!   --dry-run               Force dry-run on every bot regardless of config

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use arb_bot::config::AppConfig;
use arb_bot::manager::BotManager;
use arb_bot::snapshot::Observer;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "arb-bot")]
#[command(about = "Cross-exchange perpetual-futures arbitrage engine")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/bots.toml")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Force dry-run on every bot
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // Credentials may live in a .env file; a missing file is fine.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: failed to load .env file: {}", e);
        }
    }

    let args = Args::parse();

    let mut config = if args.config.exists() {
        AppConfig::from_file(&args.config)
            .with_context(|| format!("failed to load config from {:?}", args.config))?
    } else {
        anyhow::bail!("config file not found at {:?}", args.config);
    };
    config.apply_env_overrides();

    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    if args.dry_run {
        for bot in &mut config.bots {
            bot.dry_run = true;
        }
    }
    config.validate().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!(bots = config.bots.len(), "starting arb-bot");

    // Drain observer snapshots; an external dashboard would consume these.
    let (observer, mut observer_rx) = Observer::channel(256);
    tokio::spawn(async move {
        while let Some(snapshot) = observer_rx.recv().await {
            debug!(
                bot = %snapshot.id,
                trades = snapshot.stats.trades,
                errors = snapshot.stats.errors,
                "snapshot"
            );
        }
    });

    let manager = BotManager::new(config.venues.clone()).with_observer(observer);
    for bot in config.bots.clone() {
        let id = bot.id.clone();
        match manager.create_bot(bot).await {
            Ok(id) => info!(bot = %id, "bot running"),
            Err(e) => warn!(bot = %id, error = %e, "failed to start bot"),
        }
    }

    if manager.bot_ids().is_empty() {
        anyhow::bail!("no bot could be started");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    manager.shutdown().await;
    info!("all bots stopped");
    Ok(())
}
