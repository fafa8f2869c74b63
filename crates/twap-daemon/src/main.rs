//! twapd: polls reference-rate upstreams and maintains TWAP feeds.
//!
//! `twapd run` drives the poll loop on a Tokio interval, writing feed
//! snapshots as it goes and once more on Ctrl-C or SIGTERM. `twapd replay`
//! pushes recorded samples through a fresh engine offline.

mod config;
mod provider;
mod replay;
mod service;
mod snapshot;

use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use twap_oracle::{Clock, SystemClock};

use crate::config::DaemonConfig;
use crate::service::Service;

#[derive(Parser, Debug)]
#[command(name = "twapd", version)]
#[command(about = "Time-weighted average price oracle daemon")]
struct Cli {
    /// Path to the TOML config file (falls back to $TWAPD_CONFIG, then ./twapd.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll upstreams and maintain feeds until Ctrl-C or SIGTERM
    Run,
    /// Replay JSON-lines samples through a fresh engine and print the results
    Replay {
        /// Input file, one `{"price": "...", "timestamp": ...}` object per line
        #[arg(short, long)]
        input: PathBuf,

        /// TWAP interval in seconds
        #[arg(long, default_value_t = 900)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = DaemonConfig::load(cli.config.as_deref())?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("twap={}", config.logging.log_level).parse()?),
        )
        .init();

    match cli.command {
        Command::Run => run(config).await,
        Command::Replay { input, interval } => {
            let file = std::fs::File::open(&input)
                .with_context(|| format!("opening {}", input.display()))?;
            let samples = replay::replay(
                &config.engine,
                interval,
                BufReader::new(file),
                std::io::stdout().lock(),
            )?;
            info!(samples, "replay complete");
            Ok(())
        }
    }
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!("twapd starting");

    let clock = SystemClock;
    let mut service = Service::build(&config, clock.now())?;
    info!(feeds = ?service.names(), "feeds loaded");

    let period = Duration::from_secs(config.updater.poll_interval_secs);
    service.run_until(&clock, period, shutdown_signal()).await?;
    info!("twapd stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Ctrl-C received, shutting down"),
        () = terminate => info!("SIGTERM received, shutting down"),
    }
}
