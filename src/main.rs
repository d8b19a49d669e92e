//! # Redirect Balancer - Main Entry Point
//!
//! `redirect-balancer serve --config <file>` loads the JSON configuration, builds
//! the destination pool, starts the redirect listener and runs until SIGINT or
//! SIGTERM, then shuts down gracefully.
//!
//! Exit status is 0 after a shutdown (drained or timed out) and 1 when the
//! configuration cannot be loaded or the listener cannot be started.

use anyhow::Context;
use clap::{Parser, Subcommand};
use redirect_balancer::observability::{init_logging, LogConfig, LogFormat};
use redirect_balancer::{BalancerConfig, RedirectServer, Selector};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

const DEFAULT_CONFIG_FILE: &str = "redirect-balancer.json";

/// Redirecting weighted load balancer
#[derive(Parser, Debug)]
#[command(name = "redirect-balancer", author, version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    /// Log filter (error, warn, info, debug, trace or a full directive); RUST_LOG wins when set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve redirects until interrupted
    Serve {
        /// The config file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig {
        level: cli.log_level.clone(),
        format: cli.log_format,
    };
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = option_env!("BUILD_GIT_HASH").unwrap_or("undefined"),
        "Starting redirect-balancer"
    );

    let result = match &cli.command {
        Command::Serve { config } => serve(config).await,
    };

    if let Err(e) = result {
        error!("Failed to run redirect-balancer: {:#}", e);
        std::process::exit(1);
    }
}

async fn serve(config_path: &Path) -> anyhow::Result<()> {
    let config = BalancerConfig::load_from_file(config_path)
        .await
        .with_context(|| format!("could not load config file {}", config_path.display()))?;

    let selector = Arc::new(
        config
            .build_selector()
            .context("could not build destination pool")?,
    );
    info!(
        destinations = selector.len(),
        algorithm = %selector.algorithm(),
        "Destination pool ready"
    );

    let server = RedirectServer::for_selector(config.bind_target(), selector.clone());
    server
        .start()
        .await
        .context("could not start redirect listener")?;

    wait_for_shutdown_signal().await?;

    if let Err(e) = server.shutdown().await {
        warn!(error = %e, "Shutdown failed");
    }

    let stats = selector.stats();
    info!(
        total = stats.total_selections,
        failed = stats.failed_selections,
        "Selection summary"
    );
    for destination in &stats.destinations {
        info!(
            url = %destination.url,
            weight = destination.weight,
            selections = destination.selections,
            "Destination summary"
        );
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .context("failed to install SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;
    info!("Received Ctrl+C, shutting down");
    Ok(())
}
