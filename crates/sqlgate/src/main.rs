//! sqlgate - database gateway with live credential rotation
//!
//! This binary serves the database commands on the configured endpoint and,
//! when a Vault section is configured, rotates the database credentials
//! without dropping requests.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sqlgate::{config, service, Context};

#[derive(Parser)]
#[command(name = "sqlgate")]
#[command(version)]
#[command(about = "Database gateway with live credential rotation")]
struct Cli {
    /// Path to configuration file (defaults and SDS_* env vars when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the service endpoint, e.g. tcp://0.0.0.0:8002
    #[arg(long)]
    listen: Option<String>,

    /// Enable verbose/debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => config::load_config(path),
        None => config::load_config_from_env(),
    };

    // Priority: --verbose flag, then RUST_LOG env var, then the configured level
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| match &loaded {
            Ok(config) => config.logging.level.clone(),
            Err(_) => "info".to_string(),
        })
    };
    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting sqlgate v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match &cli.config {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("Using default configuration with SDS_* overrides"),
    }

    if let Some(listen) = cli.listen {
        config.service.url = listen;
        if let Err(e) = config.validate() {
            error!("Invalid --listen endpoint: {}", e);
            return ExitCode::FAILURE;
        }
    }

    match service::run_until(&config, Context::new(), shutdown_signal()).await {
        Ok(()) => {
            info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("sqlgate stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
