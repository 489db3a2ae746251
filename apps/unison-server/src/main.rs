//! Unison Server - standalone shared listening session server.
//!
//! Hosts one playback session: listeners connect over WebSocket, share a
//! queue, and stream the resolved audio from the media directory.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use unison_core::{bootstrap_services, start_server, AppState};

use crate::config::ServerConfig;

/// Unison Server - shared listening sessions with a synchronized queue.
#[derive(Parser, Debug)]
#[command(name = "unison-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "UNISON_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "UNISON_BIND_PORT")]
    port: Option<u16>,

    /// Media directory (overrides config file).
    #[arg(short = 'm', long, env = "UNISON_MEDIA_DIR")]
    media_dir: Option<PathBuf>,

    /// Queue snapshot file loaded at startup (overrides config file).
    #[arg(short = 's', long, env = "UNISON_SNAPSHOT")]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Unison Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(media_dir) = args.media_dir {
        config.media_dir = media_dir;
    }
    if let Some(snapshot) = args.snapshot {
        config.snapshot_path = Some(snapshot);
    }

    log::info!(
        "Configuration: bind_port={}, media_dir={}, accounts={}",
        config.bind_port,
        config.media_dir.display(),
        config.accounts.len()
    );

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config)
        .await
        .context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    let app_state = AppState::new(&services);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown; cancelling the token also stops the server
    services.shutdown().await;

    if let Err(e) = server_handle.await {
        log::warn!("Server task ended abnormally: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
