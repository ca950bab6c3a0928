//! # Asset Relay Daemon
//!
//! Polls a SharePoint folder and transfers new product images to Salsify.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Relay Daemon                                     │
//! │                                                                         │
//! │  SharePoint ◄── Graph ──┐                                               │
//! │                         │                                               │
//! │                    PollLoop ──► Salsify assets API                      │
//! │                         │                                               │
//! │          processed_files.json   dead_letter.jsonl                       │
//! │                                                                         │
//! │  :8000  /health  /metrics  /status                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod metrics;
mod server;
mod wiring;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use relay_engine::{LogFormat, PollObserver, RelayConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::metrics::PrometheusObserver;
use crate::server::AppState;

/// SharePoint to Salsify asset relay.
#[derive(Debug, Parser)]
#[command(name = "relay-daemon", version, about)]
struct Cli {
    /// Path to relay.toml (defaults to the platform config directory).
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single polling iteration and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = RelayConfig::load(cli.config.clone()).context("Failed to load configuration")?;
    init_tracing(&config);
    config
        .require_credentials()
        .context("Refusing to start without credentials")?;

    info!(
        poll_interval = config.poll.poll_interval_secs,
        batch_size = config.poll.batch_size,
        folder = %config.sharepoint.folder_path,
        "Service starting"
    );

    let metrics = match metrics::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Metrics recorder unavailable, continuing without /metrics data");
            None
        }
    };
    let observer: Arc<dyn PollObserver> = Arc::new(PrometheusObserver);

    let (mut poll_loop, handle) = wiring::build(&config, observer)
        .await
        .context("Failed to build relay engine")?;

    if cli.once {
        let outcome = poll_loop.poll_once().await;
        info!(?outcome, "Single polling iteration complete");
        return Ok(());
    }

    let loop_task = tokio::spawn(poll_loop.run());

    let state = AppState {
        poll: handle.clone(),
        metrics,
    };
    let bind_addr = config.server.bind_address();
    let shutdown_handle = handle.clone();

    // Returns once the signal fires or the listener fails to bind.
    let served = server::serve(&bind_addr, state, async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        shutdown_handle.shutdown();
    })
    .await;
    handle.shutdown();
    loop_task.await.context("Poll loop task failed")?;
    served?;

    info!("Service stopped");
    Ok(())
}

fn init_tracing(config: &RelayConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from(["relay-daemon", "--config", "/etc/relay/relay.toml", "--once"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/relay/relay.toml")));
        assert!(cli.once);

        let cli = Cli::parse_from(["relay-daemon"]);
        assert!(!cli.once);
    }
}
