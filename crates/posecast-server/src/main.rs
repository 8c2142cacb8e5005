//! # Posecast Server
//!
//! Streams tracker poses to WebSocket clients at a fixed rate, or relays
//! client messages between clients.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (ws://127.0.0.1:9003/, 30 Hz, text format)
//! posecast
//!
//! # Run with a custom config
//! POSECAST_CONFIG=/path/to/posecast.toml posecast
//!
//! # Run with environment variables
//! POSECAST_PORT=8080 POSECAST_HOST=0.0.0.0 POSECAST_RATE_HZ=60 posecast
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "posecast_server=info,posecast_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        mode = config.mode.as_str(),
        rate_hz = config.stream.update_rate_hz,
        format = %config.stream.wire_format,
        "Starting Posecast server on {}:{}",
        config.host,
        config.port
    );

    // Initialize metrics
    if config.metrics.enabled {
        metrics::init_metrics();
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::error!("Failed to start metrics server: {}", e);
        }
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        on_signal.cancel();
    });

    // Start the server
    handlers::run_server(config, cancel).await?;

    Ok(())
}
