//! # PeerPlay Relay
//!
//! Realtime relay for watch-together sessions: presence, chat and seek
//! broadcast, partitioned by room.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (port 4000)
//! peerplay
//!
//! # Run with custom config
//! peerplay --config /path/to/peerplay.toml
//!
//! # Run with environment variables
//! PEERPLAY_PORT=8080 PEERPLAY_HOST=0.0.0.0 peerplay
//! ```
//!
//! Clients connect to `ws://<host>:<port>/ws?username=<name>`.

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "peerplay_server=debug,peerplay_core=debug,peerplay_transport=info".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!(
        "Starting PeerPlay relay on {}:{}",
        config.host,
        config.port
    );

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
