//! # Legalize Listen
//!
//! Connects to the Legalize realtime channel and logs every message.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! LEGALIZE_TOKEN=... legalize-listen
//!
//! # Run with custom config
//! legalize-listen --config /path/to/legalize.toml
//!
//! # Point at another backend
//! LEGALIZE_WS_URL=wss://api.legalize.example legalize-listen
//! ```

mod config;
mod listen;
mod metrics;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "legalize-listen")]
#[command(about = "Listen on the Legalize realtime channel and log every message", version)]
struct Args {
    /// Path to a TOML config file. Searched for in the usual places when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "legalize=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match args.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };

    tracing::info!(
        url = %config.realtime.url,
        channels = config.channels.len(),
        "Starting Legalize listener"
    );

    if config.metrics.enabled {
        metrics::start_metrics_server(config.metrics.port)?;
    }

    listen::run(config).await
}
