//! kachaka-mock binary entry point.
//!
//! Usage:
//! ```bash
//! kachaka-mock --config kachaka-mock.toml
//! kachaka-mock --bind 127.0.0.1:26400
//! RUST_LOG=kachaka_mock=debug kachaka-mock
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use kachaka_mock::{serve, Config, MockServer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Mock Kachaka API server.
#[derive(Parser, Debug)]
#[command(name = "kachaka-mock")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults are used if it does not exist)
    #[arg(long, short, default_value = "kachaka-mock.toml")]
    config: PathBuf,

    /// Override the bind address from the configuration
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        Config::from_file(&cli.config)?
    } else {
        tracing::info!(path = %cli.config.display(), "no config file, using defaults");
        Config::default()
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    let server = Arc::new(MockServer::from_config(&config)?);
    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;

    tokio::select! {
        result = serve(server, listener) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    Ok(())
}
