//! pg-store binary entry point.
//!
//! Usage:
//! ```bash
//! pg-store --config store.toml
//! pg-store --bind 0.0.0.0:29500
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use stateless_pg_store::http;
use stateless_pg_store::{Config, StoreServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Rendezvous key-value store for stateless process groups.
#[derive(Parser, Debug)]
#[command(name = "pg-store")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Override `server.bind_address`
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    let server = Arc::new(StoreServer::new(config));

    if server.config().http.enabled {
        let address = server.config().http.bind_address.clone();
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind HTTP listener on {address}"))?;
        tracing::info!("HTTP endpoints on {}", address);

        let router = http::build_router(server.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("HTTP server failed: {}", e);
            }
        });
    }

    tokio::select! {
        result = server.clone().run() => {
            result.context("Store server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}
