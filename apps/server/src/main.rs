//! AssetSync trigger service.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use assetsync_catalog::{CatalogClient, CatalogOptions};
use assetsync_core::SyncOptions;
use assetsync_server::{AppState, serve};
use assetsync_shared::{load_config, load_config_from};
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, fmt};

/// Serve the sync trigger over HTTP.
#[derive(Parser)]
#[command(name = "assetsync-server", version, about)]
struct Args {
    /// Address to bind.
    #[arg(long, env = "ASSETSYNC_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Catalog account endpoint, overriding the config file.
    #[arg(long, env = "ASSETSYNC_ENDPOINT")]
    endpoint: Option<String>,

    /// Config file to load instead of ~/.assetsync/assetsync.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Asset CSV (defaults to sync.csv_path from config).
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Emit JSON logs.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("assetsync=info"));
    if args.json_logs {
        fmt().json().with_env_filter(env_filter).init();
    } else {
        fmt().with_env_filter(env_filter).with_target(false).init();
    }

    let mut config = match &args.config {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    if let Some(endpoint) = args.endpoint {
        config.catalog.endpoint = endpoint;
    }

    let opts = CatalogOptions::from_config(&config.catalog, &config.auth)?;
    let tokens = assetsync_auth::credential_from_env(&config.auth)?;
    let client = CatalogClient::new(opts, Arc::from(tokens))?;

    let options = SyncOptions {
        csv_path: args
            .csv
            .unwrap_or_else(|| PathBuf::from(&config.sync.csv_path)),
        dry_run: false,
    };

    let addr: SocketAddr = args.bind.parse().wrap_err("failed to parse bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err("failed to bind trigger listener")?;

    serve(listener, AppState::new(client, options))
        .await
        .wrap_err("trigger server error")?;
    Ok(())
}
