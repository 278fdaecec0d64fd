//! AssetSync CLI: push curated asset metadata from a CSV into the catalog.
//!
//! Reads asset rows, fetches each entity by guid, overlays the curated
//! fields and submits the merged entity back.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
