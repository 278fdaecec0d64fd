//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assetsync_catalog::{CatalogClient, CatalogOptions};
use assetsync_core::{
    EnrichOptions, EnrichReport, SyncOptions, SyncReport, SyncReporter, UpdateOutcome,
    discover_assets, enrich_csv, fill_guids, sync_from_csv,
};
use assetsync_llm::{ChatClient, ChatOptions};
use assetsync_shared::{
    AppConfig, AssetRow, init_config, llm_api_key, load_config, load_config_from,
};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// AssetSync: keep catalog asset metadata in step with a curated CSV.
#[derive(Parser)]
#[command(
    name = "assetsync",
    version,
    about = "Push curated asset names, descriptions and owners from a CSV into the data catalog.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Catalog account endpoint, overriding the config file.
    #[arg(long, env = "ASSETSYNC_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Config file to load instead of ~/.assetsync/assetsync.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Draft thin descriptions with the LLM, then update every CSV row that
    /// carries a guid.
    Sync {
        /// Asset CSV (defaults to sync.csv_path from config).
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Build and log each update without submitting it. Enrichment only
        /// reports which rows it would regenerate.
        #[arg(long)]
        dry_run: bool,

        /// Push the CSV as-is without generating descriptions.
        #[arg(long)]
        skip_enrich: bool,
    },

    /// Generate descriptions for rows whose description is blank or short,
    /// rewriting the CSV after backing it up.
    Enrich {
        /// Asset CSV (defaults to sync.csv_path from config).
        #[arg(long)]
        csv: Option<PathBuf>,

        /// List the rows that would be regenerated; no LLM calls, no writes.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search each row's collection for its qualified name.
    Discover {
        /// Asset CSV (defaults to sync.csv_path from config).
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write the rows back here with blank guids filled from the search.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Resolve a collection display name to its internal id.
    Collection {
        /// Collection display name (case-insensitive).
        name: String,
    },

    /// Fetch one entity and print it as JSON.
    Entity {
        /// Entity guid.
        #[arg(long, conflicts_with = "qualified_name", required_unless_present = "qualified_name")]
        guid: Option<String>,

        /// Qualified name of a resource set.
        #[arg(long)]
        qualified_name: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "assetsync=info",
        1 => "assetsync=debug",
        _ => "assetsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let Cli {
        endpoint,
        config,
        command,
        ..
    } = cli;

    if let Command::Config { action } = &command {
        return match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config.as_deref(), endpoint.as_deref()),
        };
    }

    let config = resolve_config(config.as_deref(), endpoint.as_deref())?;

    match command {
        Command::Sync {
            csv,
            dry_run,
            skip_enrich,
        } => cmd_sync(&config, csv, dry_run, skip_enrich).await,
        Command::Enrich { csv, dry_run } => cmd_enrich(&config, csv, dry_run).await,
        Command::Discover { csv, out } => cmd_discover(&config, csv, out.as_deref()).await,
        Command::Collection { name } => cmd_collection(&config, &name).await,
        Command::Entity {
            guid,
            qualified_name,
        } => cmd_entity(&config, guid.as_deref(), qualified_name.as_deref()).await,
        Command::Config { .. } => Ok(()),
    }
}

/// Load the config file, then apply flag and environment overrides.
fn resolve_config(path: Option<&Path>, endpoint: Option<&str>) -> Result<AppConfig> {
    let mut config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    if let Some(endpoint) = endpoint {
        config.catalog.endpoint = endpoint.to_string();
    }
    Ok(config)
}

fn build_client(config: &AppConfig) -> Result<CatalogClient> {
    let opts = CatalogOptions::from_config(&config.catalog, &config.auth)?;
    let tokens = assetsync_auth::credential_from_env(&config.auth)?;
    Ok(CatalogClient::new(opts, Arc::from(tokens))?)
}

fn build_chat_client(config: &AppConfig) -> Result<ChatClient> {
    let api_key = llm_api_key(&config.llm)?;
    let opts = ChatOptions::from_config(&config.llm, api_key)?;
    Ok(ChatClient::new(opts)?)
}

fn csv_path(config: &AppConfig, flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| PathBuf::from(&config.sync.csv_path))
}

/// Run the sync, clearing the spinner if the run aborts.
async fn run_sync(
    client: &CatalogClient,
    options: &SyncOptions,
    progress: &CliProgress,
) -> Result<SyncReport> {
    let report = sync_from_csv(client, options, progress)
        .await
        .inspect_err(|_| progress.spinner.finish_and_clear())?;
    Ok(report)
}

/// Run enrichment under the spinner, clearing it either way.
async fn run_enrich(
    client: &ChatClient,
    options: &EnrichOptions,
    progress: &CliProgress,
) -> Result<EnrichReport> {
    progress.spinner.set_message(format!(
        "Generating descriptions for {}",
        options.csv_path.display()
    ));
    let result = enrich_csv(client, options).await;
    progress.spinner.finish_and_clear();
    Ok(result?)
}

fn print_enrich_report(report: &EnrichReport) {
    println!();
    if report.dry_run {
        println!("  Enrichment dry run, CSV left unchanged.");
        println!("  Pending:    {}", report.pending);
    } else {
        println!("  Generated:  {}", report.generated);
        println!("  Fallbacks:  {}", report.fallbacks);
    }
    println!("  Kept:       {}", report.kept);
    if let Some(backup) = &report.backup_path {
        println!("  Backup:     {}", backup.display());
    }
    println!();
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_sync(
    config: &AppConfig,
    csv: Option<PathBuf>,
    dry_run: bool,
    skip_enrich: bool,
) -> Result<()> {
    let client = build_client(config)?;
    let options = SyncOptions {
        csv_path: csv_path(config, csv),
        dry_run,
    };

    if skip_enrich {
        info!("description enrichment skipped");
    } else {
        let chat = build_chat_client(config)?;
        let enrich = EnrichOptions {
            csv_path: options.csv_path.clone(),
            dry_run,
            min_description_len: config.llm.min_description_len,
        };
        let report = run_enrich(&chat, &enrich, &CliProgress::new()?).await?;
        print_enrich_report(&report);
    }

    info!(
        csv = %options.csv_path.display(),
        endpoint = %client.options().endpoint,
        dry_run,
        "syncing asset metadata"
    );

    let reporter = CliProgress::new()?;
    let report = run_sync(&client, &options, &reporter).await?;

    println!();
    if report.dry_run {
        println!("  Dry run finished, nothing was submitted.");
    } else {
        println!("  Assets updated successfully.");
    }
    println!("  Run:      {}", report.run_id);
    println!("  Rows:     {}", report.rows);
    println!("  Updated:  {}", report.updated);
    println!("  Skipped:  {}", report.skipped);
    println!("  Failed:   {}", report.failed);
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_enrich(config: &AppConfig, csv: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let chat = build_chat_client(config)?;
    let options = EnrichOptions {
        csv_path: csv_path(config, csv),
        dry_run,
        min_description_len: config.llm.min_description_len,
    };

    info!(
        csv = %options.csv_path.display(),
        model = %chat.options().model,
        dry_run,
        "enriching asset descriptions"
    );

    let report = run_enrich(&chat, &options, &CliProgress::new()?).await?;
    print_enrich_report(&report);
    Ok(())
}

async fn cmd_discover(config: &AppConfig, csv: Option<PathBuf>, out: Option<&Path>) -> Result<()> {
    let client = build_client(config)?;
    let path = csv_path(config, csv);
    let rows = assetsync_loader::load_rows(&path)?;

    info!(csv = %path.display(), rows = rows.len(), "discovering assets");
    let discoveries = discover_assets(&client, &rows).await?;

    println!();
    for found in &discoveries {
        match &found.collection_id {
            Some(id) => println!("  {} ({id})", found.collection_name),
            None => println!("  {} (collection not found)", found.collection_name),
        }
        for hit in &found.matched {
            println!(
                "    found    {}  {}",
                hit.id.as_deref().unwrap_or("-"),
                hit.qualified_name.as_deref().unwrap_or("-")
            );
        }
        for name in &found.missing {
            println!("    missing  {name}");
        }
    }
    println!();

    if let Some(out) = out {
        let filled: Vec<AssetRow> = fill_guids(&rows, &discoveries);
        let gained = filled
            .iter()
            .zip(&rows)
            .filter(|(after, before)| after.has_guid() && !before.has_guid())
            .count();
        assetsync_loader::write_rows(out, &filled)?;
        println!("  Wrote {} rows ({gained} guids filled) to {}", filled.len(), out.display());
        println!();
    }

    Ok(())
}

async fn cmd_collection(config: &AppConfig, name: &str) -> Result<()> {
    let client = build_client(config)?;
    match client.resolve_collection_id(name).await? {
        Some(id) => {
            println!("{id}");
            Ok(())
        }
        None => Err(eyre!("no collection named '{name}'")),
    }
}

async fn cmd_entity(
    config: &AppConfig,
    guid: Option<&str>,
    qualified_name: Option<&str>,
) -> Result<()> {
    let client = build_client(config)?;

    let entity = match (guid, qualified_name) {
        (Some(guid), _) => client.get_entity_by_guid(guid).await?,
        (None, Some(name)) => client.get_entity_by_qualified_name(name).await?,
        (None, None) => return Err(eyre!("pass --guid or --qualified-name")),
    };

    match entity {
        Some(entity) => {
            println!("{}", serde_json::to_string_pretty(&entity)?);
            Ok(())
        }
        None => Err(eyre!("entity not found")),
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>, endpoint: Option<&str>) -> Result<()> {
    let config = resolve_config(path, endpoint)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Ok(Self { spinner })
    }
}

impl SyncReporter for CliProgress {
    fn loaded(&self, rows: usize) {
        self.spinner.set_message(format!("Loaded {rows} rows"));
    }

    fn row_started(&self, index: usize, total: usize, row: &AssetRow) {
        self.spinner
            .set_message(format!("Updating [{}/{total}] {}", index + 1, row.label()));
    }

    fn row_skipped(&self, _index: usize, row: &AssetRow) {
        self.spinner.println(format!("  skipped  {} (no guid)", row.label()));
    }

    fn row_finished(&self, _index: usize, row: &AssetRow, outcome: &UpdateOutcome) {
        let line = match outcome {
            UpdateOutcome::Updated => format!("  updated  {}", row.label()),
            UpdateOutcome::DryRun => format!("  built    {}", row.label()),
            UpdateOutcome::NotFound => format!("  missing  {} ({})", row.label(), row.guid.trim()),
            UpdateOutcome::Rejected { status: Some(s) } => {
                format!("  failed   {} (HTTP {s})", row.label())
            }
            UpdateOutcome::Rejected { status: None } => format!("  failed   {}", row.label()),
        };
        self.spinner.println(line);
    }

    fn done(&self, _report: &SyncReport) {
        self.spinner.finish_and_clear();
    }
}
