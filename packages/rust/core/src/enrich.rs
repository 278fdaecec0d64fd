//! Description enrichment: draft missing or thin `AssetDescription` values
//! with an LLM before the sync pushes them.
//!
//! The CSV is rewritten in place after the untouched original is copied to
//! `<stem>_backup.<ext>`. A failed completion never stops the pass; the row
//! keeps its description, or gets a `Data asset: <name>` placeholder when it
//! had none.

use std::path::{Path, PathBuf};

use assetsync_llm::ChatClient;
use assetsync_shared::{AssetRow, AssetSyncError, Result, is_blank};
use tracing::{error, info, instrument};

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub csv_path: PathBuf,
    /// Report which rows would be regenerated without calling the LLM or
    /// touching the file.
    pub dry_run: bool,
    /// Descriptions shorter than this (in characters) are regenerated.
    pub min_description_len: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EnrichReport {
    pub rows: usize,
    /// Rows that received an LLM description.
    pub generated: usize,
    /// Rows whose completion failed and kept or received a placeholder.
    pub fallbacks: usize,
    /// Rows whose description was already long enough.
    pub kept: usize,
    /// Rows that would be regenerated (dry run only).
    pub pending: usize,
    pub dry_run: bool,
    /// Copy of the original CSV, when the file was rewritten.
    pub backup_path: Option<PathBuf>,
}

/// Whether a row's description is blank or shorter than `min_len` characters.
pub fn needs_description(row: &AssetRow, min_len: usize) -> bool {
    row.asset_description.trim().chars().count() < min_len
}

/// Description used when generation fails.
pub fn fallback_description(row: &AssetRow) -> String {
    if is_blank(&row.asset_description) {
        format!("Data asset: {}", row.asset_name.trim())
    } else {
        row.asset_description.clone()
    }
}

/// `dir/assets.csv` → `dir/assets_backup.csv`.
pub fn backup_path(csv_path: &Path) -> PathBuf {
    let stem = csv_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match csv_path.extension() {
        Some(ext) => format!("{stem}_backup.{}", ext.to_string_lossy()),
        None => format!("{stem}_backup"),
    };
    csv_path.with_file_name(name)
}

/// Regenerate thin descriptions in place, one row at a time.
pub async fn enrich_rows(
    client: &ChatClient,
    rows: &mut [AssetRow],
    min_len: usize,
    dry_run: bool,
) -> EnrichReport {
    let mut report = EnrichReport {
        rows: rows.len(),
        dry_run,
        ..Default::default()
    };

    for row in rows.iter_mut() {
        if !needs_description(row, min_len) {
            report.kept += 1;
            continue;
        }

        if dry_run {
            info!(asset = %row.label(), "dry run, would generate description");
            report.pending += 1;
            continue;
        }

        match client
            .describe_asset(&row.asset_name, &row.asset_fqn, &row.asset_description)
            .await
        {
            Ok(text) => {
                info!(asset = %row.label(), description = %text, "generated description");
                row.asset_description = text;
                report.generated += 1;
            }
            Err(e) => {
                let fallback = fallback_description(row);
                error!(asset = %row.label(), error = %e, %fallback, "description generation failed");
                row.asset_description = fallback;
                report.fallbacks += 1;
            }
        }
    }

    report
}

/// Enrich the CSV at `options.csv_path`, backing it up before rewriting.
#[instrument(skip_all, fields(csv = %options.csv_path.display(), dry_run = options.dry_run))]
pub async fn enrich_csv(client: &ChatClient, options: &EnrichOptions) -> Result<EnrichReport> {
    let mut rows = assetsync_loader::load_rows(&options.csv_path)?;
    let mut report =
        enrich_rows(client, &mut rows, options.min_description_len, options.dry_run).await;

    if options.dry_run {
        info!(pending = report.pending, kept = report.kept, "dry run, CSV left unchanged");
        return Ok(report);
    }

    let backup = backup_path(&options.csv_path);
    std::fs::copy(&options.csv_path, &backup).map_err(|e| AssetSyncError::io(&backup, e))?;
    assetsync_loader::write_rows(&options.csv_path, &rows)?;

    info!(
        generated = report.generated,
        fallbacks = report.fallbacks,
        kept = report.kept,
        backup = %backup.display(),
        "CSV rewritten with enriched descriptions"
    );
    report.backup_path = Some(backup);
    Ok(report)
}
