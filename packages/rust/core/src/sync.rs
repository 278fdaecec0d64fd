//! End-to-end sync: CSV → per-row merge and update → catalog.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use assetsync_catalog::CatalogClient;
use assetsync_shared::{AssetRow, Result, RunId};
use tracing::{error, info, instrument, warn};

use crate::update::{UpdateOutcome, update_asset};

/// Configuration for a sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Asset CSV to read.
    pub csv_path: PathBuf,
    /// Build every update but submit none.
    pub dry_run: bool,
}

/// Counts for a finished run. Per-row detail lives in the logs.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub run_id: RunId,
    /// Rows read from the CSV.
    pub rows: usize,
    /// Rows whose update was accepted (or built, in a dry run).
    pub updated: usize,
    /// Rows without a guid.
    pub skipped: usize,
    /// Rows whose entity was missing or whose update was rejected.
    pub failed: usize,
    pub dry_run: bool,
    pub elapsed: Duration,
}

/// Progress callback for reporting sync status.
pub trait SyncReporter: Send + Sync {
    /// Called once the CSV is loaded.
    fn loaded(&self, rows: usize);
    /// Called before a row's update starts.
    fn row_started(&self, index: usize, total: usize, row: &AssetRow);
    /// Called for a row skipped for lack of a guid.
    fn row_skipped(&self, index: usize, row: &AssetRow);
    /// Called after a row's update attempt.
    fn row_finished(&self, index: usize, row: &AssetRow, outcome: &UpdateOutcome);
    /// Called when the run completes.
    fn done(&self, report: &SyncReport);
}

/// No-op reporter for headless/test usage.
pub struct SilentReporter;

impl SyncReporter for SilentReporter {
    fn loaded(&self, _rows: usize) {}
    fn row_started(&self, _index: usize, _total: usize, _row: &AssetRow) {}
    fn row_skipped(&self, _index: usize, _row: &AssetRow) {}
    fn row_finished(&self, _index: usize, _row: &AssetRow, _outcome: &UpdateOutcome) {}
    fn done(&self, _report: &SyncReport) {}
}

/// Load the CSV and update every row that carries a guid.
///
/// A missing CSV fails before any network call. After that only a token
/// failure stops the run; any other per-row failure is logged and the next
/// row proceeds.
#[instrument(skip_all, fields(csv = %options.csv_path.display(), dry_run = options.dry_run))]
pub async fn sync_from_csv(
    client: &CatalogClient,
    options: &SyncOptions,
    reporter: &dyn SyncReporter,
) -> Result<SyncReport> {
    let rows = assetsync_loader::load_rows(&options.csv_path)?;
    reporter.loaded(rows.len());
    sync_rows(client, &rows, options.dry_run, reporter).await
}

/// Update already-loaded rows, strictly one after another in order.
pub async fn sync_rows(
    client: &CatalogClient,
    rows: &[AssetRow],
    dry_run: bool,
    reporter: &dyn SyncReporter,
) -> Result<SyncReport> {
    let start = Instant::now();
    let run_id = RunId::new();
    let total = rows.len();
    let (mut updated, mut skipped, mut failed) = (0, 0, 0);

    info!(%run_id, rows = total, dry_run, "starting sync");

    for (index, row) in rows.iter().enumerate() {
        if !row.has_guid() {
            warn!(asset = %row.label(), line = index + 2, "no guid for asset, skipping row");
            skipped += 1;
            reporter.row_skipped(index, row);
            continue;
        }

        reporter.row_started(index, total, row);
        info!(guid = %row.guid.trim(), asset = %row.label(), "updating asset");

        let outcome = match update_asset(client, row, dry_run).await {
            Ok(outcome) => outcome,
            Err(e) if e.halts_run() => {
                error!(%run_id, error = %e, "sync aborted");
                return Err(e);
            }
            Err(e) => {
                error!(guid = %row.guid.trim(), error = %e, "update failed");
                UpdateOutcome::Rejected { status: None }
            }
        };

        if outcome.is_success() {
            updated += 1;
            info!(guid = %row.guid.trim(), asset = %row.label(), ?outcome, "asset updated");
        } else {
            failed += 1;
            error!(guid = %row.guid.trim(), asset = %row.label(), ?outcome, "failed to update asset");
        }
        reporter.row_finished(index, row, &outcome);
    }

    let report = SyncReport {
        run_id,
        rows: total,
        updated,
        skipped,
        failed,
        dry_run,
        elapsed: start.elapsed(),
    };

    info!(
        run_id = %report.run_id,
        updated = report.updated,
        skipped = report.skipped,
        failed = report.failed,
        elapsed_ms = report.elapsed.as_millis(),
        "sync complete"
    );
    reporter.done(&report);

    Ok(report)
}
