//! Asset CSV reading and writing.
//!
//! The input is a header-led, comma-delimited UTF-8 file. Columns are matched
//! by header name, so their order is irrelevant; unknown columns are ignored
//! and missing ones read as empty strings.

use std::path::Path;

use assetsync_shared::{AssetRow, AssetSyncError, CSV_HEADERS, Result};
use tracing::{debug, info, instrument};

/// Load every row of the asset CSV at `path`, in file order.
///
/// Fails with [`AssetSyncError::FileNotFound`] when the file is absent so the
/// caller can abort before any network call.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_rows(path: &Path) -> Result<Vec<AssetRow>> {
    if !path.exists() {
        return Err(AssetSyncError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let file = std::fs::File::open(path).map_err(|e| AssetSyncError::io(path, e))?;
    let rows = read_rows(file)?;

    info!(rows = rows.len(), "loaded asset rows");
    Ok(rows)
}

/// Parse asset rows from any reader.
pub fn read_rows<R: std::io::Read>(reader: R) -> Result<Vec<AssetRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| AssetSyncError::parse(format!("failed to read CSV header: {e}")))?
        .clone();
    for missing in CSV_HEADERS
        .iter()
        .filter(|h| !headers.iter().any(|c| c == **h))
    {
        debug!(column = missing, "column absent, values default to empty");
    }

    let mut rows = Vec::new();
    for (i, record) in csv_reader.records().enumerate() {
        // +2: one for the header, one for 1-based line numbers
        let line = i + 2;
        let mut record =
            record.map_err(|e| AssetSyncError::parse(format!("CSV row {line}: {e}")))?;
        // Short records read their trailing columns as empty.
        while record.len() < headers.len() {
            record.push_field("");
        }
        let row: AssetRow = record
            .deserialize(Some(&headers))
            .map_err(|e| AssetSyncError::parse(format!("CSV row {line}: {e}")))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Write rows to `path` with the canonical eight-column header.
pub fn write_rows(path: &Path, rows: &[AssetRow]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| AssetSyncError::parse(format!("failed to open {}: {e}", path.display())))?;

    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AssetSyncError::parse(format!("failed to write row: {e}")))?;
    }

    writer.flush().map_err(|e| AssetSyncError::io(path, e))?;
    info!(rows = rows.len(), path = %path.display(), "wrote asset rows");
    Ok(())
}
