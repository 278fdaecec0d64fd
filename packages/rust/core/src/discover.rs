//! Collection-scoped discovery: which CSV assets exist in their collection.
//!
//! Rows are grouped by `CollectionName`; each group's collection is resolved
//! to its id and searched for the group's `AssetFQN`s. The search hits can
//! then fill in missing guids so the rows become updatable.

use assetsync_catalog::CatalogClient;
use assetsync_shared::{AssetRow, AssetSummary, Result, is_blank};
use tracing::{info, instrument, warn};

/// Discovery result for one collection named in the CSV.
#[derive(Debug, Clone)]
pub struct CollectionMatches {
    /// Display name as written in the CSV.
    pub collection_name: String,
    /// Internal id, `None` when no collection has that display name.
    pub collection_id: Option<String>,
    /// Search hits, in response order.
    pub matched: Vec<AssetSummary>,
    /// Requested qualified names with no hit.
    pub missing: Vec<String>,
}

/// Group rows by collection (first-seen order) with their distinct FQNs.
fn group_by_collection(rows: &[AssetRow]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();

    for row in rows {
        if is_blank(&row.collection_name) || is_blank(&row.asset_fqn) {
            continue;
        }
        let collection = row.collection_name.trim();
        let fqn = row.asset_fqn.trim().to_string();

        match groups.iter_mut().find(|(name, _)| name == collection) {
            Some((_, names)) => {
                if !names.contains(&fqn) {
                    names.push(fqn);
                }
            }
            None => groups.push((collection.to_string(), vec![fqn])),
        }
    }

    groups
}

/// Resolve every collection named in `rows` and search it for the rows' FQNs.
#[instrument(skip_all, fields(rows = rows.len()))]
pub async fn discover_assets(
    client: &CatalogClient,
    rows: &[AssetRow],
) -> Result<Vec<CollectionMatches>> {
    let mut results = Vec::new();

    for (collection_name, names) in group_by_collection(rows) {
        let Some(collection_id) = client.resolve_collection_id(&collection_name).await? else {
            warn!(collection = %collection_name, "collection not found, skipping its assets");
            results.push(CollectionMatches {
                collection_name,
                collection_id: None,
                matched: Vec::new(),
                missing: names,
            });
            continue;
        };

        let matched = client.search_assets(&collection_id, &names).await?;
        let missing: Vec<String> = names
            .into_iter()
            .filter(|name| {
                !matched
                    .iter()
                    .any(|hit| hit.qualified_name.as_deref() == Some(name.as_str()))
            })
            .collect();

        info!(
            collection = %collection_name,
            matched = matched.len(),
            missing = missing.len(),
            "collection searched"
        );
        results.push(CollectionMatches {
            collection_name,
            collection_id: Some(collection_id),
            matched,
            missing,
        });
    }

    Ok(results)
}

/// Copy rows, filling blank guids from search hits with the same qualified
/// name in the row's collection. Guids already present are left alone.
pub fn fill_guids(rows: &[AssetRow], discoveries: &[CollectionMatches]) -> Vec<AssetRow> {
    rows.iter()
        .map(|row| {
            let mut row = row.clone();
            if row.has_guid() || is_blank(&row.asset_fqn) {
                return row;
            }

            let fqn = row.asset_fqn.trim();
            let found = discoveries
                .iter()
                .filter(|d| d.collection_name == row.collection_name.trim())
                .flat_map(|d| d.matched.iter())
                .find(|hit| hit.qualified_name.as_deref() == Some(fqn))
                .and_then(|hit| hit.id.clone());

            if let Some(guid) = found {
                row.guid = guid;
            }
            row
        })
        .collect()
}
