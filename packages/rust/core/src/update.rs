//! Single-asset update: fetch the entity, overlay the CSV row, submit it back.
//!
//! The catalog's upsert replaces the whole attribute set, so every attribute
//! this tool does not know about is copied from the fetched entity and sent
//! back untouched. Dropping one would erase it in the catalog.

use assetsync_catalog::CatalogClient;
use assetsync_shared::{
    AssetRow, AssetSyncError, AttributeMap, CatalogEntity, Result, is_blank,
};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

/// Catalog attribute written from `AssetDescription`.
pub const ATTR_DESCRIPTION: &str = "userDescription";
/// Catalog attribute written from `AssetFQN`.
pub const ATTR_QUALIFIED_NAME: &str = "qualifiedName";
/// Catalog attribute written from `AssetName`.
pub const ATTR_NAME: &str = "name";
/// Catalog attribute written from `OwnerId`.
pub const ATTR_OWNER: &str = "owner";

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What happened to one row's update attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The catalog accepted the merged entity.
    Updated,
    /// The merged entity was built but not submitted.
    DryRun,
    /// No entity with the row's guid could be fetched; nothing was submitted.
    NotFound,
    /// The submit failed. `status` is absent for transport failures.
    Rejected { status: Option<u16> },
}

impl UpdateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Updated | Self::DryRun)
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Overlay a row onto a copy of an entity's attributes.
///
/// `userDescription` is always written, even when empty. `qualifiedName`,
/// `name` and `owner` are written only when the row's value is not blank.
/// Every other key keeps its value and position.
pub fn merge_attributes(existing: &AttributeMap, row: &AssetRow) -> AttributeMap {
    let mut merged = existing.clone();

    merged.insert(
        ATTR_DESCRIPTION.to_string(),
        Value::String(row.asset_description.clone()),
    );

    for (key, value) in [
        (ATTR_QUALIFIED_NAME, &row.asset_fqn),
        (ATTR_NAME, &row.asset_name),
        (ATTR_OWNER, &row.owner_id),
    ] {
        if !is_blank(value) {
            merged.insert(key.to_string(), Value::String(value.clone()));
        }
    }

    merged
}

/// Build the entity to submit for `guid` from the fetched entity and a row.
pub fn build_update(fetched: &CatalogEntity, guid: &str, row: &AssetRow) -> CatalogEntity {
    CatalogEntity {
        type_name: fetched.type_name.clone(),
        guid: Some(guid.to_string()),
        attributes: merge_attributes(&fetched.attributes, row),
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// Fetch the row's entity by guid, merge the row into it and submit it.
///
/// Returns `Err` only for failures that must stop the whole run (token
/// acquisition). Everything else is reported through [`UpdateOutcome`].
#[instrument(skip_all, fields(guid = %row.guid.trim(), asset = %row.label()))]
pub async fn update_asset(
    client: &CatalogClient,
    row: &AssetRow,
    dry_run: bool,
) -> Result<UpdateOutcome> {
    let guid = row.guid.trim();

    let Some(fetched) = client.get_entity_by_guid(guid).await? else {
        warn!("entity not found, nothing submitted");
        return Ok(UpdateOutcome::NotFound);
    };

    let update = build_update(&fetched, guid, row);

    if dry_run {
        let payload = serde_json::json!({ "entity": &update });
        info!(%payload, "dry run, update not submitted");
        return Ok(UpdateOutcome::DryRun);
    }

    match client.upsert_entity(&update).await {
        Ok(()) => {
            info!(type_name = %update.type_name, "updated entity attributes");
            Ok(UpdateOutcome::Updated)
        }
        Err(e) if e.halts_run() => Err(e),
        Err(AssetSyncError::Upstream { status, body, .. }) => {
            error!(status, %body, "catalog rejected the update");
            Ok(UpdateOutcome::Rejected {
                status: Some(status),
            })
        }
        Err(e) => {
            error!(error = %e, "update could not be submitted");
            Ok(UpdateOutcome::Rejected { status: None })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> AttributeMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn fetched() -> AttributeMap {
        attrs(json!({
            "qualifiedName": "mssql://srv/db/dbo/orders",
            "name": "orders",
            "owner": "old-owner",
            "userDescription": "old text",
            "createTime": 0,
            "columns": [{"guid": "c1"}],
            "principalId": null
        }))
    }

    #[test]
    fn description_always_written_other_blanks_ignored() {
        let row = AssetRow {
            asset_description: "".into(),
            asset_name: "   ".into(),
            ..Default::default()
        };
        let merged = merge_attributes(&fetched(), &row);

        assert_eq!(merged[ATTR_DESCRIPTION], json!(""));
        assert_eq!(merged[ATTR_NAME], json!("orders"));
        assert_eq!(merged[ATTR_OWNER], json!("old-owner"));
        assert_eq!(merged[ATTR_QUALIFIED_NAME], json!("mssql://srv/db/dbo/orders"));
    }

    #[test]
    fn non_blank_fields_overwrite() {
        let row = AssetRow {
            asset_fqn: "mssql://srv/db/dbo/orders_v2".into(),
            asset_name: "orders_v2".into(),
            asset_description: "Orders, version two".into(),
            owner_id: "new-owner".into(),
            ..Default::default()
        };
        let merged = merge_attributes(&fetched(), &row);

        assert_eq!(merged[ATTR_QUALIFIED_NAME], json!("mssql://srv/db/dbo/orders_v2"));
        assert_eq!(merged[ATTR_NAME], json!("orders_v2"));
        assert_eq!(merged[ATTR_DESCRIPTION], json!("Orders, version two"));
        assert_eq!(merged[ATTR_OWNER], json!("new-owner"));
    }

    #[test]
    fn unknown_attributes_echo_back_unchanged() {
        let existing = fetched();
        let row = AssetRow {
            asset_description: "x".into(),
            owner_id: "o".into(),
            ..Default::default()
        };
        let merged = merge_attributes(&existing, &row);

        for key in ["createTime", "columns", "principalId"] {
            assert_eq!(merged[key], existing[key], "{key} changed");
        }
        let before: Vec<&String> = existing.keys().collect();
        let after: Vec<&String> = merged.keys().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn numbers_echo_back_exactly() {
        let existing: AttributeMap = serde_json::from_str(
            r#"{"bigId":123456789012345678901234567890,"ratio":0.10000000000000000555,"createTime":1700000000000}"#,
        )
        .unwrap();
        let entity = CatalogEntity {
            type_name: "azure_sql_table".into(),
            guid: None,
            attributes: existing,
        };

        let update = build_update(&entity, "g1", &AssetRow::default());
        let wire = serde_json::to_string(&update.attributes).unwrap();
        assert_eq!(
            wire,
            r#"{"bigId":123456789012345678901234567890,"ratio":0.10000000000000000555,"createTime":1700000000000,"userDescription":""}"#
        );
    }

    #[test]
    fn description_added_when_absent() {
        let existing = attrs(json!({"name": "t"}));
        let row = AssetRow {
            asset_description: "new".into(),
            ..Default::default()
        };
        let merged = merge_attributes(&existing, &row);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[ATTR_DESCRIPTION], json!("new"));
        assert!(!merged.contains_key(ATTR_OWNER));
    }

    #[test]
    fn build_update_uses_fetched_type_and_row_guid() {
        let entity = CatalogEntity {
            type_name: "azure_sql_table".into(),
            guid: Some("server-side".into()),
            attributes: fetched(),
        };
        let row = AssetRow::default();
        let update = build_update(&entity, "g1", &row);
        assert_eq!(update.type_name, "azure_sql_table");
        assert_eq!(update.guid.as_deref(), Some("g1"));
    }

    #[test]
    fn outcome_success_flags() {
        assert!(UpdateOutcome::Updated.is_success());
        assert!(UpdateOutcome::DryRun.is_success());
        assert!(!UpdateOutcome::NotFound.is_success());
        assert!(!UpdateOutcome::Rejected { status: Some(500) }.is_success());
    }
}
