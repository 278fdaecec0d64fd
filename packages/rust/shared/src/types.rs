//! Core domain types: CSV rows and the catalog's entity shapes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered attribute bag of a catalog entity.
///
/// `serde_json` is built with `preserve_order`, so this keeps the key order
/// the catalog returned when the entity is echoed back.
pub type AttributeMap = serde_json::Map<String, serde_json::Value>;

/// Column headers recognized in the asset CSV, in canonical write order.
pub const CSV_HEADERS: [&str; 8] = [
    "CollectionName",
    "AssetFQN",
    "AssetName",
    "AssetDescription",
    "OwnerId",
    "ParentAssetFQN",
    "IsColumn",
    "Guid",
];

/// True for empty or whitespace-only strings.
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one sync run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AssetRow
// ---------------------------------------------------------------------------

/// One line of the asset CSV. Every field is text; absent columns are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetRow {
    /// Display name of the target collection (discovery only).
    #[serde(rename = "CollectionName")]
    pub collection_name: String,
    /// Fully-qualified name to assign.
    #[serde(rename = "AssetFQN")]
    pub asset_fqn: String,
    /// Display name to assign.
    #[serde(rename = "AssetName")]
    pub asset_name: String,
    /// Description; always written, even when empty.
    #[serde(rename = "AssetDescription")]
    pub asset_description: String,
    /// Owner identity to assign.
    #[serde(rename = "OwnerId")]
    pub owner_id: String,
    /// Hierarchical parent. Parsed but not used by the update path.
    #[serde(rename = "ParentAssetFQN")]
    pub parent_asset_fqn: String,
    /// Column-level flag. Parsed but not used by the update path.
    #[serde(rename = "IsColumn")]
    pub is_column: String,
    /// Catalog guid. Rows without one are skipped.
    #[serde(rename = "Guid")]
    pub guid: String,
}

impl AssetRow {
    /// Whether this row carries a usable guid.
    pub fn has_guid(&self) -> bool {
        !is_blank(&self.guid)
    }

    /// Name used in log lines: asset name, then FQN, then guid.
    pub fn label(&self) -> &str {
        [&self.asset_name, &self.asset_fqn, &self.guid]
            .into_iter()
            .find(|s| !is_blank(s))
            .map(String::as_str)
            .unwrap_or("<unnamed>")
    }
}

// ---------------------------------------------------------------------------
// Catalog shapes
// ---------------------------------------------------------------------------

/// An entity as returned by the catalog's Atlas endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntity {
    /// Catalog-defined type discriminator.
    #[serde(rename = "typeName")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default)]
    pub attributes: AttributeMap,
}

/// A search hit from the collection-scoped query endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(
        rename = "qualifiedName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub qualified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "entityType", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(
        rename = "collectionId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub collection_id: Option<String>,
    /// Every other field the search service returned.
    #[serde(flatten)]
    pub extra: AttributeMap,
}

/// An entry of the account's collection listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Internal collection identifier. Some listings carry entries without one.
    #[serde(default)]
    pub name: Option<String>,
    /// Human-readable display name.
    #[serde(rename = "friendlyName", default)]
    pub friendly_name: Option<String>,
}

impl Collection {
    /// Case-insensitive match of the display name. Entries without an
    /// identifier never match.
    pub fn matches(&self, display_name: &str) -> bool {
        self.name.as_deref().is_some_and(|n| !n.is_empty())
            && self
                .friendly_name
                .as_deref()
                .is_some_and(|f| !f.is_empty() && f.to_lowercase() == display_name.to_lowercase())
    }
}
