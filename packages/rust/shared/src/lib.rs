//! Shared types, error model, and configuration for AssetSync.
//!
//! This crate is the foundation depended on by all other AssetSync crates.
//! It provides:
//! - [`AssetSyncError`]: the unified error type
//! - Domain types ([`AssetRow`], [`CatalogEntity`], [`AssetSummary`], [`Collection`], [`RunId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AuthConfig, CatalogConfig, DEFAULT_MIN_DESCRIPTION_LEN, DEFAULT_SCOPE,
    DEFAULT_SEARCH_BATCH_SIZE, IMDS_TOKEN_ENDPOINT, LlmConfig, QUALIFIED_NAME_LOOKUP_TYPE,
    SyncConfig, config_dir, config_file_path, init_config, llm_api_key, llm_api_key_from,
    load_config, load_config_from,
};
pub use error::{AssetSyncError, Result};
pub use types::{
    AssetRow, AssetSummary, AttributeMap, CSV_HEADERS, CatalogEntity, Collection, RunId, is_blank,
};
