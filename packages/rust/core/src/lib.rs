//! Sync workflows for AssetSync.
//!
//! This crate ties the CSV loader, the catalog client and the LLM client
//! together into the end-to-end flows: description enrichment ([`enrich`]),
//! per-row merge and update ([`update`]), the sequential sync driver
//! ([`sync`]) and collection-scoped discovery ([`discover`]).

pub mod discover;
pub mod enrich;
pub mod sync;
pub mod update;

pub use discover::{CollectionMatches, discover_assets, fill_guids};
pub use enrich::{EnrichOptions, EnrichReport, enrich_csv, enrich_rows};
pub use sync::{SilentReporter, SyncOptions, SyncReport, SyncReporter, sync_from_csv, sync_rows};
pub use update::{UpdateOutcome, build_update, merge_attributes, update_asset};
