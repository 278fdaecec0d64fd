//! Application configuration for AssetSync.
//!
//! User config lives at `~/.assetsync/assetsync.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AssetSyncError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "assetsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".assetsync";

/// Qualified names sent per search request. The search service rejects
/// oversized `attributeValue` filters; 25 is the largest size known to work.
pub const DEFAULT_SEARCH_BATCH_SIZE: usize = 25;

/// Entity type used by the unique-attribute lookup. Only this type is
/// reachable by qualified name.
pub const QUALIFIED_NAME_LOOKUP_TYPE: &str = "azure_datalake_gen2_resource_set";

/// Token audience for the catalog data plane.
pub const DEFAULT_SCOPE: &str = "https://purview.azure.net/.default";

/// Descriptions shorter than this (in characters) are regenerated by `enrich`.
pub const DEFAULT_MIN_DESCRIPTION_LEN: usize = 50;

/// Azure instance metadata service token endpoint.
pub const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

// ---------------------------------------------------------------------------
// Config structs (matching assetsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Catalog service settings.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Credential resolution.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Sync run defaults.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Description generation.
    #[serde(default)]
    pub llm: LlmConfig,
}

/// `[catalog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Account base endpoint, e.g. `https://contoso.purview.azure.com`.
    /// Empty until set per deployment.
    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_collections_api_version")]
    pub collections_api_version: String,

    #[serde(default = "default_search_api_version")]
    pub search_api_version: String,

    #[serde(default = "default_unique_attribute_api_version")]
    pub unique_attribute_api_version: String,

    /// Entity type for lookups by qualified name.
    #[serde(default = "default_qualified_name_type")]
    pub qualified_name_type: String,

    /// Names per search request.
    #[serde(default = "default_search_batch_size")]
    pub search_batch_size: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            collections_api_version: default_collections_api_version(),
            search_api_version: default_search_api_version(),
            unique_attribute_api_version: default_unique_attribute_api_version(),
            qualified_name_type: default_qualified_name_type(),
            search_batch_size: default_search_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_collections_api_version() -> String {
    "2023-10-01-preview".into()
}
fn default_search_api_version() -> String {
    "2023-09-01".into()
}
fn default_unique_attribute_api_version() -> String {
    "2023-02-01-preview".into()
}
fn default_qualified_name_type() -> String {
    QUALIFIED_NAME_LOOKUP_TYPE.into()
}
fn default_search_batch_size() -> usize {
    DEFAULT_SEARCH_BATCH_SIZE
}
fn default_timeout_secs() -> u64 {
    60
}

/// `[auth]` section. Holds env var *names*, never secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token audience.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Identity provider base URL.
    #[serde(default = "default_authority_host")]
    pub authority_host: String,

    /// Env var holding a ready-made bearer token (takes precedence).
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    #[serde(default = "default_tenant_id_env")]
    pub tenant_id_env: String,

    #[serde(default = "default_client_id_env")]
    pub client_id_env: String,

    #[serde(default = "default_client_secret_env")]
    pub client_secret_env: String,

    /// Fall back to the host's managed identity when no other credential
    /// is configured.
    #[serde(default = "default_true")]
    pub managed_identity: bool,

    /// Env var with the App Service / Functions identity endpoint.
    #[serde(default = "default_identity_endpoint_env")]
    pub identity_endpoint_env: String,

    /// Env var with the secret header value for that endpoint.
    #[serde(default = "default_identity_header_env")]
    pub identity_header_env: String,

    /// Instance metadata endpoint, used when no identity endpoint is set.
    #[serde(default = "default_imds_endpoint")]
    pub imds_endpoint: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            authority_host: default_authority_host(),
            access_token_env: default_access_token_env(),
            tenant_id_env: default_tenant_id_env(),
            client_id_env: default_client_id_env(),
            client_secret_env: default_client_secret_env(),
            managed_identity: true,
            identity_endpoint_env: default_identity_endpoint_env(),
            identity_header_env: default_identity_header_env(),
            imds_endpoint: default_imds_endpoint(),
        }
    }
}

fn default_scope() -> String {
    DEFAULT_SCOPE.into()
}
fn default_authority_host() -> String {
    "https://login.microsoftonline.com".into()
}
fn default_access_token_env() -> String {
    "ASSETSYNC_ACCESS_TOKEN".into()
}
fn default_tenant_id_env() -> String {
    "AZURE_TENANT_ID".into()
}
fn default_client_id_env() -> String {
    "AZURE_CLIENT_ID".into()
}
fn default_client_secret_env() -> String {
    "AZURE_CLIENT_SECRET".into()
}
fn default_true() -> bool {
    true
}
fn default_identity_endpoint_env() -> String {
    "IDENTITY_ENDPOINT".into()
}
fn default_identity_header_env() -> String {
    "IDENTITY_HEADER".into()
}
fn default_imds_endpoint() -> String {
    IMDS_TOKEN_ENDPOINT.into()
}

/// `[sync]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Asset CSV to read.
    #[serde(default = "default_csv_path")]
    pub csv_path: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
        }
    }
}

fn default_csv_path() -> String {
    "assetinfo.csv".into()
}

/// `[llm]` section: an OpenAI-compatible chat completions service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,

    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,

    /// Descriptions shorter than this are regenerated.
    #[serde(default = "default_min_description_len")]
    pub min_description_len: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_api_key_env(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            min_description_len: default_min_description_len(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_llm_model() -> String {
    "gpt-4".into()
}
fn default_llm_max_tokens() -> u32 {
    200
}
fn default_llm_temperature() -> f64 {
    0.3
}
fn default_min_description_len() -> usize {
    DEFAULT_MIN_DESCRIPTION_LEN
}

impl CatalogConfig {
    /// Parse the endpoint, failing when it was never configured.
    pub fn endpoint_url(&self) -> Result<url::Url> {
        let raw = self.endpoint.trim();
        if raw.is_empty() {
            return Err(AssetSyncError::config(
                "catalog endpoint is not set. Pass --endpoint, set ASSETSYNC_ENDPOINT, \
                 or add `endpoint` under [catalog] in assetsync.toml",
            ));
        }
        url::Url::parse(raw)
            .map_err(|e| AssetSyncError::config(format!("invalid catalog endpoint '{raw}': {e}")))
    }
}

impl AppConfig {
    /// Reject values no run could use. A blank endpoint passes here so that
    /// `--endpoint` can still supply it.
    pub fn validate(&self) -> Result<()> {
        if !self.catalog.endpoint.trim().is_empty() {
            let url = self.catalog.endpoint_url()?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(AssetSyncError::config(format!(
                    "catalog endpoint must be http(s), got '{}'",
                    self.catalog.endpoint
                )));
            }
        }
        if self.catalog.search_batch_size == 0 {
            return Err(AssetSyncError::config("search_batch_size must be at least 1"));
        }
        url::Url::parse(self.llm.base_url.trim()).map_err(|e| {
            AssetSyncError::config(format!("invalid llm base_url '{}': {e}", self.llm.base_url))
        })?;
        Ok(())
    }
}

/// Read the LLM API key from the env var named in `[llm]`.
pub fn llm_api_key(config: &LlmConfig) -> Result<String> {
    llm_api_key_from(config, |name| std::env::var(name).ok())
}

/// [`llm_api_key`] with an injectable variable lookup.
pub fn llm_api_key_from(
    config: &LlmConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    let var_name = &config.api_key_env;
    match lookup(var_name) {
        Some(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(AssetSyncError::config(format!(
            "LLM API key not found. Set the {var_name} environment variable \
             or pass --skip-enrich"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.assetsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AssetSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.assetsync/assetsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AssetSyncError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| AssetSyncError::config(format!("failed to parse {}: {e}", path.display())))?;
    config
        .validate()
        .map_err(|e| AssetSyncError::config(format!("{}: {e}", path.display())))?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AssetSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AssetSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AssetSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
