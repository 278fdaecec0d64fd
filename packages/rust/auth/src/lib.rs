//! Bearer token acquisition for the catalog API.
//!
//! Callers ask a [`TokenProvider`] for a token before every outbound request.
//! Nothing is cached here; each call goes to the identity provider (or returns
//! the fixed token) again.
//!
//! [`credential_from_env`] walks the same order a hosted deployment expects:
//! a fixed token, then a service principal secret, then the host's managed
//! identity.

use std::time::Duration;

use assetsync_shared::{AssetSyncError, AuthConfig, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

/// Timeout for token requests.
const TOKEN_TIMEOUT_SECS: u64 = 30;

/// API version of the App Service / Functions identity endpoint.
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// API version of the instance metadata identity endpoint.
const IMDS_API_VERSION: &str = "2018-02-01";

fn token_http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(TOKEN_TIMEOUT_SECS))
        .build()
        .map_err(|e| AssetSyncError::Network(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

/// A bearer credential with an optional expiry.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    /// When the identity provider says the token stops being valid.
    pub expires_on: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_on: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: secret.into(),
            expires_on,
        }
    }

    /// The raw token for the `Authorization: Bearer` header.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Anything that can produce a bearer token for a scope.
///
/// Failures are [`AssetSyncError::Auth`] and are never retried.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self, scope: &str) -> Result<AccessToken>;
}

// ---------------------------------------------------------------------------
// StaticTokenProvider
// ---------------------------------------------------------------------------

/// Hands out the same pre-acquired token for every scope.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken> {
        Ok(AccessToken::new(self.token.clone(), None))
    }
}

// ---------------------------------------------------------------------------
// ClientSecretCredential
// ---------------------------------------------------------------------------

/// OAuth2 client-credentials grant against the identity provider.
pub struct ClientSecretCredential {
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    client: Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl ClientSecretCredential {
    pub fn new(
        authority_host: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self> {
        let client = token_http_client()?;

        Ok(Self {
            authority_host: authority_host.into(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            client,
        })
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

#[async_trait]
impl TokenProvider for ClientSecretCredential {
    #[instrument(skip_all, fields(scope = %scope))]
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let url = self.token_url();
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
        ];

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AssetSyncError::Auth(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssetSyncError::Auth(format!(
                "token endpoint returned HTTP {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AssetSyncError::Auth(format!("malformed token response: {e}")))?;

        let expires_on = token
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        debug!(?expires_on, "acquired access token");

        Ok(AccessToken::new(token.access_token, expires_on))
    }
}

// ---------------------------------------------------------------------------
// ManagedIdentityCredential
// ---------------------------------------------------------------------------

/// Where the host exposes its identity.
#[derive(Debug, Clone)]
enum IdentitySource {
    /// App Service / Functions: `IDENTITY_ENDPOINT` plus `IDENTITY_HEADER`.
    AppService { endpoint: String, header: String },
    /// VM instance metadata service.
    Imds { endpoint: String },
}

/// Token from the managed identity of the machine or app the process runs in.
pub struct ManagedIdentityCredential {
    source: IdentitySource,
    /// Set for a user-assigned identity.
    client_id: Option<String>,
    client: Client,
}

/// Identity endpoints send `expires_on` as epoch seconds, usually as a string.
#[derive(Deserialize)]
struct ManagedIdentityToken {
    access_token: String,
    #[serde(default)]
    expires_on: Option<Value>,
}

impl ManagedIdentityCredential {
    /// Use the App Service / Functions identity endpoint.
    pub fn app_service(
        endpoint: impl Into<String>,
        header: impl Into<String>,
        client_id: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            source: IdentitySource::AppService {
                endpoint: endpoint.into(),
                header: header.into(),
            },
            client_id,
            client: token_http_client()?,
        })
    }

    /// Use the instance metadata service at `endpoint`.
    pub fn imds(endpoint: impl Into<String>, client_id: Option<String>) -> Result<Self> {
        Ok(Self {
            source: IdentitySource::Imds {
                endpoint: endpoint.into(),
            },
            client_id,
            client: token_http_client()?,
        })
    }
}

/// Identity endpoints take a resource, not a scope.
fn resource_for(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

fn epoch_seconds(value: &Value) -> Option<DateTime<Utc>> {
    let secs = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0)
}

#[async_trait]
impl TokenProvider for ManagedIdentityCredential {
    #[instrument(skip_all, fields(scope = %scope))]
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let mut query = vec![("resource", resource_for(scope))];
        if let Some(id) = &self.client_id {
            query.push(("client_id", id.as_str()));
        }

        let request = match &self.source {
            IdentitySource::AppService { endpoint, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION));
                self.client
                    .get(endpoint)
                    .header("X-IDENTITY-HEADER", header)
                    .query(&query)
            }
            IdentitySource::Imds { endpoint } => {
                query.push(("api-version", IMDS_API_VERSION));
                self.client.get(endpoint).header("Metadata", "true").query(&query)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| AssetSyncError::Auth(format!("managed identity endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssetSyncError::Auth(format!(
                "managed identity endpoint returned HTTP {status}: {body}"
            )));
        }

        let token: ManagedIdentityToken = response
            .json()
            .await
            .map_err(|e| AssetSyncError::Auth(format!("malformed managed identity token: {e}")))?;

        let expires_on = token.expires_on.as_ref().and_then(epoch_seconds);
        debug!(?expires_on, source = self.source_kind(), "acquired managed identity token");

        Ok(AccessToken::new(token.access_token, expires_on))
    }
}

impl ManagedIdentityCredential {
    fn source_kind(&self) -> &'static str {
        match self.source {
            IdentitySource::AppService { .. } => "app_service",
            IdentitySource::Imds { .. } => "imds",
        }
    }
}

// ---------------------------------------------------------------------------
// Environment selection
// ---------------------------------------------------------------------------

/// Pick a credential from the environment variables named in `config`.
///
/// In order: a ready-made token; tenant id, client id and client secret
/// together; the managed identity (App Service endpoint when its variables
/// are set, instance metadata otherwise). A lone client id selects a
/// user-assigned identity.
pub fn credential_from_env(config: &AuthConfig) -> Result<Box<dyn TokenProvider>> {
    credential_from_lookup(config, |name| std::env::var(name).ok())
}

fn credential_from_lookup(
    config: &AuthConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn TokenProvider>> {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = get(&config.access_token_env) {
        debug!(var = %config.access_token_env, "using static access token");
        return Ok(Box::new(StaticTokenProvider::new(token)));
    }

    match (
        get(&config.tenant_id_env),
        get(&config.client_id_env),
        get(&config.client_secret_env),
    ) {
        (Some(tenant), Some(client_id), Some(secret)) => {
            debug!(tenant = %tenant, "using client secret credential");
            return Ok(Box::new(ClientSecretCredential::new(
                &config.authority_host,
                tenant,
                client_id,
                secret,
            )?));
        }
        _ => {}
    }

    if !config.managed_identity {
        return Err(AssetSyncError::config(format!(
            "no credentials found. Set {} or all of {}, {}, {}",
            config.access_token_env,
            config.tenant_id_env,
            config.client_id_env,
            config.client_secret_env
        )));
    }

    let user_assigned = get(&config.client_id_env);
    match (
        get(&config.identity_endpoint_env),
        get(&config.identity_header_env),
    ) {
        (Some(endpoint), Some(header)) => {
            debug!(%endpoint, "using app service managed identity");
            Ok(Box::new(ManagedIdentityCredential::app_service(
                endpoint,
                header,
                user_assigned,
            )?))
        }
        _ => {
            debug!(endpoint = %config.imds_endpoint, "using instance metadata managed identity");
            Ok(Box::new(ManagedIdentityCredential::imds(
                &config.imds_endpoint,
                user_assigned,
            )?))
        }
    }
}
