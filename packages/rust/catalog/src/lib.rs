//! HTTP client for the metadata catalog.
//!
//! Wraps the handful of catalog endpoints the sync needs: the account's
//! collection listing, the collection-scoped search query, the two entity
//! lookups (by guid, by qualified name) and the entity upsert. Every request
//! asks the [`TokenProvider`] for a fresh bearer token first.

use std::sync::Arc;
use std::time::Duration;

use assetsync_auth::TokenProvider;
use assetsync_shared::{
    AssetSummary, AssetSyncError, AuthConfig, CatalogConfig, CatalogEntity, Collection, Result,
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument};
use url::Url;

/// Everything except the RFC 3986 unreserved characters is escaped, so a
/// space goes out as `%20` rather than `+`.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// User-Agent string for catalog requests.
const USER_AGENT: &str = concat!("AssetSync/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Resolved settings for a [`CatalogClient`].
#[derive(Debug, Clone)]
pub struct CatalogOptions {
    /// Account base endpoint.
    pub endpoint: Url,
    /// Token audience requested for every call.
    pub scope: String,
    pub collections_api_version: String,
    pub search_api_version: String,
    pub unique_attribute_api_version: String,
    /// Entity type used by [`CatalogClient::get_entity_by_qualified_name`].
    pub qualified_name_type: String,
    /// Qualified names per search request.
    pub search_batch_size: usize,
    pub timeout_secs: u64,
}

impl CatalogOptions {
    /// Build options from the `[catalog]` and `[auth]` config sections.
    pub fn from_config(catalog: &CatalogConfig, auth: &AuthConfig) -> Result<Self> {
        if catalog.search_batch_size == 0 {
            return Err(AssetSyncError::config("search_batch_size must be at least 1"));
        }

        Ok(Self {
            endpoint: catalog.endpoint_url()?,
            scope: auth.scope.clone(),
            collections_api_version: catalog.collections_api_version.clone(),
            search_api_version: catalog.search_api_version.clone(),
            unique_attribute_api_version: catalog.unique_attribute_api_version.clone(),
            qualified_name_type: catalog.qualified_name_type.clone(),
            search_batch_size: catalog.search_batch_size,
            timeout_secs: catalog.timeout_secs,
        })
    }
}

// ---------------------------------------------------------------------------
// Wire envelopes
// ---------------------------------------------------------------------------

/// `{ "value": [...] }` envelope used by listing and search responses.
#[derive(Deserialize)]
struct ValueList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

/// `{ "entity": {...} }` envelope used by the Atlas entity endpoints.
#[derive(Deserialize)]
struct EntityEnvelope {
    #[serde(default)]
    entity: Option<CatalogEntity>,
}

// ---------------------------------------------------------------------------
// CatalogClient
// ---------------------------------------------------------------------------

/// Authenticated client for one catalog account.
pub struct CatalogClient {
    opts: CatalogOptions,
    http: Client,
    tokens: Arc<dyn TokenProvider>,
}

impl CatalogClient {
    /// Create a client that authenticates through `tokens`.
    pub fn new(opts: CatalogOptions, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| AssetSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { opts, http, tokens })
    }

    /// The options this client was built with.
    pub fn options(&self) -> &CatalogOptions {
        &self.opts
    }

    /// List the account's collections (first page only).
    #[instrument(skip_all)]
    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        let url = format!(
            "{}/account/collections?api-version={}",
            self.base(),
            self.opts.collections_api_version
        );
        let request = self.authorized(self.http.get(&url)).await?;
        let response = send(request, &url).await?;
        let response = ensure_success(response, "list collections").await?;
        let listing: ValueList<Collection> = read_json(response, "collection listing").await?;

        debug!(count = listing.value.len(), "listed collections");
        Ok(listing.value)
    }

    /// Resolve a collection's display name to its internal identifier.
    ///
    /// Matching is case-insensitive on `friendlyName`; the first match wins.
    #[instrument(skip_all, fields(collection = %display_name))]
    pub async fn resolve_collection_id(&self, display_name: &str) -> Result<Option<String>> {
        let collections = self.list_collections().await?;
        let id = collections
            .into_iter()
            .find(|c| c.matches(display_name))
            .and_then(|c| c.name);

        match &id {
            Some(id) => info!(%id, "collection resolved"),
            None => info!("no collection with that name"),
        }
        Ok(id)
    }

    /// Search a collection for entities with the given qualified names.
    ///
    /// Names are sent in chunks of `search_batch_size`. Hits are returned in
    /// response order, chunk after chunk. A failing chunk fails the whole
    /// search and nothing gathered so far is returned.
    #[instrument(skip_all, fields(collection_id = %collection_id, names = qualified_names.len()))]
    pub async fn search_assets(
        &self,
        collection_id: &str,
        qualified_names: &[String],
    ) -> Result<Vec<AssetSummary>> {
        let url = format!(
            "{}/datamap/api/search/query?api-version={}",
            self.base(),
            self.opts.search_api_version
        );
        let batch_size = self.opts.search_batch_size.max(1);
        let mut hits = Vec::new();

        for (index, chunk) in qualified_names.chunks(batch_size).enumerate() {
            let body = serde_json::json!({
                "keywords": null,
                "limit": batch_size,
                "filter": {
                    "collectionId": collection_id,
                    "attributeName": "qualifiedName",
                    "attributeValue": chunk,
                }
            });

            let request = self.authorized(self.http.post(&url).json(&body)).await?;
            let response = send(request, &url).await?;
            let response = ensure_success(
                response,
                format!("search assets in collection '{collection_id}'"),
            )
            .await?;
            let page: ValueList<AssetSummary> = read_json(response, "search response").await?;

            debug!(batch = index, hits = page.value.len(), "search batch complete");
            hits.extend(page.value);
        }

        info!(hits = hits.len(), "search complete");
        Ok(hits)
    }

    /// Fetch an entity by guid. Any failure other than token acquisition is
    /// logged and reported as `None`.
    #[instrument(skip_all, fields(guid = %guid))]
    pub async fn get_entity_by_guid(&self, guid: &str) -> Result<Option<CatalogEntity>> {
        let url = format!("{}/datamap/api/atlas/v2/entity/guid/{guid}", self.base());
        self.fetch_entity(&url, "guid", guid).await
    }

    /// Fetch an entity by qualified name through the unique-attribute endpoint.
    ///
    /// Only entities of the configured `qualified_name_type` can be found this
    /// way. Same not-found contract as [`Self::get_entity_by_guid`].
    #[instrument(skip_all, fields(qualified_name = %qualified_name))]
    pub async fn get_entity_by_qualified_name(
        &self,
        qualified_name: &str,
    ) -> Result<Option<CatalogEntity>> {
        let encoded = utf8_percent_encode(qualified_name, QUERY_COMPONENT);
        let url = format!(
            "{}/catalog/api/atlas/v2/entity/uniqueAttribute/type/{}?attr:qualifiedName={encoded}&api-version={}",
            self.base(),
            self.opts.qualified_name_type,
            self.opts.unique_attribute_api_version
        );
        self.fetch_entity(&url, "qualifiedName", qualified_name).await
    }

    /// Submit a full entity. The catalog replaces the stored attribute set
    /// with exactly what is sent.
    #[instrument(skip_all, fields(type_name = %entity.type_name))]
    pub async fn upsert_entity(&self, entity: &CatalogEntity) -> Result<()> {
        let url = format!("{}/datamap/api/atlas/v2/entity", self.base());
        let body = serde_json::json!({ "entity": entity });

        let request = self.authorized(self.http.post(&url).json(&body)).await?;
        let response = send(request, &url).await?;
        ensure_success(response, "update entity").await?;
        Ok(())
    }

    // -- helpers ------------------------------------------------------------

    fn base(&self) -> &str {
        self.opts.endpoint.as_str().trim_end_matches('/')
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.get_token(&self.opts.scope).await?;
        Ok(request.bearer_auth(token.secret()))
    }

    async fn fetch_entity(
        &self,
        url: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<CatalogEntity>> {
        let request = self.authorized(self.http.get(url)).await?;

        let response = match send(request, url).await {
            Ok(response) => response,
            Err(e) => {
                error!(%key, %value, error = %e, "entity lookup failed");
                return Ok(None);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%key, %value, status = status.as_u16(), %body, "entity lookup returned an error");
            return Ok(None);
        }

        match read_json::<EntityEnvelope>(response, "entity response").await {
            Ok(EntityEnvelope {
                entity: Some(entity),
            }) => Ok(Some(entity)),
            Ok(EntityEnvelope { entity: None }) => {
                error!(%key, %value, "entity response has no entity");
                Ok(None)
            }
            Err(e) => {
                error!(%key, %value, error = %e, "entity response could not be decoded");
                Ok(None)
            }
        }
    }
}

async fn send(request: RequestBuilder, url: &str) -> Result<Response> {
    request
        .send()
        .await
        .map_err(|e| AssetSyncError::Network(format!("{url}: {e}")))
}

/// Turn a non-success status into [`AssetSyncError::Upstream`] carrying the body.
async fn ensure_success(response: Response, context: impl Into<String>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let context = context.into();
    let body = response.text().await.unwrap_or_default();
    error!(%context, status = status.as_u16(), %body, "catalog request failed");
    Err(AssetSyncError::upstream(context, status.as_u16(), body))
}

async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| AssetSyncError::Network(format!("failed to read {what}: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| AssetSyncError::parse(format!("invalid {what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetsync_auth::StaticTokenProvider;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CatalogClient {
        let catalog = CatalogConfig {
            endpoint: server.uri(),
            ..Default::default()
        };
        let opts = CatalogOptions::from_config(&catalog, &AuthConfig::default()).unwrap();
        CatalogClient::new(opts, Arc::new(StaticTokenProvider::new("test-token"))).unwrap()
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("name-{i:02}")).collect()
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let catalog = CatalogConfig {
            endpoint: "https://contoso.purview.azure.com".into(),
            search_batch_size: 0,
            ..Default::default()
        };
        assert!(CatalogOptions::from_config(&catalog, &AuthConfig::default()).is_err());
    }

    #[tokio::test]
    async fn resolves_collection_case_insensitively() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/account/collections"))
            .and(query_param("api-version", "2023-10-01-preview"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"name": "root1", "friendlyName": "Root"},
                    {"name": "nameless"},
                    {"friendlyName": "Sales Data"},
                    {"name": "abc123", "friendlyName": "sales data"}
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let id = client.resolve_collection_id("Sales Data").await.unwrap();
        assert_eq!(id.as_deref(), Some("abc123"));

        let missing = client.resolve_collection_id("Finance").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn collection_listing_failure_surfaces_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/account/collections"))
            .respond_with(ResponseTemplate::new(403).set_body_string("not a collection admin"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .resolve_collection_id("Sales")
            .await
            .unwrap_err();
        match err {
            AssetSyncError::Upstream { status, body, .. } => {
                assert_eq!(status, 403);
                assert_eq!(body, "not a collection admin");
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_batches_and_preserves_order() {
        let server = MockServer::start().await;

        for (batch, first) in [(0, 0), (1, 25), (2, 50)] {
            Mock::given(method("POST"))
                .and(path("/datamap/api/search/query"))
                .and(query_param("api-version", "2023-09-01"))
                .and(body_string_contains(format!("\"name-{first:02}\"")))
                .and(body_partial_json(json!({
                    "limit": 25,
                    "filter": {"collectionId": "abc123", "attributeName": "qualifiedName"}
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "value": [
                        {"id": format!("hit-{batch}-a")},
                        {"id": format!("hit-{batch}-b")}
                    ]
                })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let hits = client_for(&server)
            .search_assets("abc123", &names(60))
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().filter_map(|h| h.id.as_deref()).collect();
        assert_eq!(
            ids,
            ["hit-0-a", "hit-0-b", "hit-1-a", "hit-1-b", "hit-2-a", "hit-2-b"]
        );

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        let last: serde_json::Value = serde_json::from_slice(&requests[2].body).unwrap();
        assert_eq!(last["filter"]["attributeValue"].as_array().unwrap().len(), 10);
        assert_eq!(last["keywords"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn search_exact_multiple_of_batch_size() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/datamap/api/search/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .expect(2)
            .mount(&server)
            .await;

        let hits = client_for(&server)
            .search_assets("abc123", &names(50))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn search_with_no_names_sends_nothing() {
        let server = MockServer::start().await;
        let hits = client_for(&server).search_assets("abc123", &[]).await.unwrap();
        assert!(hits.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_failure_discards_partial_results() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_string_contains("\"name-00\""))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"value": [{"id": "early"}]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("\"name-25\""))
            .respond_with(ResponseTemplate::new(500).set_body_string("search unavailable"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("\"name-50\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .search_assets("abc123", &names(60))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetSyncError::Upstream { status: 500, .. }));
    }

    #[tokio::test]
    async fn entity_by_guid_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/datamap/api/atlas/v2/entity/guid/g1"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entity": {
                    "typeName": "azure_sql_table",
                    "guid": "g1",
                    "attributes": {"name": "orders", "owner": null}
                },
                "referredEntities": {}
            })))
            .mount(&server)
            .await;

        let entity = client_for(&server)
            .get_entity_by_guid("g1")
            .await
            .unwrap()
            .expect("entity");
        assert_eq!(entity.type_name, "azure_sql_table");
        assert_eq!(entity.attributes["name"], json!("orders"));
    }

    #[tokio::test]
    async fn entity_by_guid_missing_is_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/datamap/api/atlas/v2/entity/guid/nope"))
            .respond_with(ResponseTemplate::new(404).set_body_string("ATLAS-404-00-005"))
            .mount(&server)
            .await;

        let entity = client_for(&server).get_entity_by_guid("nope").await.unwrap();
        assert!(entity.is_none());
    }

    #[tokio::test]
    async fn entity_without_envelope_is_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
            .mount(&server)
            .await;

        let entity = client_for(&server).get_entity_by_guid("g1").await.unwrap();
        assert!(entity.is_none());
    }

    #[tokio::test]
    async fn entity_by_qualified_name_encodes_name() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(
                "/catalog/api/atlas/v2/entity/uniqueAttribute/type/azure_datalake_gen2_resource_set",
            ))
            .and(query_param(
                "attr:qualifiedName",
                "https://lake.dfs.core.windows.net/raw/sales/{N}.parquet",
            ))
            .and(query_param("api-version", "2023-02-01-preview"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entity": {"typeName": "azure_datalake_gen2_resource_set", "guid": "rs1", "attributes": {}}
            })))
            .mount(&server)
            .await;

        let entity = client_for(&server)
            .get_entity_by_qualified_name("https://lake.dfs.core.windows.net/raw/sales/{N}.parquet")
            .await
            .unwrap()
            .expect("entity");
        assert_eq!(entity.guid.as_deref(), Some("rs1"));

        let requests = server.received_requests().await.unwrap();
        let query = requests[0].url.query().unwrap_or_default();
        assert!(query.starts_with("attr:qualifiedName=https%3A%2F%2F"));
    }

    #[tokio::test]
    async fn qualified_name_spaces_are_percent_encoded() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entity": {"typeName": "azure_datalake_gen2_resource_set", "attributes": {}}
            })))
            .mount(&server)
            .await;

        client_for(&server)
            .get_entity_by_qualified_name("https://lake/raw/my folder/a+b.csv")
            .await
            .unwrap()
            .expect("entity");

        let requests = server.received_requests().await.unwrap();
        let query = requests[0].url.query().unwrap_or_default();
        assert!(
            query.starts_with("attr:qualifiedName=https%3A%2F%2Flake%2Fraw%2Fmy%20folder%2Fa%2Bb.csv&"),
            "{query}"
        );
    }

    #[tokio::test]
    async fn upsert_sends_entity_envelope() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/datamap/api/atlas/v2/entity"))
            .and(body_partial_json(json!({
                "entity": {"typeName": "azure_sql_table", "guid": "g1", "attributes": {"name": "orders"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"mutatedEntities": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let mut attributes = assetsync_shared::AttributeMap::new();
        attributes.insert("name".into(), json!("orders"));
        let entity = CatalogEntity {
            type_name: "azure_sql_table".into(),
            guid: Some("g1".into()),
            attributes,
        };
        client_for(&server).upsert_entity(&entity).await.unwrap();
    }

    #[tokio::test]
    async fn upsert_rejection_is_upstream_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid attribute"))
            .mount(&server)
            .await;

        let entity = CatalogEntity {
            type_name: "azure_sql_table".into(),
            guid: Some("g1".into()),
            attributes: Default::default(),
        };
        let err = client_for(&server).upsert_entity(&entity).await.unwrap_err();
        assert!(matches!(err, AssetSyncError::Upstream { status: 400, ref body, .. } if body == "invalid attribute"));
    }
}
