//! HTTP trigger for the asset sync.
//!
//! `GET` or `POST /api/sync` runs one full sync from the configured CSV and
//! answers once every row has been attempted. Runs never overlap: a trigger
//! that arrives mid-run waits for the current run to finish.

use std::sync::Arc;

use assetsync_catalog::CatalogClient;
use assetsync_core::{SilentReporter, SyncOptions, sync_from_csv};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Body returned once a sync run completes.
pub const SUCCESS_MESSAGE: &str = "Assets updated successfully.";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    client: Arc<CatalogClient>,
    options: Arc<SyncOptions>,
    /// Held for the whole of a run.
    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(client: CatalogClient, options: SyncOptions) -> Self {
        Self {
            client: Arc::new(client),
            options: Arc::new(options),
            run_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Builds the HTTP router for the trigger service.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/sync", get(trigger_sync).post(trigger_sync))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Serve `state` on `listener` until ctrl-c.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "trigger listening");
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

// Per-row failures are only logged; the response covers run-halting errors.
async fn trigger_sync(State(state): State<AppState>) -> Response {
    let _run = state.run_lock.lock().await;
    info!(csv = %state.options.csv_path.display(), "sync triggered");

    match sync_from_csv(&state.client, &state.options, &SilentReporter).await {
        Ok(report) => {
            info!(
                run_id = %report.run_id,
                updated = report.updated,
                failed = report.failed,
                "triggered sync finished"
            );
            (StatusCode::OK, SUCCESS_MESSAGE).into_response()
        }
        Err(e) => {
            error!(error = %e, "triggered sync aborted");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;

    use assetsync_auth::StaticTokenProvider;
    use assetsync_catalog::CatalogOptions;
    use assetsync_shared::{AuthConfig, CatalogConfig};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::json;
    use tower::util::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BODY_LIMIT: usize = 1 << 20;

    fn app(server: &MockServer, csv_path: PathBuf) -> Router {
        let catalog = CatalogConfig {
            endpoint: server.uri(),
            ..Default::default()
        };
        let opts = CatalogOptions::from_config(&catalog, &AuthConfig::default()).unwrap();
        let client = CatalogClient::new(opts, Arc::new(StaticTokenProvider::new("t"))).unwrap();
        build_router(AppState::new(
            client,
            SyncOptions {
                csv_path,
                dry_run: false,
            },
        ))
    }

    fn temp_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn sync_request() -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/sync")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn healthz_answers_ok() {
        let server = MockServer::start().await;
        let response = app(&server, PathBuf::from("unused.csv"))
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn success_text_even_when_rows_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/datamap/api/atlas/v2/entity/guid/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/datamap/api/atlas/v2/entity/guid/g2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entity": {"typeName": "azure_sql_table", "attributes": {"name": "t"}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/datamap/api/atlas/v2/entity"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad entity"))
            .expect(1)
            .mount(&server)
            .await;

        let csv = temp_csv("Guid,AssetDescription\ngone,a\ng2,b\n");
        let response = app(&server, csv.path().to_path_buf())
            .oneshot(sync_request())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, SUCCESS_MESSAGE);
    }

    #[tokio::test]
    async fn get_also_triggers() {
        let server = MockServer::start().await;
        let csv = temp_csv("Guid,AssetName\n,no-guid\n");
        let response = app(&server, csv.path().to_path_buf())
            .oneshot(Request::builder().uri("/api/sync").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overlapping_triggers_run_one_after_another() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/datamap/api/atlas/v2/entity/guid/g1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "entity": {"typeName": "azure_sql_table", "attributes": {"name": "t"}}
                    }))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/datamap/api/atlas/v2/entity"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let csv = temp_csv("Guid,AssetDescription\ng1,a\n");
        let router = app(&server, csv.path().to_path_buf());
        let (first, second) = tokio::join!(
            router.clone().oneshot(sync_request()),
            router.oneshot(sync_request()),
        );
        assert_eq!(first.unwrap().status(), StatusCode::OK);
        assert_eq!(second.unwrap().status(), StatusCode::OK);

        let methods: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.method.to_string())
            .collect();
        assert_eq!(methods, ["GET", "POST", "GET", "POST"]);
    }

    #[tokio::test]
    async fn missing_csv_is_a_server_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent_assets.csv");
        let response = app(&server, missing)
            .oneshot(Request::builder().uri("/api/sync").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("absent_"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
