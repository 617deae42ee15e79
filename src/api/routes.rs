//! HTTP route handlers.

use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::discovery::GoogleSearchDiscovery;
use crate::extract::{ExtractionStats, Extractor, HttpFetcher, LlmOracle};
use crate::llm::{LlmClient, OpenRouterClient};
use crate::store;
use crate::task::{Orchestrator, OrchestratorSettings, Query, TaskId};

use super::types::*;

/// How long shutdown waits for running searches.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Shared application state.
pub struct AppState {
    pub orchestrator: Orchestrator,
}

/// Build the application router.
///
/// When `static_dir` is set its files are served for any path the API does
/// not claim.
pub fn router(state: Arc<AppState>, static_dir: Option<&FsPath>) -> Router {
    let mut app = Router::new()
        .route("/start-search", post(start_search))
        .route("/search-status/:task_id", get(search_status))
        .route("/health", get(health))
        .route("/stats", get(get_stats));

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire the production collaborators and start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let store = store::connect(config.redis_url.as_deref()).await?;

    let discovery = Arc::new(GoogleSearchDiscovery::new(
        config.google_api_key.clone(),
        config.search_engine_id.clone(),
        config.max_sources,
    )?);

    let llm: Arc<dyn LlmClient> = Arc::new(OpenRouterClient::new(config.openrouter_api_key.clone()));
    let extractor = Extractor::new(
        Arc::new(HttpFetcher::new(config.fetch_timeout)?),
        Arc::new(LlmOracle::new(llm, config.extraction_model.clone())),
        config.extraction_timeout,
        Arc::new(ExtractionStats::new()),
    );

    let orchestrator = Orchestrator::new(
        discovery,
        extractor,
        store,
        OrchestratorSettings {
            ttl: config.task_ttl,
            max_concurrent_tasks: config.max_concurrent_tasks,
        },
    );

    let state = Arc::new(AppState {
        orchestrator: orchestrator.clone(),
    });
    let app = router(state, config.static_dir.as_deref());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    // Setup graceful shutdown on SIGTERM/SIGINT
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if orchestrator.shutdown(SHUTDOWN_GRACE).await {
        tracing::info!("Graceful shutdown complete");
    } else {
        tracing::warn!(
            "Shutdown grace of {:?} elapsed with searches still running",
            SHUTDOWN_GRACE
        );
    }

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight searches...");
}

/// Start a search task.
async fn start_search(
    State(state): State<Arc<AppState>>,
    body: Result<Json<StartSearchRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StartSearchResponse>), (StatusCode, String)> {
    // Wrong types and unparsable bodies are client errors like blank fields
    let Json(req) = body.map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;
    let query =
        Query::new(req.query, req.country).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let handle = state.orchestrator.submit(query).await.map_err(|e| {
        tracing::error!("Failed to register search task: {}", e);
        (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartSearchResponse {
            task_id: handle.id(),
        }),
    ))
}

/// Get the status of a search task.
async fn search_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<SearchStatusResponse>, (StatusCode, String)> {
    let not_found = || (StatusCode::NOT_FOUND, "Task not found".to_string());

    let id = TaskId::parse(&task_id).ok_or_else(not_found)?;
    let record = state
        .orchestrator
        .status(id)
        .await
        .map_err(|e| {
            tracing::error!(task_id = %id, "Failed to read task: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        })?
        .ok_or_else(not_found)?;

    Ok(Json(record.status.into()))
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get task and extraction counters.
async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        tasks: state.orchestrator.counters(),
        extraction: state.orchestrator.extraction_stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SharedTaskStore, TaskStore};
    use crate::task::{TaskRecord, TaskStatus};
    use crate::testing::{FakeDiscovery, FakeFetcher, FakeOracle, FlakyStore, PutFailure};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app_with(discovery: FakeDiscovery, oracle: FakeOracle, store: SharedTaskStore) -> (Router, Orchestrator) {
        app_with_settings(discovery, oracle, store, OrchestratorSettings::default())
    }

    fn app_with_settings(
        discovery: FakeDiscovery,
        oracle: FakeOracle,
        store: SharedTaskStore,
        settings: OrchestratorSettings,
    ) -> (Router, Orchestrator) {
        let extractor = Extractor::new(
            Arc::new(FakeFetcher::new()),
            Arc::new(oracle),
            Duration::from_secs(60),
            Arc::new(ExtractionStats::new()),
        );
        let orchestrator = Orchestrator::new(
            Arc::new(discovery),
            extractor,
            store,
            settings,
        );
        let state = Arc::new(AppState {
            orchestrator: orchestrator.clone(),
        });
        (router(state, None), orchestrator)
    }

    fn app() -> (Router, Orchestrator) {
        app_with(
            FakeDiscovery::new(["https://u1.example", "https://u2.example"]),
            FakeOracle::new()
                .with_product("https://u1.example", "Red Sneaker A", 49.99, "USD")
                .with_product("https://u2.example", "Red Sneaker B", 39.99, "USD"),
            Arc::new(FlakyStore::new(PutFailure::Never)),
        )
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_start_search_accepts_and_returns_task_id() {
        let (app, _) = app();
        let response = app
            .oneshot(post_json("/start-search", json!({"query": "red sneakers", "country": "US"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        let task_id = body["task_id"].as_str().unwrap();
        assert!(TaskId::parse(task_id).is_some());
    }

    #[tokio::test]
    async fn test_start_search_rejects_blank_fields() {
        let (app, orchestrator) = app();
        for body in [
            json!({"query": "  ", "country": "US"}),
            json!({"query": "kettle"}),
            json!({}),
        ] {
            let response = app
                .clone()
                .oneshot(post_json("/start-search", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(orchestrator.counters().submitted, 0);
    }

    #[tokio::test]
    async fn test_start_search_rejects_wrong_types_and_bad_json() {
        let (app, orchestrator) = app();
        for body in [
            json!({"query": 5, "country": "US"}),
            json!({"query": "kettle", "country": ["US"]}),
            json!(["kettle", "US"]),
        ] {
            let response = app
                .clone()
                .oneshot(post_json("/start-search", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        let garbage = Request::builder()
            .method("POST")
            .uri("/start-search")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(garbage).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(orchestrator.counters().submitted, 0);
    }

    #[tokio::test]
    async fn test_start_search_store_failure_is_unavailable() {
        let (app, _) = app_with(
            FakeDiscovery::new(["https://u1.example"]),
            FakeOracle::new(),
            Arc::new(FlakyStore::new(PutFailure::All)),
        );
        let response = app
            .oneshot(post_json("/start-search", json!({"query": "kettle", "country": "IN"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_status_reports_completed_offers() {
        let (app, orchestrator) = app();
        let handle = orchestrator
            .submit(Query::new("red sneakers", "US").unwrap())
            .await
            .unwrap();
        let id = handle.id();
        handle.finished().await;

        let response = app
            .oneshot(get(&format!("/search-status/{}", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "status": "completed",
                "data": [
                    {"link": "https://u2.example", "price": 39.99, "currency": "USD", "productName": "Red Sneaker B"},
                    {"link": "https://u1.example", "price": 49.99, "currency": "USD", "productName": "Red Sneaker A"}
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_status_reports_pending_and_failed() {
        let store = Arc::new(FlakyStore::new(PutFailure::Never));
        let (app, _) = app_with(FakeDiscovery::new(Vec::<&str>::new()), FakeOracle::new(), store.clone());

        let pending = TaskRecord::pending(TaskId::new());
        store.put(pending.id, &pending, Duration::from_secs(60)).await.unwrap();
        let response = app
            .clone()
            .oneshot(get(&format!("/search-status/{}", pending.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "pending", "data": null}));

        let failed = TaskRecord::pending(TaskId::new())
            .transition(TaskStatus::Failed("No sources found".into()))
            .unwrap();
        store.put(failed.id, &failed, Duration::from_secs(60)).await.unwrap();
        let response = app
            .oneshot(get(&format!("/search-status/{}", failed.id)))
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            json!({"status": "failed", "data": "No sources found"})
        );
    }

    #[tokio::test]
    async fn test_status_unknown_or_invalid_id_is_not_found() {
        let (app, _) = app();
        for uri in [
            format!("/search-status/{}", TaskId::new()),
            "/search-status/not-a-task".to_string(),
        ] {
            let response = app.clone().oneshot(get(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_is_not_found_after_retention_window() {
        let ttl = Duration::from_secs(3600);
        let (app, orchestrator) = app_with_settings(
            FakeDiscovery::new(["https://u1.example"]),
            FakeOracle::new().with_product("https://u1.example", "Kettle", 25.0, "USD"),
            Arc::new(FlakyStore::new(PutFailure::Never)),
            OrchestratorSettings {
                ttl,
                max_concurrent_tasks: 4,
            },
        );

        let response = app
            .clone()
            .oneshot(post_json("/start-search", json!({"query": "kettle", "country": "US"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let task_id = body_json(response).await["task_id"].as_str().unwrap().to_string();
        assert!(orchestrator.shutdown(Duration::from_secs(5)).await);

        let uri = format!("/search-status/{}", task_id);
        tokio::time::advance(ttl - Duration::from_secs(1)).await;
        let response = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "completed");

        tokio::time::advance(Duration::from_secs(1)).await;
        let response = app.oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_and_stats() {
        let (app, orchestrator) = app();
        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");

        orchestrator
            .submit(Query::new("red sneakers", "US").unwrap())
            .await
            .unwrap()
            .finished()
            .await;

        let stats = body_json(app.oneshot(get("/stats")).await.unwrap()).await;
        assert_eq!(stats["tasks"]["submitted"], 1);
        assert_eq!(stats["tasks"]["completed"], 1);
        assert_eq!(stats["extraction"]["found"], 2);
        assert_eq!(stats["extraction"]["malformed"], 0);
    }

    #[tokio::test]
    async fn test_static_files_served_as_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Price Scout</h1>").unwrap();

        let (_, orchestrator) = app();
        let state = Arc::new(AppState { orchestrator });
        let app = router(state, Some(dir.path()));

        let response = app.clone().oneshot(get("/index.html")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"<h1>Price Scout</h1>");

        // API routes take precedence
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
