//! HTTP server for the probe and configuration endpoints.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::ConfigError;
use crate::probe::{ProbeError, SharedProber};
use crate::reload::ReloadHandle;

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub prober: SharedProber,
    pub reload: ReloadHandle,
}

#[derive(Debug, Deserialize)]
struct ProbeParams {
    target: Option<String>,
}

/// Create the HTTP router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/probe", get(probe_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/config/reload", post(reload_handler))
        .route("/config/update", post(update_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the /probe endpoint.
async fn probe_handler(
    State(state): State<AppState>,
    Query(params): Query<ProbeParams>,
) -> Response {
    match state.prober.probe(params.target.as_deref()).await {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", EXPOSITION_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            let status = match e {
                ProbeError::TargetMissing | ProbeError::InvalidTarget { .. } => {
                    StatusCode::BAD_REQUEST
                }
                ProbeError::FetchFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
                ProbeError::CollectFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, format!("{}\n", e)).into_response()
        }
    }
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [("content-type", EXPOSITION_CONTENT_TYPE)],
        state.prober.render_stats(),
    )
        .into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /config/reload endpoint.
async fn reload_handler(State(state): State<AppState>) -> Response {
    match state.reload.reload().await {
        Ok(()) => (StatusCode::OK, "OK\n").into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to reload config: {}\n", e),
        )
            .into_response(),
    }
}

/// Handler for the /config/update endpoint.
///
/// An empty body re-reads the file on disk, so any failure is the server's.
async fn update_handler(State(state): State<AppState>, body: String) -> Response {
    let reload_only = body.trim().is_empty();
    match state.reload.update(body).await {
        Ok(()) => (StatusCode::OK, "OK\n").into_response(),
        Err(e) => {
            let status = match e {
                _ if reload_only => StatusCode::INTERNAL_SERVER_ERROR,
                ConfigError::Reload(_) | ConfigError::Load(jsonsight_common::Error::Io(_)) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::BAD_REQUEST,
            };
            (status, format!("failed to update config: {}\n", e)).into_response()
        }
    }
}

/// HTTP server configuration.
pub struct HttpServer {
    state: AppState,
    listen_addr: SocketAddr,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(state: AppState, listen_addr: SocketAddr) -> Self {
        Self { state, listen_addr }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(addr = %self.listen_addr, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                // A dropped sender also means shutdown.
                let _ = shutdown.wait_for(|stop| *stop).await;
                info!("HTTP server draining connections");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Prober;
    use crate::reload::spawn_reloader;
    use crate::store::ConfigStore;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    const CONFIG: &str = r#"{ metrics: [{ name: "m", path: "$.a" }] }"#;

    fn make_state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jsonsight.json5");
        std::fs::write(&path, CONFIG).unwrap();

        let store = Arc::new(ConfigStore::load(&path).unwrap());
        let (reload, _task) = spawn_reloader(store.clone());
        let prober = Arc::new(Prober::new(store));
        (dir, AppState { prober, reload })
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_probe_without_target() {
        let (_dir, state) = make_state();
        let router = create_router(state);

        let response = router
            .oneshot(Request::get("/probe").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("Target parameter is missing"));
    }

    #[tokio::test]
    async fn test_probe_with_empty_target() {
        let (_dir, state) = make_state();
        let router = create_router(state);

        let response = router
            .oneshot(Request::get("/probe?target=").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_probe_unreachable_target() {
        let (_dir, state) = make_state();
        let router = create_router(state);

        let response = router
            .oneshot(
                Request::get("/probe?target=http%3A%2F%2F127.0.0.1%3A1%2F")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (_dir, state) = make_state();
        let router = create_router(state);

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("version=0.0.4"));
        assert!(body_string(response).await.contains("jsonsight_config_metrics 1"));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_dir, state) = make_state();
        let router = create_router(state);

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "healthy\n");
    }

    #[tokio::test]
    async fn test_reload_requires_post() {
        let (_dir, state) = make_state();
        let router = create_router(state);

        let response = router
            .clone()
            .oneshot(Request::get("/config/reload").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = router
            .oneshot(Request::get("/config/update").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_reload_endpoint() {
        let (_dir, state) = make_state();
        let store = state.prober.store().clone();
        let router = create_router(state);

        let response = router
            .clone()
            .oneshot(Request::post("/config/reload").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        std::fs::write(store.path(), "{ not valid").unwrap();
        let response = router
            .oneshot(Request::post("/config/reload").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.get().metrics.len(), 1);
    }

    #[tokio::test]
    async fn test_update_endpoint() {
        let (_dir, state) = make_state();
        let store = state.prober.store().clone();
        let router = create_router(state);

        let body = r#"{ metrics: [{ name: "a", path: "$.a" }, { name: "b", path: "$.b" }] }"#;
        let response = router
            .clone()
            .oneshot(Request::post("/config/update").body(Body::from(body)).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.get().metrics.len(), 2);

        let response = router
            .oneshot(
                Request::post("/config/update")
                    .body(Body::from(r#"{ metrics: [{ name: "bad-name", path: "$.a" }] }"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.get().metrics.len(), 2);
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), body);
    }

    #[tokio::test]
    async fn test_empty_update_with_broken_file() {
        let (_dir, state) = make_state();
        let store = state.prober.store().clone();
        let router = create_router(state);

        std::fs::write(store.path(), r#"{ metrics: [{ name: "bad-name", path: "$.a" }] }"#)
            .unwrap();
        let response = router
            .clone()
            .oneshot(Request::post("/config/update").body(Body::from("  \n")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.get().metrics.len(), 1);

        std::fs::write(store.path(), "{ not valid").unwrap();
        let response = router
            .oneshot(Request::post("/config/update").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.get().metrics.len(), 1);
    }
}
