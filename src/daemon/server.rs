//! HTTP server for the Dockyard daemon
//!
//! GET endpoints read their parameters from the query string and POST
//! endpoints from a JSON object body. Using the other method on a known path
//! is answered with 400.

use super::api::{
    ApiHandler, ApiRequest, ApiResponse, BuildParams, ContainerParams, IdParams, ImageParams,
};
use crate::error::{DockyardError, Result};
use crate::orchestrator::Orchestrator;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::routing::{get, post};
use axum::Router;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Default listen address for the daemon
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Dockyard daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Address the HTTP listener binds to
    pub listen_addr: SocketAddr,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Application state shared with handlers
#[derive(Clone)]
pub struct AppState {
    pub handler: ApiHandler,
}

/// Build the router for every endpoint
pub fn create_router(handler: ApiHandler) -> Router {
    let state = AppState { handler };

    Router::new()
        .route("/", get(greeting).fallback(invalid_method))
        // Images
        .route("/create-image", post(create_image).fallback(invalid_method))
        .route("/get-image", get(get_image).fallback(invalid_method))
        .route("/get-image-id-by-tag", get(get_image_id).fallback(invalid_method))
        .route("/delete-image", post(delete_image).fallback(invalid_method))
        // Containers
        .route("/create-container", post(create_container).fallback(invalid_method))
        .route("/get-container", get(get_container).fallback(invalid_method))
        .route("/start-container", get(start_container).fallback(invalid_method))
        .route("/stop-container", get(stop_container).fallback(invalid_method))
        .route("/pause-container", get(pause_container).fallback(invalid_method))
        .route("/unpause-container", get(unpause_container).fallback(invalid_method))
        .route(
            "/stop-container-by-image-id",
            get(stop_containers_by_image).fallback(invalid_method),
        )
        .route("/delete-container", post(delete_container).fallback(invalid_method))
        .route("/container-exists", post(container_exists).fallback(invalid_method))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn query<T: DeserializeOwned>(uri: &Uri) -> Result<T> {
    Query::<T>::try_from_uri(uri)
        .map(|Query(params)| params)
        .map_err(|e| DockyardError::InvalidRequest(e.body_text()))
}

fn body<T: DeserializeOwned>(bytes: &Bytes) -> Result<T> {
    let raw: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        &bytes[..]
    };
    serde_json::from_slice(raw).map_err(|e| DockyardError::InvalidRequest(e.to_string()))
}

async fn dispatch(state: &AppState, request: Result<ApiRequest>) -> ApiResponse {
    match request {
        Ok(request) => state.handler.handle(request).await,
        Err(err) => ApiResponse::from(err),
    }
}

async fn invalid_method(method: Method, uri: Uri) -> ApiResponse {
    debug!("No {} route for {}", method, uri.path());
    ApiResponse::new(
        StatusCode::BAD_REQUEST,
        format!("Invalid request type {}", method),
    )
}

async fn greeting(State(state): State<AppState>) -> ApiResponse {
    dispatch(&state, Ok(ApiRequest::Greeting)).await
}

async fn create_image(State(state): State<AppState>, bytes: Bytes) -> ApiResponse {
    dispatch(&state, body::<BuildParams>(&bytes).and_then(ApiRequest::create_image)).await
}

async fn get_image(State(state): State<AppState>, uri: Uri) -> ApiResponse {
    dispatch(&state, query::<ImageParams>(&uri).and_then(ApiRequest::find_image)).await
}

async fn get_image_id(State(state): State<AppState>, uri: Uri) -> ApiResponse {
    dispatch(&state, query::<ImageParams>(&uri).and_then(ApiRequest::image_id)).await
}

async fn delete_image(State(state): State<AppState>, bytes: Bytes) -> ApiResponse {
    dispatch(&state, body::<ImageParams>(&bytes).and_then(ApiRequest::delete_image)).await
}

async fn create_container(State(state): State<AppState>, bytes: Bytes) -> ApiResponse {
    dispatch(
        &state,
        body::<ContainerParams>(&bytes).and_then(ApiRequest::create_container),
    )
    .await
}

async fn get_container(State(state): State<AppState>, uri: Uri) -> ApiResponse {
    dispatch(&state, query::<IdParams>(&uri).and_then(ApiRequest::get_container)).await
}

async fn start_container(State(state): State<AppState>, uri: Uri) -> ApiResponse {
    dispatch(&state, query::<IdParams>(&uri).and_then(ApiRequest::start_container)).await
}

async fn stop_container(State(state): State<AppState>, uri: Uri) -> ApiResponse {
    dispatch(&state, query::<IdParams>(&uri).and_then(ApiRequest::stop_container)).await
}

async fn pause_container(State(state): State<AppState>, uri: Uri) -> ApiResponse {
    dispatch(&state, query::<IdParams>(&uri).and_then(ApiRequest::pause_container)).await
}

async fn unpause_container(State(state): State<AppState>, uri: Uri) -> ApiResponse {
    dispatch(&state, query::<IdParams>(&uri).and_then(ApiRequest::unpause_container)).await
}

async fn stop_containers_by_image(State(state): State<AppState>, uri: Uri) -> ApiResponse {
    dispatch(
        &state,
        query::<IdParams>(&uri).and_then(ApiRequest::stop_containers_by_image),
    )
    .await
}

async fn delete_container(State(state): State<AppState>, bytes: Bytes) -> ApiResponse {
    dispatch(&state, body::<IdParams>(&bytes).and_then(ApiRequest::delete_container)).await
}

async fn container_exists(State(state): State<AppState>, bytes: Bytes) -> ApiResponse {
    dispatch(&state, body::<IdParams>(&bytes).and_then(ApiRequest::container_exists)).await
}

/// Dockyard daemon serving the HTTP request surface
pub struct DockyardDaemon {
    config: DaemonConfig,
    orchestrator: Orchestrator,
}

impl DockyardDaemon {
    /// Create a new daemon instance
    pub fn new(config: DaemonConfig, orchestrator: Orchestrator) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    /// Serve requests until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        let engine = self.orchestrator.engine().describe();
        let router = create_router(ApiHandler::new(self.orchestrator));

        info!(
            "Dockyard daemon listening on {} ({})",
            listener.local_addr()?,
            engine
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Dockyard daemon stopped, released {}", engine);
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn router() -> Router {
        let orchestrator = Orchestrator::new(Arc::new(MemoryEngine::new()));
        create_router(ApiHandler::new(orchestrator))
    }

    async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        json: Option<&str>,
    ) -> (StatusCode, String) {
        let body = json.map(|j| Body::from(j.to_string())).unwrap_or_else(Body::empty);
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_daemon_config_default() {
        let config = DaemonConfig::default();
        assert_eq!(config.listen_addr.to_string(), DEFAULT_LISTEN_ADDR);
    }

    #[tokio::test]
    async fn test_greeting() {
        let router = router();
        let (status, body) = send(&router, Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Hello, I'm dockyard!");
    }

    #[tokio::test]
    async fn test_missing_parameter_is_bad_request() {
        let router = router();

        let (status, body) = send(&router, Method::GET, "/get-image", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Missing 'image-name'");

        let (status, body) = send(&router, Method::POST, "/create-image", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Missing 'image-name'");

        let (status, body) = send(&router, Method::GET, "/start-container?id=", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Missing 'id'");
    }

    #[tokio::test]
    async fn test_unknown_parameter_is_bad_request() {
        let router = router();

        let (status, _) = send(&router, Method::GET, "/get-container?id=1&all=true", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &router,
            Method::POST,
            "/delete-container",
            Some(r#"{"id": "1", "force": "yes"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let router = router();
        let (status, _) = send(&router, Method::POST, "/container-exists", Some("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_method_is_bad_request() {
        let router = router();

        let (status, body) = send(&router, Method::POST, "/get-image?image-name=x", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid request type POST");

        let (status, body) = send(&router, Method::GET, "/delete-container", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid request type GET");
    }

    #[tokio::test]
    async fn test_container_exists_for_unknown_id() {
        let router = router();
        let (status, body) = send(
            &router,
            Method::POST,
            "/container-exists",
            Some(r#"{"id": "1234"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, "Container not found");
    }

    #[tokio::test]
    async fn test_start_unknown_container_reports_daemon_message() {
        let router = router();
        let (status, body) = send(&router, Method::GET, "/start-container?id=1234", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            "Failed to start container: Error response from daemon: No such container: 1234"
        );
    }

    #[tokio::test]
    async fn test_build_then_delete_image() {
        let router = router();
        let source = TempDir::new().unwrap();
        std::fs::write(source.path().join("Dockerfile"), "FROM scratch\n").unwrap();

        let payload = serde_json::json!({
            "image-name": "web:1",
            "source-dir": source.path().to_string_lossy(),
        })
        .to_string();

        let (status, body) = send(&router, Method::POST, "/create-image", Some(&payload)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, "web:1");

        let (status, body) = send(&router, Method::GET, "/get-image?image-name=web:1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "web:1");

        let (status, id) =
            send(&router, Method::GET, "/get-image-id-by-tag?image-name=web:1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(id.starts_with("sha256:"));

        let (status, body) = send(
            &router,
            Method::POST,
            "/delete-image",
            Some(r#"{"image-name": "web:1"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Delete completed");

        let (status, body) = send(&router, Method::GET, "/get-image?image-name=web:1", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Image not found");
    }

    #[tokio::test]
    async fn test_build_failure_reports_engine_message() {
        let router = router();
        let source = TempDir::new().unwrap();

        let payload = serde_json::json!({
            "image-name": "web:1",
            "source-dir": source.path().to_string_lossy(),
        })
        .to_string();

        let (status, body) = send(&router, Method::POST, "/create-image", Some(&payload)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Cannot locate specified Dockerfile: Dockerfile");
    }
}
