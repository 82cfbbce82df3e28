//! HTTP gateway
//!
//! Axum router exposing the relay to clients:
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /health` | liveness |
//! | `GET /models` | list installed models |
//! | `POST /models/pull` | pull a model, SSE progress |
//! | `DELETE /models/{name}` | delete a model |
//! | `GET /models/{name}/info` | model details |
//! | `POST /chat` | chat, SSE when `stream` is true |
//! | `POST /generate-image` | single-shot generation |
//! | `POST /analyze-image` | multipart image analysis |
//!
//! [`router`] mounts these at the root; [`app`] mounts them under `/api` and
//! adds CORS, request tracing, panic recovery and body limits.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ollama_relay::{RelayConfig, gateway};
//!
//! let config = RelayConfig::from_env()?;
//! gateway::serve(config).await?;
//! ```

pub mod error;
mod handlers;
pub mod sse;

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as CorsAny, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::backend::OllamaBackend;
use crate::config::RelayConfig;
use crate::error::Result;

pub use error::{ApiError, ErrorBody};

/// Headroom on top of the image limit for the other multipart fields.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Shared handler state. Holds no per-request data.
#[derive(Clone)]
pub struct AppState {
    pub(crate) backend: Arc<OllamaBackend>,
    pub(crate) config: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let backend = OllamaBackend::new(config)?;
        Ok(Self::from_backend(backend))
    }

    pub fn from_backend(backend: OllamaBackend) -> Self {
        let config = Arc::new(backend.config().clone());
        Self {
            backend: Arc::new(backend),
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

/// Routes without prefix or middleware.
pub fn router(state: AppState) -> Router {
    let image_limit = state.config.max_image_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/models", get(handlers::list_models))
        .route("/models/pull", post(handlers::pull_model))
        .route("/models/{name}", delete(handlers::delete_model))
        .route("/models/{name}/info", get(handlers::model_info))
        .route("/chat", post(handlers::chat))
        .route("/generate-image", post(handlers::generate_image))
        .route(
            "/analyze-image",
            post(handlers::analyze_image).layer(DefaultBodyLimit::max(image_limit)),
        )
        .with_state(state)
}

/// Full application: routes under `/api` with middleware.
pub fn app(state: AppState) -> Router {
    let json_limit = state.config.max_json_body;

    Router::new()
        .nest("/api", router(state))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(json_limit))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
}

/// Any origin, method and header.
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(CorsAny)
        .allow_methods(CorsAny)
        .allow_headers(CorsAny)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(details = %details, "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: "Internal server error".to_string(),
            details: None,
        }),
    )
        .into_response()
}

/// Bind `config.bind_addr` and serve until Ctrl-C.
pub async fn serve(config: RelayConfig) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    let state = AppState::new(config)?;
    serve_with_shutdown(listener, state, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve_with_shutdown<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(
        %addr,
        backend = %state.config.backend_url,
        "ollama relay listening"
    );
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("ollama relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> AppState {
        let config = RelayConfig::builder()
            .backend_url("http://127.0.0.1:9")
            .build()
            .unwrap();
        AppState::new(config).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_served_under_api_prefix() {
        let response = app(state())
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let response = app(state())
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Not found");
    }

    #[tokio::test]
    async fn chat_validation_happens_before_backend() {
        let response = router(state())
            .oneshot(
                Request::post("/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"model":"test","messages":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "Model and messages are required"})
        );
    }

    #[tokio::test]
    async fn pull_without_name_is_rejected() {
        let response = router(state())
            .oneshot(
                Request::post("/models/pull")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Model name is required");
    }

    #[tokio::test]
    async fn unreachable_backend_is_500_with_details() {
        let response = router(state())
            .oneshot(Request::get("/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Failed to fetch models");
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let response = app(state())
            .oneshot(
                Request::get("/api/health")
                    .header("origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }
}
