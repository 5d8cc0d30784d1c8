use crate::config::ApiConfig;
use crate::db::repositories::DetectionStore;
use crate::error::Error;
use anyhow::Result;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{error, info};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod detection_controller;

use detection_controller::{
    delete_detections, get_detections, get_stats, health, not_found, post_detection,
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DetectionStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn DetectionStore>) -> Self {
        Self { store }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Failure half of the response envelope: `{error, details?}`
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip)]
    pub status: u16,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            status: status.as_u16(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Name the failed operation on server errors; the cause stays in `details`
    pub fn during(mut self, action: &str) -> Self {
        if self.status >= 500 {
            self.error = action.to_string();
        }
        self
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(message) => ApiError::new(StatusCode::BAD_REQUEST, message),
            Error::NotFound(message) => ApiError::new(StatusCode::NOT_FOUND, message),
            Error::Storage(message) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Storage unavailable")
                    .with_details(message)
            }
            _ => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                .with_details(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(err) = err.downcast_ref::<Error>() {
            return (*err).clone().into();
        }

        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            .with_details(err.to_string())
    }
}

/// Implement IntoResponse for ApiError
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(
                "{}: {}",
                self.error,
                self.details.as_deref().unwrap_or("no details")
            );
        }
        let body = Json(self);
        (status, body).into_response()
    }
}

/// Build the request router shared by every hosting adapter.
///
/// `base_path` mounts the routes under a prefix such as `/api`.
pub fn router(state: AppState, base_path: Option<&str>) -> Router {
    // Allow all origins and answer every OPTIONS request as a preflight
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false)
        .max_age(Duration::from_secs(3600));

    let routes = Router::new()
        .route("/health", get(health).fallback(not_found))
        .route(
            "/detections",
            get(get_detections)
                .post(post_detection)
                .delete(delete_detections)
                .fallback(not_found),
        )
        .route("/stats", get(get_stats).fallback(not_found));

    let app = match normalize_base_path(base_path) {
        Some(base) => Router::new().nest(&base, routes),
        None => routes,
    };

    app.fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// `"api/"` -> `Some("/api")`; empty and `"/"` mean no prefix
pub fn normalize_base_path(base_path: Option<&str>) -> Option<String> {
    let trimmed = base_path?.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{}", trimmed))
    }
}

/// Persistent HTTP listener
pub struct RestApi {
    config: ApiConfig,
    state: AppState,
}

impl RestApi {
    pub fn new(config: &ApiConfig, store: Arc<dyn DetectionStore>) -> Self {
        Self {
            config: config.clone(),
            state: AppState::new(store),
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(self.state.clone(), self.config.base_path.as_deref());

        // Build the server address
        let addr = self.config.address.clone() + ":" + &self.config.port.to_string();
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::Config(format!("Invalid listen address {}: {}", addr, e)))?;

        // Create a listener and start the server
        let listener = TcpListener::bind(addr).await?;
        info!("API server listening on {}", addr);

        axum::Server::from_tcp(listener.into_std()?)?
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server stopped");

        Ok(())
    }
}
