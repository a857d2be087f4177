//! API server implementation.
//!
//! Provides health, ready, and API endpoints for the Stemma engine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use stemma_artifacts::ArtifactStore;
use stemma_core::{Error, Result};
use stemma_engine::{CheckThresholds, TieredCache};

use crate::config::{Config, CorsConfig};

// ============================================================================
// Health and Ready Responses
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ReadyResponse {
    /// Service readiness status.
    pub ready: bool,
    /// Optional message about readiness state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all request handlers.
///
/// The artifact store and the payload cache are the process-wide
/// singletons; everything behind them is immutable once loaded.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    store: Arc<ArtifactStore>,
    cache: Arc<TieredCache>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("store", &"<ArtifactStore>")
            .field("cache", &"<TieredCache>")
            .finish()
    }
}

impl AppState {
    /// Creates new application state from configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let store = Arc::new(ArtifactStore::new(config.artifact_root.clone()));
        Self {
            config,
            store,
            cache: Arc::new(TieredCache::new()),
        }
    }

    /// Returns the artifact store.
    #[must_use]
    pub fn store(&self) -> Arc<ArtifactStore> {
        Arc::clone(&self.store)
    }

    /// Returns the payload cache.
    #[must_use]
    pub fn cache(&self) -> Arc<TieredCache> {
        Arc::clone(&self.cache)
    }

    /// Returns the configured check thresholds.
    #[must_use]
    pub fn thresholds(&self) -> CheckThresholds {
        self.config.thresholds
    }

    /// Drops all memoized artifacts and cached payloads so the next
    /// request starts from a clean state. Tests use this between cases.
    pub fn reset_for_test(&self) {
        self.store.clear_all();
        let _ = self.cache.clear();
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint handler.
///
/// Returns 200 OK if the service is alive. This is a shallow check
/// that doesn't verify artifacts.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness check endpoint handler.
///
/// Ready means the manifest artifact is present at the configured root;
/// a full parse is deliberately avoided here.
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let manifest_path = state.store().manifest_path();
    if manifest_path.is_file() {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                message: None,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                message: Some(format!(
                    "manifest not found at {}",
                    manifest_path.display()
                )),
            }),
        )
    }
}

// ============================================================================
// Server
// ============================================================================

/// The Stemma API server.
pub struct Server {
    config: Config,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("config", &self.config).finish()
    }
}

impl Server {
    /// Creates a new server with the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates the router with all routes and middleware.
    fn create_router(&self) -> Router {
        let state = Arc::new(AppState::new(self.config.clone()));
        Self::router_with_state(state)
    }

    /// Builds the router around explicit state. Tests use this to keep a
    /// handle on the state they are exercising.
    pub fn router_with_state(state: Arc<AppState>) -> Router {
        let cors = Self::build_cors_layer(&state.config.cors);
        let metrics_layer = middleware::from_fn(crate::metrics::metrics_middleware);
        let request_id_layer = middleware::from_fn(crate::request_id::request_id_middleware);

        Router::new()
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/metrics", get(crate::metrics::serve_metrics))
            .route(
                "/api-docs/openapi.json",
                get(|| async { Json(crate::openapi::openapi()) }),
            )
            .merge(crate::routes::routes())
            // Middleware (order matters): metrics outermost for timing,
            // then trace, then request-id, then CORS.
            .layer(cors)
            .layer(request_id_layer)
            .layer(TraceLayer::new_for_http())
            .layer(metrics_layer)
            .with_state(state)
    }

    /// Builds the CORS layer from configuration.
    fn build_cors_layer(cors_config: &CorsConfig) -> CorsLayer {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::IF_NONE_MATCH,
                header::HeaderName::from_static("x-request-id"),
            ])
            .expose_headers([
                header::CONTENT_TYPE,
                header::CONTENT_LENGTH,
                header::ETAG,
                header::HeaderName::from_static("x-request-id"),
                header::HeaderName::from_static("x-cache"),
                header::HeaderName::from_static("x-compute-time-ms"),
            ])
            .max_age(Duration::from_secs(cors_config.max_age_seconds));

        Self::apply_cors_allowed_origins(cors, cors_config)
    }

    fn apply_cors_allowed_origins(cors: CorsLayer, cors_config: &CorsConfig) -> CorsLayer {
        if cors_config.allowed_origins.is_empty() {
            return cors;
        }

        let any_origin = cors_config.allowed_origins.len() == 1
            && cors_config
                .allowed_origins
                .first()
                .is_some_and(|origin| origin == "*");
        if any_origin {
            return cors.allow_origin(Any);
        }

        if cors_config
            .allowed_origins
            .iter()
            .any(|origin| origin == "*")
        {
            tracing::error!(
                origins = ?cors_config.allowed_origins,
                "Invalid CORS config: '*' must be the only allowed origin"
            );
            return cors;
        }

        let mut allowed = Vec::new();
        for origin in &cors_config.allowed_origins {
            match HeaderValue::from_str(origin) {
                Ok(value) => allowed.push(value),
                Err(_) => {
                    tracing::error!(
                        origin = %origin,
                        "Invalid CORS origin; expected a valid HeaderValue"
                    );
                }
            }
        }

        if allowed.is_empty() {
            tracing::warn!("All configured CORS origins were invalid; disabling CORS");
            cors
        } else {
            tracing::info!(origins = ?cors_config.allowed_origins, "CORS configured");
            cors.allow_origin(AllowOrigin::list(allowed))
        }
    }

    /// Starts the server and blocks until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind to the configured port.
    pub async fn serve(&self) -> Result<()> {
        crate::metrics::init_metrics();

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let router = self.create_router();

        tracing::info!(
            http_port = self.config.http_port,
            artifact_root = %self.config.artifact_root.display(),
            "Starting Stemma API server"
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::internal(format!("failed to bind to {addr}: {e}")))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::internal(format!("server error: {e}")))?;

        Ok(())
    }

    /// Creates a test router for the server.
    ///
    /// This is useful for integration tests where you want to exercise
    /// the routes without binding to a port.
    #[doc(hidden)]
    #[must_use]
    pub fn test_router(&self) -> Router {
        self.create_router()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install ctrl-c handler");
    } else {
        tracing::info!("shutdown signal received");
    }
}
