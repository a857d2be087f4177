//! Test-report API routes.
//!
//! ## Routes
//!
//! - `GET /errors/{id}` - Test-result summary for a node

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use stemma_artifacts::{ResolveParams, resolve};
use stemma_engine::{CacheLayer, CheckStatus, CheckThresholds, ReportFilters, TestType, build_report};

use crate::error::ApiError;
use crate::routes::{cached_json_response, key_part};
use crate::server::AppState;

/// Browser cache lifetime for error-report payloads.
const ERRORS_MAX_AGE_SECONDS: u32 = 300;

/// Query parameters of the errors endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorsQuery {
    /// Keep only tests of this type (`freshness`, `volume`, `quality`).
    pub test_type: Option<String>,
    /// Keep only tests with this status (`pass`, `fail`, `unknown`).
    pub status_filter: Option<String>,
    /// `"true"` bypasses the payload cache.
    pub fresh: Option<String>,
    /// Snapshot label for the current side.
    pub current_snapshot: Option<String>,
    /// Explicit current manifest path (requires the catalog path too).
    pub current_manifest_path: Option<String>,
    /// Explicit current catalog path.
    pub current_catalog_path: Option<String>,
    /// Snapshot label for the previous side.
    pub previous_snapshot: Option<String>,
    /// Explicit previous manifest path.
    pub previous_manifest_path: Option<String>,
    /// Explicit previous catalog path.
    pub previous_catalog_path: Option<String>,
}

impl ErrorsQuery {
    fn filters(&self) -> Result<ReportFilters, ApiError> {
        let test_type = match self.test_type.as_deref() {
            None => None,
            Some(raw) => Some(TestType::parse(raw).ok_or_else(|| {
                ApiError::bad_request(format!("unknown testType: {raw}"))
            })?),
        };
        let status = match self.status_filter.as_deref() {
            None => None,
            Some(raw) => Some(CheckStatus::parse(raw).ok_or_else(|| {
                ApiError::bad_request(format!("unknown statusFilter: {raw}"))
            })?),
        };
        Ok(ReportFilters { test_type, status })
    }

    fn resolve_params(&self) -> ResolveParams {
        ResolveParams {
            current_snapshot: self.current_snapshot.clone(),
            current_manifest_path: self.current_manifest_path.clone(),
            current_catalog_path: self.current_catalog_path.clone(),
            previous_snapshot: self.previous_snapshot.clone(),
            previous_manifest_path: self.previous_manifest_path.clone(),
            previous_catalog_path: self.previous_catalog_path.clone(),
        }
    }

    fn cache_key(&self, node_id: &str) -> String {
        format!(
            "errors:{node_id}:{}:{}:{}:{}:{}:{}",
            key_part(self.test_type.as_deref(), "all"),
            key_part(self.status_filter.as_deref(), "all"),
            key_part(self.current_snapshot.as_deref(), "current"),
            key_part(self.previous_snapshot.as_deref(), "auto"),
            key_part(self.previous_manifest_path.as_deref(), "auto"),
            key_part(self.previous_catalog_path.as_deref(), "auto"),
        )
    }
}

/// Creates error-report routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/errors/:id", get(get_errors))
}

/// Compute (or serve the cached) test report for a node.
///
/// `GET /errors/{id}`
#[utoipa::path(
    get,
    path = "/errors/{id}",
    tag = "errors",
    params(
        ("id" = String, Path, description = "Node unique id"),
        ("testType" = Option<String>, Query, description = "Filter: freshness | volume | quality"),
        ("statusFilter" = Option<String>, Query, description = "Filter: pass | fail | unknown"),
        ("currentSnapshot" = Option<String>, Query, description = "Snapshot label for the current side"),
        ("previousSnapshot" = Option<String>, Query, description = "Snapshot label for the previous side"),
    ),
    responses(
        (status = 200, description = "Test report envelope"),
        (status = 400, description = "Invalid parameters", body = crate::error::ApiErrorBody),
        (status = 404, description = "Unknown node", body = crate::error::ApiErrorBody),
        (status = 503, description = "Artifacts unavailable", body = crate::error::ApiErrorBody),
    )
)]
pub(crate) async fn get_errors(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ErrorsQuery>,
) -> Result<Response, ApiError> {
    let filters = query.filters()?;
    let fresh = query.fresh.as_deref() == Some("true");
    let cache_key = query.cache_key(&id);

    tracing::debug!(node_id = %id, "errors request");

    if !fresh {
        if let Some(hit) = state.cache().get(&cache_key) {
            return serve_cached_report(hit.as_slice());
        }
    }

    let started = Instant::now();
    let store = state.store();
    let thresholds = state.thresholds();
    let params = query.resolve_params();
    let node_id = id.clone();

    let report = tokio::task::spawn_blocking(move || {
        compute_report(&store, &params, &node_id, thresholds, filters)
    })
    .await
    .map_err(|e| ApiError::internal(format!("errors task failed: {e}")))??;

    #[allow(clippy::cast_possible_truncation)]
    let compute_time_ms = started.elapsed().as_millis() as u64;

    let envelope = serde_json::json!({
        "data": report,
        "cached": false,
        "computeTimeMs": compute_time_ms,
    });
    let body = serde_json::to_vec(&envelope)
        .map_err(|e| ApiError::internal(format!("serialize test report: {e}")))?;

    state
        .cache()
        .set(cache_key, body.clone(), CacheLayer::Hot, None);

    Ok(cached_json_response(
        body,
        false,
        compute_time_ms,
        ERRORS_MAX_AGE_SECONDS,
    ))
}

fn compute_report(
    store: &stemma_artifacts::ArtifactStore,
    params: &ResolveParams,
    node_id: &str,
    thresholds: CheckThresholds,
    filters: ReportFilters,
) -> Result<Value, ApiError> {
    let pair = resolve(store, params)?;
    if let Some(bundle) = pair.current.manifest.as_deref() {
        store.revalidate(bundle);
    }

    let report = build_report(node_id, &pair, &thresholds, filters, Utc::now())?;
    serde_json::to_value(&report).map_err(|e| ApiError::internal(format!("serialize report: {e}")))
}

fn serve_cached_report(body: &[u8]) -> Result<Response, ApiError> {
    let mut envelope: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::internal(format!("corrupt cached payload: {e}")))?;
    if let Some(object) = envelope.as_object_mut() {
        object.insert("cached".to_string(), Value::Bool(true));
        object.insert("computeTimeMs".to_string(), Value::from(0));
    }
    let body = serde_json::to_vec(&envelope)
        .map_err(|e| ApiError::internal(format!("serialize cached payload: {e}")))?;
    Ok(cached_json_response(body, true, 0, ERRORS_MAX_AGE_SECONDS))
}
