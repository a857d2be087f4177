//! Lineage API routes.
//!
//! ## Routes
//!
//! - `GET  /dag/{id}` - Compute the lineage view for a node
//! - `POST /dag/{id}?action=invalidate` - Drop cached payloads for a node

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use stemma_artifacts::{ComparisonPair, ResolveParams, resolve};
use stemma_core::CancelToken;
use stemma_engine::{CacheLayer, CheckThresholds, LineageNode, compute_dag, evaluate};

use crate::error::ApiError;
use crate::routes::{cached_json_response, key_part};
use crate::server::AppState;

/// Default traversal depth when the caller does not specify one.
const DEFAULT_MAX_DEPTH: u32 = 10;
/// Browser cache lifetime for lineage payloads.
const LINEAGE_MAX_AGE_SECONDS: u32 = 1800;

/// Query parameters of the lineage endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DagQuery {
    /// Traversal bound, clamped to `[0, 100]`.
    pub max_depth: Option<u32>,
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

impl DagQuery {
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

    fn cache_key(&self, node_id: &str, max_depth: u32) -> String {
        format!(
            "dag:{node_id}:{max_depth}:{}:{}:{}:{}",
            key_part(self.current_snapshot.as_deref(), "current"),
            key_part(self.previous_snapshot.as_deref(), "auto"),
            key_part(self.previous_manifest_path.as_deref(), "auto"),
            key_part(self.previous_catalog_path.as_deref(), "auto"),
        )
    }
}

/// Query parameters of the invalidate action.
#[derive(Debug, Default, Deserialize)]
pub struct DagActionQuery {
    /// The action to perform; only `invalidate` is recognized.
    pub action: Option<String>,
}

/// Response of the invalidate action.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateResponse {
    /// Whether the action completed.
    pub success: bool,
    /// The node whose payloads were dropped.
    pub node_id: String,
    /// Number of cache entries removed.
    pub invalidated_count: usize,
}

/// Creates lineage routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dag/:id", get(get_dag))
        .route("/dag/:id", post(post_dag_action))
}

/// Compute (or serve the cached) lineage view for a node.
///
/// `GET /dag/{id}`
#[utoipa::path(
    get,
    path = "/dag/{id}",
    tag = "lineage",
    params(
        ("id" = String, Path, description = "Node unique id"),
        ("maxDepth" = Option<u32>, Query, description = "Traversal bound, clamped to [0, 100]"),
        ("fresh" = Option<String>, Query, description = "\"true\" bypasses the payload cache"),
        ("currentSnapshot" = Option<String>, Query, description = "Snapshot label for the current side"),
        ("previousSnapshot" = Option<String>, Query, description = "Snapshot label for the previous side"),
        ("previousManifestPath" = Option<String>, Query, description = "Explicit previous manifest path"),
        ("previousCatalogPath" = Option<String>, Query, description = "Explicit previous catalog path"),
    ),
    responses(
        (status = 200, description = "Lineage view envelope"),
        (status = 400, description = "Invalid parameters", body = crate::error::ApiErrorBody),
        (status = 404, description = "Unknown node", body = crate::error::ApiErrorBody),
        (status = 503, description = "Artifacts unavailable", body = crate::error::ApiErrorBody),
    )
)]
pub(crate) async fn get_dag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DagQuery>,
) -> Result<Response, ApiError> {
    let fresh = query.fresh.as_deref() == Some("true");
    let max_depth = query
        .max_depth
        .unwrap_or(DEFAULT_MAX_DEPTH)
        .min(stemma_engine::MAX_TRAVERSAL_DEPTH);
    let cache_key = query.cache_key(&id, max_depth);

    tracing::debug!(node_id = %id, max_depth, fresh, "lineage request");

    if !fresh {
        if let Some(hit) = state.cache().get(&cache_key) {
            return serve_cached_envelope(hit.as_slice(), LINEAGE_MAX_AGE_SECONDS);
        }
    }

    let started = Instant::now();
    let cancel = CancelToken::new();
    let mut guard = cancel.guard();

    let store = state.store();
    let thresholds = state.thresholds();
    let params = query.resolve_params();
    let node_id = id.clone();
    let worker_cancel = cancel.clone();

    let (data, metadata) = tokio::task::spawn_blocking(move || {
        compute_lineage_payload(&store, &params, &node_id, max_depth, thresholds, &worker_cancel)
    })
    .await
    .map_err(|e| ApiError::internal(format!("lineage task failed: {e}")))??;
    guard.disarm();

    let elapsed = started.elapsed();
    #[allow(clippy::cast_possible_truncation)]
    let compute_time_ms = elapsed.as_millis() as u64;
    crate::metrics::record_lineage_compute(elapsed);

    let envelope = serde_json::json!({
        "data": data,
        "cached": false,
        "computeTimeMs": compute_time_ms,
        "nodeId": id,
        "metadata": metadata,
    });
    let body = serde_json::to_vec(&envelope)
        .map_err(|e| ApiError::internal(format!("serialize lineage payload: {e}")))?;

    state
        .cache()
        .set(cache_key, body.clone(), CacheLayer::Warm, None);

    Ok(cached_json_response(
        body,
        false,
        compute_time_ms,
        LINEAGE_MAX_AGE_SECONDS,
    ))
}

/// Invalidate cached lineage payloads for a node.
///
/// `POST /dag/{id}?action=invalidate`
#[utoipa::path(
    post,
    path = "/dag/{id}",
    tag = "lineage",
    params(
        ("id" = String, Path, description = "Node unique id"),
        ("action" = String, Query, description = "Must be `invalidate`"),
    ),
    responses(
        (status = 200, description = "Cache entries removed", body = InvalidateResponse),
        (status = 400, description = "Unknown action", body = crate::error::ApiErrorBody),
    )
)]
pub(crate) async fn post_dag_action(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DagActionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    match query.action.as_deref() {
        Some("invalidate") => {
            let invalidated_count = state.cache().remove_prefix(&format!("dag:{id}:"));
            tracing::info!(node_id = %id, invalidated_count, "lineage cache invalidated");
            Ok(Json(InvalidateResponse {
                success: true,
                node_id: id,
                invalidated_count,
            }))
        }
        other => Err(ApiError::bad_request(format!(
            "unknown action: {}",
            other.unwrap_or("<none>")
        ))),
    }
}

/// Recomputes the `cached`/`computeTimeMs` fields of a stored envelope
/// and serves it.
fn serve_cached_envelope(body: &[u8], max_age_seconds: u32) -> Result<Response, ApiError> {
    let mut envelope: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::internal(format!("corrupt cached payload: {e}")))?;
    if let Some(object) = envelope.as_object_mut() {
        object.insert("cached".to_string(), Value::Bool(true));
        object.insert("computeTimeMs".to_string(), Value::from(0));
    }
    let body = serde_json::to_vec(&envelope)
        .map_err(|e| ApiError::internal(format!("serialize cached payload: {e}")))?;
    Ok(cached_json_response(body, true, 0, max_age_seconds))
}

/// The blocking half of the lineage request: artifact resolution,
/// re-validation, traversal, and per-node observability enrichment.
fn compute_lineage_payload(
    store: &stemma_artifacts::ArtifactStore,
    params: &ResolveParams,
    node_id: &str,
    max_depth: u32,
    thresholds: CheckThresholds,
    cancel: &CancelToken,
) -> Result<(Value, Value), ApiError> {
    let pair = resolve(store, params)?;
    if let Some(bundle) = pair.current.manifest.as_deref() {
        store.revalidate(bundle);
    }

    let view = compute_dag(&pair.current, node_id, max_depth, cancel)?;
    let now = Utc::now();

    let observe = |node: &LineageNode| -> Result<Value, ApiError> {
        let mut value = serde_json::to_value(node)
            .map_err(|e| ApiError::internal(format!("serialize node: {e}")))?;
        let checks = evaluate(&node.unique_id, &pair, &thresholds, now);
        let checks_value = serde_json::to_value(checks)
            .map_err(|e| ApiError::internal(format!("serialize checks: {e}")))?;
        if let Some(object) = value.as_object_mut() {
            object.insert("observability".to_string(), checks_value);
        }
        Ok(value)
    };

    let parents = view
        .parents
        .iter()
        .map(observe)
        .collect::<Result<Vec<_>, _>>()?;
    let children = view
        .children
        .iter()
        .map(observe)
        .collect::<Result<Vec<_>, _>>()?;

    let data = serde_json::json!({
        "root": observe(&view.root)?,
        "parents": parents,
        "children": children,
        "parent_depth": view.parent_depth,
        "child_depth": view.child_depth,
        "depth": view.depth,
    });

    let metadata = metadata_block(&pair);
    Ok((data, metadata))
}

fn metadata_block(pair: &ComparisonPair) -> Value {
    let manifest_metadata = pair.current.manifest.as_ref().map(|m| &m.metadata);
    serde_json::json!({
        "manifestVersion": manifest_metadata.and_then(|m| m.dbt_version.clone()),
        "generatedAt": manifest_metadata.and_then(|m| m.generated_at.clone()),
        "catalogVersion": pair.current.catalog.as_ref().and_then(|c| c.dbt_version.clone()),
        "comparison": {
            "currentSource": pair.current.source_tag.clone(),
            "previousSource": pair.previous.source_tag.clone(),
            "previousGeneratedAt": pair
                .previous
                .manifest
                .as_ref()
                .and_then(|m| m.metadata.generated_at.clone()),
        },
    })
}
