//! Cache administration routes.
//!
//! ## Routes
//!
//! - `GET  /cache/stats` - Cache contents and performance counters
//! - `POST /cache/clear` - Clear everything or one layer

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use stemma_engine::CacheLayer;

use crate::error::ApiError;
use crate::server::AppState;

/// Query parameters of the stats endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    /// Restrict the entry listing to one layer.
    pub layer: Option<String>,
}

/// Body of the clear endpoint.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ClearRequest {
    /// `clear-all` or `clear-layer`.
    pub action: String,
    /// Layer to clear when the action is `clear-layer`.
    #[serde(default)]
    pub layer: Option<String>,
}

/// Response of the clear endpoint.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    /// Whether the action completed.
    pub success: bool,
    /// The action that ran.
    pub action: String,
    /// Number of entries removed.
    pub total_items_cleared: usize,
    /// When the clear happened (RFC3339).
    pub cleared_at: String,
}

/// Creates cache-admin routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cache/stats", get(get_stats))
        .route("/cache/clear", post(post_clear))
}

/// Cache contents and performance counters.
///
/// `GET /cache/stats`
#[utoipa::path(
    get,
    path = "/cache/stats",
    tag = "cache",
    params(
        ("layer" = Option<String>, Query, description = "Restrict listing to hot | warm | cold"),
    ),
    responses(
        (status = 200, description = "Cache statistics"),
        (status = 400, description = "Unknown layer", body = crate::error::ApiErrorBody),
    )
)]
pub(crate) async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let layer = parse_layer(query.layer.as_deref())?;

    let cache = state.cache();
    let (hot, warm, cold) = cache.count_by_layer();
    let aggregate = cache.aggregate();
    let entries = cache.debug_info(layer);
    let key_stats: Value = serde_json::to_value(cache.stats_all())
        .map_err(|e| ApiError::internal(format!("serialize cache stats: {e}")))?;

    Ok(Json(serde_json::json!({
        "timestamp": Utc::now().to_rfc3339(),
        "cache": {
            "totalEntries": cache.len(),
            "byLayer": {"hot": hot, "warm": warm, "cold": cold},
            "entries": entries,
            "keyStats": key_stats,
        },
        "performance": {
            "hits": aggregate.hits,
            "misses": aggregate.misses,
            "evictions": aggregate.evictions,
            "expirations": aggregate.expirations,
            "hitRate": aggregate.hit_rate,
        },
        "ttl": {
            "hotSeconds": CacheLayer::Hot.default_ttl().as_secs(),
            "warmSeconds": CacheLayer::Warm.default_ttl().as_secs(),
            "coldSeconds": CacheLayer::Cold.default_ttl().as_secs(),
        },
    })))
}

/// Clear the whole cache or one layer.
///
/// `POST /cache/clear`
#[utoipa::path(
    post,
    path = "/cache/clear",
    tag = "cache",
    request_body = ClearRequest,
    responses(
        (status = 200, description = "Entries removed", body = ClearResponse),
        (status = 400, description = "Unknown action or layer", body = crate::error::ApiErrorBody),
    )
)]
pub(crate) async fn post_clear(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClearRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cache = state.cache();
    let total_items_cleared = match request.action.as_str() {
        "clear-all" => {
            // A full clear also drops the memoized artifacts so the next
            // request reloads from disk.
            state.store().clear_all();
            cache.clear()
        }
        "clear-layer" => {
            let layer = parse_layer(request.layer.as_deref())?.ok_or_else(|| {
                ApiError::bad_request("clear-layer requires a layer (hot | warm | cold)")
            })?;
            cache.invalidate_layer(layer)
        }
        other => {
            return Err(ApiError::bad_request(format!("unknown action: {other}")));
        }
    };

    Ok(Json(ClearResponse {
        success: true,
        action: request.action,
        total_items_cleared,
        cleared_at: Utc::now().to_rfc3339(),
    }))
}

fn parse_layer(raw: Option<&str>) -> Result<Option<CacheLayer>, ApiError> {
    match raw {
        None => Ok(None),
        Some(raw) => CacheLayer::parse(raw)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("unknown layer: {raw}"))),
    }
}
