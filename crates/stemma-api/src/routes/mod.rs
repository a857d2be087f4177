//! HTTP route handlers.

pub mod cache_admin;
pub mod dag;
pub mod errors;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use sha2::{Digest, Sha256};

use crate::server::AppState;

/// All engine routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(dag::routes())
        .merge(errors::routes())
        .merge(cache_admin::routes())
}

/// Builds a JSON response with the read-side caching headers: `X-Cache`,
/// `X-Compute-Time-Ms`, `Cache-Control`, and a strong `ETag` over the
/// body bytes.
pub(crate) fn cached_json_response(
    body: Vec<u8>,
    cache_hit: bool,
    compute_time_ms: u64,
    max_age_seconds: u32,
) -> Response {
    let etag = format!("\"{:x}\"", Sha256::digest(&body));

    let mut response = Response::new(axum::body::Body::from(body));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::HeaderName::from_static("x-cache"),
        HeaderValue::from_static(if cache_hit { "HIT" } else { "MISS" }),
    );
    if let Ok(value) = HeaderValue::from_str(&compute_time_ms.to_string()) {
        headers.insert(header::HeaderName::from_static("x-compute-time-ms"), value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={max_age_seconds}")) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }
    response
}

/// Substitutes the sentinel used in cache keys for absent comparison
/// parameters.
pub(crate) fn key_part<'a>(value: Option<&'a str>, sentinel: &'a str) -> &'a str {
    value.unwrap_or(sentinel)
}
