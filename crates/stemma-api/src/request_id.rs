//! Request-id propagation.
//!
//! Every request carries a ulid request id: the caller's `X-Request-Id`
//! when present, a fresh one otherwise. The id is stored in request
//! extensions for handlers and echoed on the response.

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The request id attached to the current request.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Extracts a usable request id from headers, if the caller sent one.
#[must_use]
pub fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
}

/// Middleware that ensures every request/response pair has a request id.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request_id_from_headers(request.headers())
        .unwrap_or_else(|| ulid::Ulid::new().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));
    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
