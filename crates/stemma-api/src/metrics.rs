//! Metrics instrumentation for the Stemma API.
//!
//! Two domain metrics ride alongside the usual request counters: payload
//! cache lookups and lineage traversal durations. The middleware derives
//! the cache outcome from the `X-Cache` header the read endpoints stamp
//! on their responses, so route handlers never touch the counters
//! directly.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// API request duration histogram.
pub const API_REQUEST_DURATION: &str = "api_request_duration_seconds";

/// API request counter.
pub const API_REQUEST_TOTAL: &str = "api_request_total";

/// Payload-cache lookup counter, labelled by endpoint and outcome.
pub const PAYLOAD_CACHE_LOOKUPS: &str = "payload_cache_lookups_total";

/// Lineage traversal duration histogram.
pub const LINEAGE_COMPUTE_DURATION: &str = "lineage_compute_duration_seconds";

const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Requests slower than this are logged at warn level.
const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(1);

const COUNTER_HELP: &[(&str, &str)] = &[
    (API_REQUEST_TOTAL, "Total number of API requests"),
    (
        PAYLOAD_CACHE_LOOKUPS,
        "Payload cache lookups by endpoint and outcome",
    ),
];

const HISTOGRAM_HELP: &[(&str, &str)] = &[
    (API_REQUEST_DURATION, "Duration of API requests in seconds"),
    (
        LINEAGE_COMPUTE_DURATION,
        "Duration of lineage traversals in seconds",
    ),
];

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initializes the global metrics recorder with Prometheus exporter.
///
/// Safe to call multiple times; subsequent calls are no-ops.
///
/// # Panics
///
/// Panics if the Prometheus recorder cannot be installed. This is
/// intentional: the server should not start without metrics.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(install_recorder).clone()
}

#[allow(clippy::panic)]
fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .unwrap_or_else(|e| panic!("failed to install prometheus recorder: {e}"));

    for (name, help) in COUNTER_HELP {
        describe_counter!(*name, *help);
    }
    for (name, help) in HISTOGRAM_HELP {
        describe_histogram!(*name, *help);
    }

    tracing::info!("Prometheus metrics recorder initialized");
    handle
}

/// Returns the global Prometheus handle, if initialized.
#[must_use]
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

/// Middleware that records request metrics.
///
/// Captures duration and count per `(endpoint, method, status_class)`,
/// and folds the `X-Cache` header of read responses into the payload
/// cache lookup counter.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let endpoint = endpoint_label(&request);
    let method = request.method().to_string();
    let started = Instant::now();

    let response = next.run(request).await;
    let elapsed = started.elapsed();

    let labels = [
        ("endpoint", endpoint.clone()),
        ("method", method),
        ("status_class", status_class(response.status()).to_string()),
    ];
    histogram!(API_REQUEST_DURATION, &labels).record(elapsed.as_secs_f64());
    counter!(API_REQUEST_TOTAL, &labels).increment(1);

    if let Some(outcome) = cache_outcome(&response) {
        counter!(PAYLOAD_CACHE_LOOKUPS, "endpoint" => endpoint.clone(), "outcome" => outcome)
            .increment(1);
    }

    if elapsed >= SLOW_REQUEST_THRESHOLD {
        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = elapsed.as_millis() as u64;
        tracing::warn!(
            endpoint = %endpoint,
            status = response.status().as_u16(),
            elapsed_ms,
            "slow request"
        );
    }

    response
}

/// Maps an `X-Cache` response header onto a counter label.
fn cache_outcome(response: &Response) -> Option<&'static str> {
    let header = response.headers().get("x-cache")?;
    match header.to_str().ok()? {
        "HIT" => Some("hit"),
        "MISS" => Some("miss"),
        _ => None,
    }
}

/// The matched route template, or a fixed label for unrouted requests,
/// so path parameters never explode the metric cardinality.
fn endpoint_label(request: &Request) -> String {
    match request.extensions().get::<MatchedPath>() {
        Some(path) => path.as_str().to_owned(),
        None => UNMATCHED_ENDPOINT.to_owned(),
    }
}

/// Collapses a status code into its class (`2xx`, `4xx`, ...).
fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() / 100 {
        1 => "1xx",
        2 => "2xx",
        3 => "3xx",
        4 => "4xx",
        5 => "5xx",
        _ => "unknown",
    }
}

/// Handler for the `/metrics` endpoint.
pub async fn serve_metrics() -> Response {
    let Some(handle) = prometheus_handle() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        )
            .into_response();
    };

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response()
}

/// Records a lineage traversal duration.
pub fn record_lineage_compute(elapsed: Duration) {
    histogram!(LINEAGE_COMPUTE_DURATION).record(elapsed.as_secs_f64());
}
