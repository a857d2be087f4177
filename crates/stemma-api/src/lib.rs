//! # stemma-api
//!
//! HTTP composition layer for the Stemma lineage observability engine.
//!
//! This crate provides the API surface for Stemma, handling:
//!
//! - **Routing**: the lineage, errors, and cache-admin endpoints
//! - **Error Mapping**: domain errors to HTTP status codes
//! - **Observability**: metrics, tracing, request ids, health checks
//!
//! ## Design Principles
//!
//! This crate is a **thin composition layer** with no domain policy.
//! All lineage and check logic lives in `stemma-artifacts` and
//! `stemma-engine`.
//!
//! ## Endpoints
//!
//! ```text
//! GET  /health                  - Health check
//! GET  /ready                   - Readiness check (manifest present)
//! GET  /metrics                 - Prometheus metrics
//! GET  /api-docs/openapi.json   - OpenAPI document
//! GET  /dag/{id}                - Lineage view for a node
//! POST /dag/{id}?action=invalidate - Drop cached payloads for a node
//! GET  /errors/{id}             - Test report for a node
//! GET  /cache/stats             - Cache statistics
//! POST /cache/clear             - Clear cache (all or one layer)
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod openapi;
pub mod request_id;
pub mod routes;
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{ApiError, ApiResult};
    pub use crate::server::{AppState, Server};
}
