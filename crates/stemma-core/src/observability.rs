//! Observability infrastructure for Stemma.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers and span constructors for consistent
//! observability across all Stemma components.

use std::sync::Once;

use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl LogFormat {
    /// Picks the format for a deployment: pretty when debug mode is on,
    /// JSON everywhere else.
    #[must_use]
    pub fn for_debug(debug: bool) -> Self {
        if debug { Self::Pretty } else { Self::Json }
    }

    /// Builds the boxed formatting layer for this format.
    fn sink<S>(self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        match self {
            Self::Json => fmt::layer().json().boxed(),
            Self::Pretty => fmt::layer().pretty().boxed(),
        }
    }
}

/// Initializes the logging subsystem.
///
/// Idempotent: only the first call installs a subscriber, so libraries
/// and tests may call this freely. Log levels come from `RUST_LOG`
/// (e.g. `info`, `stemma_engine=debug`), defaulting to `info`.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(filter)
            .with(format.sink())
            .init();
    });
}

/// Creates a span for lineage-engine operations with standard fields.
///
/// # Example
///
/// ```rust
/// use stemma_core::observability::engine_span;
///
/// let span = engine_span("compute_dag", "model.analytics.orders");
/// let _guard = span.enter();
/// // ... traverse
/// ```
#[must_use]
pub fn engine_span(operation: &str, node_id: &str) -> Span {
    tracing::info_span!("engine", op = operation, node_id = node_id)
}

/// Creates a span for artifact-store operations.
#[must_use]
pub fn artifact_span(operation: &str, path: &str) -> Span {
    tracing::info_span!("artifacts", op = operation, path = path)
}
