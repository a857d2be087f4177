//! # stemma-engine
//!
//! Computation layer of the Stemma lineage observability engine:
//!
//! - **Lineage**: bounded upstream/downstream closures with shortest-path
//!   depth recording
//! - **Broad Checks**: schema drift, volume drift, and freshness lag
//!   against a point-in-time baseline
//! - **Test Aggregation**: per-node test enumeration, classification, and
//!   synthetic broad-check tests
//! - **Tiered Cache**: hot/warm/cold TTL layers with per-key statistics
//!
//! All computation is pure over the immutable artifact slots resolved by
//! `stemma-artifacts`; the only mutable state is the cache.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod checks;
pub mod error;
pub mod freshness;
pub mod lineage;
pub mod report;

pub use cache::{AggregateStats, CacheLayer, EntryDebug, KeyStatsSnapshot, TieredCache};
pub use checks::{
    BroadChecks, CheckStatus, CheckThresholds, FreshnessCheck, SchemaCheck, TypeChange,
    VolumeCheck, evaluate,
};
pub use error::{EngineError, Result};
pub use freshness::{FreshnessResolution, FreshnessSource, resolve_last_updated};
pub use lineage::{DepthBlock, LineageNode, LineageView, MAX_TRAVERSAL_DEPTH, compute_dag};
pub use report::{
    ComparisonDescriptor, ReportFilters, TestItem, TestReport, TestType, build_report,
};
