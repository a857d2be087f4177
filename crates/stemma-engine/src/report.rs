//! Test aggregation and classification.
//!
//! Enumerates the test definitions attached to a node, classifies each
//! into freshness / volume / quality / other, appends three synthetic
//! tests derived from the broad checks, and applies the request's
//! type/status filters. `total_tests` and `failing_tests` are counted
//! before filtering so the summary stays stable across filter choices.

use chrono::{DateTime, Utc};
use serde::Serialize;

use stemma_artifacts::{Asset, AssetKind, ComparisonPair};

use crate::checks::{BroadChecks, CheckStatus, CheckThresholds, VolumeCheck, evaluate};
use crate::error::{EngineError, Result};

/// Test classification buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    /// Source/model freshness tests.
    Freshness,
    /// Row-count and emptiness tests.
    Volume,
    /// Data-quality tests (uniqueness, nullability, relationships).
    Quality,
    /// Everything else.
    Other,
}

impl TestType {
    /// Parses a query-parameter spelling.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "freshness" => Some(Self::Freshness),
            "volume" => Some(Self::Volume),
            "quality" => Some(Self::Quality),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// One test in a report.
#[derive(Debug, Clone, Serialize)]
pub struct TestItem {
    /// Unique id of the test definition (or synthetic check).
    pub id: String,
    /// Short test name.
    pub name: String,
    /// Classification bucket.
    #[serde(rename = "type")]
    pub test_type: TestType,
    /// Last known status.
    pub status: CheckStatus,
    /// `error` or `warning`.
    pub severity: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Column the test targets, when column-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
}

/// Provenance of the comparison a report was computed against.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonDescriptor {
    /// Source tag of the current slot.
    pub current_source: String,
    /// Source tag of the previous slot.
    pub previous_source: String,
    /// `generated_at` of the current manifest, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_generated_at: Option<String>,
    /// `generated_at` of the previous manifest, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_generated_at: Option<String>,
}

/// Filters applied to the assembled test list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportFilters {
    /// Keep only tests of this type.
    pub test_type: Option<TestType>,
    /// Keep only tests with this status.
    pub status: Option<CheckStatus>,
}

/// The test-result summary for one node.
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    /// The node the report is about.
    pub node_id: String,
    /// Number of tests before filtering (including synthetic checks).
    pub total_tests: usize,
    /// Number of failing tests before filtering.
    pub failing_tests: usize,
    /// The (filtered) test list.
    pub tests: Vec<TestItem>,
    /// Volume metrics for the node.
    pub volume: VolumeCheck,
    /// The broad-checks block the synthetic tests were drawn from.
    pub broad_checks: BroadChecks,
    /// Comparison provenance.
    pub comparison: ComparisonDescriptor,
}

/// Builds the test report for `node_id` against a bound comparison pair.
///
/// # Errors
///
/// Returns [`EngineError::NodeNotFound`] when the node is absent from
/// the current merged view.
pub fn build_report(
    node_id: &str,
    pair: &ComparisonPair,
    thresholds: &CheckThresholds,
    filters: ReportFilters,
    now: DateTime<Utc>,
) -> Result<TestReport> {
    let bundle = pair
        .current
        .manifest
        .as_deref()
        .ok_or_else(|| EngineError::NodeNotFound {
            id: node_id.to_string(),
        })?;
    if bundle.get(node_id).is_none() {
        return Err(EngineError::NodeNotFound {
            id: node_id.to_string(),
        });
    }

    let mut tests: Vec<TestItem> = bundle
        .assets
        .values()
        .filter(|asset| asset.kind == AssetKind::Test && test_targets_node(asset, node_id))
        .map(test_item)
        .collect();

    let broad_checks = evaluate(node_id, pair, thresholds, now);
    tests.extend(synthetic_tests(node_id, &broad_checks));

    let total_tests = tests.len();
    let failing_tests = tests
        .iter()
        .filter(|t| t.status == CheckStatus::Fail)
        .count();

    if let Some(wanted) = filters.test_type {
        tests.retain(|t| t.test_type == wanted);
    }
    if let Some(wanted) = filters.status {
        tests.retain(|t| t.status == wanted);
    }

    let comparison = ComparisonDescriptor {
        current_source: pair.current.source_tag.clone(),
        previous_source: pair.previous.source_tag.clone(),
        current_generated_at: pair
            .current
            .manifest
            .as_ref()
            .and_then(|m| m.metadata.generated_at.clone()),
        previous_generated_at: pair
            .previous
            .manifest
            .as_ref()
            .and_then(|m| m.metadata.generated_at.clone()),
    };

    Ok(TestReport {
        node_id: node_id.to_string(),
        total_tests,
        failing_tests,
        volume: broad_checks.volume.clone(),
        broad_checks,
        tests,
        comparison,
    })
}

/// A test targets a node when its dependency list contains the node or
/// its `file_key_name` names it.
fn test_targets_node(test: &Asset, node_id: &str) -> bool {
    test.depends_on.iter().any(|dep| dep == node_id)
        || test.file_key_name.as_deref() == Some(node_id)
}

fn test_item(test: &Asset) -> TestItem {
    let metadata = test.test_metadata.as_ref();
    let name = metadata
        .and_then(|m| m.name.clone())
        .unwrap_or_else(|| test.name.clone());

    let severity = test
        .severity
        .as_deref()
        .filter(|s| s.eq_ignore_ascii_case("error"))
        .map_or_else(|| "warning".to_string(), str::to_ascii_lowercase);

    TestItem {
        id: test.unique_id.clone(),
        name,
        test_type: classify_test(test),
        status: CheckStatus::Unknown,
        severity,
        description: test.description.clone(),
        column_name: metadata.and_then(|m| m.column_name.clone()),
    }
}

/// Classifies a test definition. Generic-test metadata is authoritative
/// when the namespace is the built-in one; otherwise the lowercased test
/// name is matched on substrings.
fn classify_test(test: &Asset) -> TestType {
    if let Some(metadata) = test.test_metadata.as_ref() {
        let generic_namespace = metadata
            .namespace
            .as_deref()
            .is_none_or(|ns| ns.eq_ignore_ascii_case("dbt"));
        if generic_namespace {
            if let Some(name) = metadata.name.as_deref() {
                match name.to_ascii_lowercase().as_str() {
                    "dbt_freshness" | "freshness" => return TestType::Freshness,
                    "unique" | "not_null" | "relationships" | "accepted_values" => {
                        return TestType::Quality;
                    }
                    _ => return TestType::Other,
                }
            }
        }
    }

    let name = test.name.to_ascii_lowercase();
    if name.contains("freshness") {
        TestType::Freshness
    } else if name.contains("row_count") || name.contains("volume") || name.contains("not_empty") {
        TestType::Volume
    } else if name.contains("not_null")
        || name.contains("unique")
        || name.contains("accepted_values")
        || name.contains("relationships")
        || name.contains("type_check")
    {
        TestType::Quality
    } else {
        TestType::Other
    }
}

/// The three synthetic tests derived from the broad checks. Their
/// descriptions state the numeric facts so the UI needs no further
/// lookups.
fn synthetic_tests(node_id: &str, checks: &BroadChecks) -> Vec<TestItem> {
    let severity = |status: CheckStatus| {
        if status == CheckStatus::Fail {
            "error".to_string()
        } else {
            "warning".to_string()
        }
    };

    let schema_description = format!(
        "{} added, {} removed, {} type change(s) vs baseline",
        checks.schema.added_columns.len(),
        checks.schema.removed_columns.len(),
        checks.schema.type_changes.len(),
    );

    let volume_description = match (
        checks.volume.previous_row_count,
        checks.volume.current_row_count,
        checks.volume.deviation_pct,
    ) {
        (Some(previous), Some(current), Some(deviation)) => format!(
            "row count {previous:.0} -> {current:.0} ({deviation:+.1}%, threshold {}%)",
            checks.volume.threshold_pct
        ),
        _ => "row counts unavailable for comparison".to_string(),
    };

    let freshness_description = match checks.freshness.lag_minutes {
        Some(lag) => format!(
            "last updated {lag} minute(s) ago (threshold {} minutes)",
            checks.freshness.threshold_minutes
        ),
        None => "no last-updated timestamp available".to_string(),
    };

    vec![
        TestItem {
            id: format!("broad_check.schema_drift.{node_id}"),
            name: "schema_drift".to_string(),
            test_type: TestType::Quality,
            status: checks.schema.status,
            severity: severity(checks.schema.status),
            description: Some(schema_description),
            column_name: None,
        },
        TestItem {
            id: format!("broad_check.volume_change.{node_id}"),
            name: "volume_change".to_string(),
            test_type: TestType::Volume,
            status: checks.volume.status,
            severity: severity(checks.volume.status),
            description: Some(volume_description),
            column_name: None,
        },
        TestItem {
            id: format!("broad_check.freshness_lag.{node_id}"),
            name: "freshness_lag".to_string(),
            test_type: TestType::Freshness,
            status: checks.freshness.status,
            severity: severity(checks.freshness.status),
            description: Some(freshness_description),
            column_name: None,
        },
    ]
}
