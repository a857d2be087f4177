//! Broad operational checks: schema drift, volume drift, freshness lag.
//!
//! Each check compares the current artifact pair against the previous
//! baseline and yields `pass`, `fail`, or `unknown` (no baseline / no
//! data). The combined `style_key` names the failing checks in the fixed
//! order `schema, volume, freshness` and drives color selection in the
//! UI.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use stemma_artifacts::{ArtifactSlot, ComparisonPair, classify};
use stemma_core::envvar::{env_f64_or, env_i64_or};

use crate::freshness::{FreshnessSource, resolve_last_updated};

/// Default volume deviation threshold, percent.
pub const DEFAULT_VOLUME_THRESHOLD_PCT: f64 = 25.0;
/// Default freshness threshold for ordinary nodes, minutes.
pub const DEFAULT_FRESHNESS_THRESHOLD_MINUTES: i64 = 180;
/// Default freshness threshold for reference-like nodes, minutes (7 days).
pub const DEFAULT_REFERENCE_FRESHNESS_THRESHOLD_MINUTES: i64 = 7 * 24 * 60;

/// Operator-tunable check thresholds.
#[derive(Debug, Clone, Copy)]
pub struct CheckThresholds {
    /// Absolute row-count deviation (percent) beyond which volume fails.
    pub volume_deviation_pct: f64,
    /// Freshness lag (minutes) beyond which ordinary nodes fail.
    pub freshness_minutes: i64,
    /// Freshness lag (minutes) beyond which reference-like nodes fail.
    pub reference_freshness_minutes: i64,
}

impl Default for CheckThresholds {
    fn default() -> Self {
        Self {
            volume_deviation_pct: DEFAULT_VOLUME_THRESHOLD_PCT,
            freshness_minutes: DEFAULT_FRESHNESS_THRESHOLD_MINUTES,
            reference_freshness_minutes: DEFAULT_REFERENCE_FRESHNESS_THRESHOLD_MINUTES,
        }
    }
}

impl CheckThresholds {
    /// Reads thresholds from the environment. Unset, non-finite, or
    /// negative values fall back to the defaults.
    ///
    /// - `OBS_VOLUME_THRESHOLD_PCT` (float, default 25)
    /// - `OBS_FRESHNESS_THRESHOLD_MINUTES` (int, default 180)
    /// - `OBS_REFERENCE_FRESHNESS_THRESHOLD_MINUTES` (int, default 10080)
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            volume_deviation_pct: env_f64_or(
                "OBS_VOLUME_THRESHOLD_PCT",
                DEFAULT_VOLUME_THRESHOLD_PCT,
            ),
            freshness_minutes: env_i64_or(
                "OBS_FRESHNESS_THRESHOLD_MINUTES",
                DEFAULT_FRESHNESS_THRESHOLD_MINUTES,
            ),
            reference_freshness_minutes: env_i64_or(
                "OBS_REFERENCE_FRESHNESS_THRESHOLD_MINUTES",
                DEFAULT_REFERENCE_FRESHNESS_THRESHOLD_MINUTES,
            ),
        }
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// The check compared cleanly.
    Pass,
    /// The check detected drift beyond its threshold.
    Fail,
    /// The check had no baseline or no data to compare.
    Unknown,
}

impl CheckStatus {
    /// Parses a query-parameter spelling.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "pass" => Some(Self::Pass),
            "fail" => Some(Self::Fail),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// One column whose type changed between baselines.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TypeChange {
    /// Column name (normalized to lower case).
    pub column: String,
    /// Type in the previous baseline.
    pub previous: String,
    /// Type in the current artifacts.
    pub current: String,
}

/// Schema-drift check result.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaCheck {
    /// Check outcome.
    pub status: CheckStatus,
    /// Columns present now but not in the baseline.
    pub added_columns: Vec<String>,
    /// Columns present in the baseline but gone now.
    pub removed_columns: Vec<String>,
    /// Columns whose declared/actual type changed.
    pub type_changes: Vec<TypeChange>,
}

/// Volume-drift check result.
#[derive(Debug, Clone, Serialize)]
pub struct VolumeCheck {
    /// Check outcome.
    pub status: CheckStatus,
    /// Current row count, when the catalog reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_row_count: Option<f64>,
    /// Baseline row count, when the previous catalog reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_row_count: Option<f64>,
    /// Percent deviation, when both counts exist and the baseline is
    /// positive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deviation_pct: Option<f64>,
    /// Threshold the deviation was compared against.
    pub threshold_pct: f64,
}

/// Freshness-lag check result.
#[derive(Debug, Clone, Serialize)]
pub struct FreshnessCheck {
    /// Check outcome.
    pub status: CheckStatus,
    /// Resolved last-updated instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Minutes since last update, floored at zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lag_minutes: Option<i64>,
    /// Threshold the lag was compared against.
    pub threshold_minutes: i64,
    /// True when the reference classifier matched this node.
    pub is_reference_like: bool,
    /// Where the last-updated instant came from.
    pub freshness_source: FreshnessSource,
}

/// The combined broad-checks block for one node.
#[derive(Debug, Clone, Serialize)]
pub struct BroadChecks {
    /// Schema-drift check.
    pub schema: SchemaCheck,
    /// Volume-drift check.
    pub volume: VolumeCheck,
    /// Freshness-lag check.
    pub freshness: FreshnessCheck,
    /// Failing check names joined with `+` in canonical order, or `none`.
    pub style_key: String,
    /// Number of failing checks.
    pub fail_count: u32,
}

/// Evaluates all three broad checks for one node against a bound
/// comparison pair.
#[must_use]
pub fn evaluate(
    node_id: &str,
    pair: &ComparisonPair,
    thresholds: &CheckThresholds,
    now: DateTime<Utc>,
) -> BroadChecks {
    let schema = schema_check(node_id, &pair.current, &pair.previous);
    let volume = volume_check(node_id, pair, thresholds);
    let freshness = freshness_check(node_id, &pair.current, thresholds, now);

    let mut failing = Vec::new();
    if schema.status == CheckStatus::Fail {
        failing.push("schema");
    }
    if volume.status == CheckStatus::Fail {
        failing.push("volume");
    }
    if freshness.status == CheckStatus::Fail {
        failing.push("freshness");
    }

    let style_key = if failing.is_empty() {
        "none".to_string()
    } else {
        failing.join("+")
    };
    #[allow(clippy::cast_possible_truncation)]
    let fail_count = failing.len() as u32;

    BroadChecks {
        schema,
        volume,
        freshness,
        style_key,
        fail_count,
    }
}

/// Builds the column→type map for one node in one slot, merging the
/// manifest's declared types with the catalog's actual types; the
/// catalog wins. Column names are normalized to lower case so the two
/// artifacts agree on spelling.
fn column_type_map(node_id: &str, slot: &ArtifactSlot) -> BTreeMap<String, String> {
    let mut types = BTreeMap::new();

    if let Some(asset) = slot.manifest.as_ref().and_then(|m| m.get(node_id)) {
        for (name, spec) in &asset.columns {
            let declared = spec.data_type.clone().unwrap_or_default();
            types.insert(name.to_ascii_lowercase(), declared);
        }
    }
    if let Some(entry) = slot.catalog.as_ref().and_then(|c| c.get(node_id)) {
        for (name, column) in &entry.columns {
            if let Some(actual) = column.data_type.clone() {
                types.insert(name.to_ascii_lowercase(), actual);
            }
        }
    }

    types
}

fn schema_check(node_id: &str, current: &ArtifactSlot, previous: &ArtifactSlot) -> SchemaCheck {
    let current_types = column_type_map(node_id, current);
    let previous_types = column_type_map(node_id, previous);

    if previous_types.is_empty() {
        return SchemaCheck {
            status: CheckStatus::Unknown,
            added_columns: Vec::new(),
            removed_columns: Vec::new(),
            type_changes: Vec::new(),
        };
    }

    let added_columns: Vec<String> = current_types
        .keys()
        .filter(|c| !previous_types.contains_key(*c))
        .cloned()
        .collect();
    let removed_columns: Vec<String> = previous_types
        .keys()
        .filter(|c| !current_types.contains_key(*c))
        .cloned()
        .collect();
    let type_changes: Vec<TypeChange> = current_types
        .iter()
        .filter_map(|(column, current_type)| {
            let previous_type = previous_types.get(column)?;
            if previous_type == current_type {
                None
            } else {
                Some(TypeChange {
                    column: column.clone(),
                    previous: previous_type.clone(),
                    current: current_type.clone(),
                })
            }
        })
        .collect();

    let drifted =
        !added_columns.is_empty() || !removed_columns.is_empty() || !type_changes.is_empty();
    SchemaCheck {
        status: if drifted {
            CheckStatus::Fail
        } else {
            CheckStatus::Pass
        },
        added_columns,
        removed_columns,
        type_changes,
    }
}

fn volume_check(node_id: &str, pair: &ComparisonPair, thresholds: &CheckThresholds) -> VolumeCheck {
    let row_count = |slot: &ArtifactSlot| {
        slot.catalog
            .as_ref()
            .and_then(|c| c.get(node_id))
            .and_then(stemma_artifacts::CatalogEntry::row_count)
    };
    let current_row_count = row_count(&pair.current);
    let previous_row_count = row_count(&pair.previous);

    let deviation_pct = match (current_row_count, previous_row_count) {
        (Some(current), Some(previous)) if previous > 0.0 => {
            Some((current - previous) / previous * 100.0)
        }
        _ => None,
    };

    let status = deviation_pct.map_or(CheckStatus::Unknown, |deviation| {
        if deviation.abs() > thresholds.volume_deviation_pct {
            CheckStatus::Fail
        } else {
            CheckStatus::Pass
        }
    });

    VolumeCheck {
        status,
        current_row_count,
        previous_row_count,
        deviation_pct,
        threshold_pct: thresholds.volume_deviation_pct,
    }
}

fn freshness_check(
    node_id: &str,
    current: &ArtifactSlot,
    thresholds: &CheckThresholds,
    now: DateTime<Utc>,
) -> FreshnessCheck {
    let is_reference_like = current
        .manifest
        .as_ref()
        .and_then(|m| m.get(node_id))
        .is_some_and(|asset| classify(asset).is_reference);
    let threshold_minutes = if is_reference_like {
        thresholds.reference_freshness_minutes
    } else {
        thresholds.freshness_minutes
    };

    let resolution = resolve_last_updated(node_id, current, now);
    let lag_minutes = resolution.last_updated.map(|last_updated| {
        let seconds = (now - last_updated).num_seconds();
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let minutes = (seconds as f64 / 60.0).round() as i64;
        minutes.max(0)
    });

    let status = lag_minutes.map_or(CheckStatus::Unknown, |lag| {
        if lag > threshold_minutes {
            CheckStatus::Fail
        } else {
            CheckStatus::Pass
        }
    });

    FreshnessCheck {
        status,
        last_updated: resolution.last_updated,
        lag_minutes,
        threshold_minutes,
        is_reference_like,
        freshness_source: resolution.source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use stemma_artifacts::{Catalog, ManifestBundle};

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    fn slot(
        manifest: serde_json::Value,
        catalog: Option<serde_json::Value>,
        tag: &str,
    ) -> ArtifactSlot {
        ArtifactSlot {
            manifest: Some(Arc::new(ManifestBundle::from_json(manifest).unwrap())),
            catalog: catalog.map(|c| Arc::new(Catalog::from_json(c).unwrap())),
            sources: None,
            source_tag: tag.to_string(),
        }
    }

    fn orders_manifest(columns: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "nodes": {
                "model.app.orders": {
                    "unique_id": "model.app.orders",
                    "name": "orders",
                    "resource_type": "model",
                    "columns": columns
                }
            }
        })
    }

    fn catalog_with_rows(rows: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "nodes": {
                "model.app.orders": {
                    "metadata": {"type": "BASE TABLE"},
                    "stats": {"num_rows": rows}
                }
            }
        })
    }

    #[test]
    fn schema_diff_reports_added_removed_and_type_changes() {
        let current = slot(
            orders_manifest(serde_json::json!({
                "a": {"data_type": "bigint"},
                "c": {"data_type": "text"}
            })),
            None,
            "current",
        );
        let previous = slot(
            orders_manifest(serde_json::json!({
                "a": {"data_type": "int"},
                "b": {"data_type": "text"}
            })),
            None,
            "backup",
        );
        let pair = ComparisonPair { current, previous };

        let checks = evaluate(
            "model.app.orders",
            &pair,
            &CheckThresholds::default(),
            now(),
        );
        assert_eq!(checks.schema.status, CheckStatus::Fail);
        assert_eq!(checks.schema.added_columns, ["c"]);
        assert_eq!(checks.schema.removed_columns, ["b"]);
        assert_eq!(
            checks.schema.type_changes,
            [TypeChange {
                column: "a".to_string(),
                previous: "int".to_string(),
                current: "bigint".to_string(),
            }]
        );
        assert_eq!(checks.style_key, "schema");
    }

    #[test]
    fn schema_is_unknown_without_baseline_columns() {
        let current = slot(
            orders_manifest(serde_json::json!({"a": {"data_type": "int"}})),
            None,
            "current",
        );
        let previous = ArtifactSlot::none();
        let pair = ComparisonPair { current, previous };

        let checks = evaluate(
            "model.app.orders",
            &pair,
            &CheckThresholds::default(),
            now(),
        );
        assert_eq!(checks.schema.status, CheckStatus::Unknown);
        assert_eq!(checks.style_key, "none");
    }

    #[test]
    fn catalog_types_win_over_manifest_types() {
        let current = slot(
            orders_manifest(serde_json::json!({"a": {"data_type": "int"}})),
            Some(serde_json::json!({
                "nodes": {
                    "model.app.orders": {
                        "metadata": {"type": "BASE TABLE"},
                        "columns": {"A": {"type": "bigint", "index": 1}}
                    }
                }
            })),
            "current",
        );
        let previous = slot(
            orders_manifest(serde_json::json!({"a": {"data_type": "int"}})),
            None,
            "backup",
        );
        let pair = ComparisonPair { current, previous };

        let checks = evaluate(
            "model.app.orders",
            &pair,
            &CheckThresholds::default(),
            now(),
        );
        // Catalog reports bigint for the same (case-folded) column.
        assert_eq!(checks.schema.type_changes.len(), 1);
        assert_eq!(checks.schema.type_changes[0].current, "bigint");
    }

    #[test]
    fn volume_fails_beyond_threshold() {
        let current = slot(
            orders_manifest(serde_json::json!({})),
            Some(catalog_with_rows(serde_json::json!({"value": 1300}))),
            "current",
        );
        let previous = slot(
            orders_manifest(serde_json::json!({})),
            Some(catalog_with_rows(serde_json::json!(1000))),
            "backup",
        );
        let pair = ComparisonPair { current, previous };

        let checks = evaluate(
            "model.app.orders",
            &pair,
            &CheckThresholds::default(),
            now(),
        );
        assert_eq!(checks.volume.status, CheckStatus::Fail);
        assert!((checks.volume.deviation_pct.unwrap() - 30.0).abs() < 1e-9);
        assert_eq!(checks.style_key, "volume");
        assert_eq!(checks.fail_count, 1);
    }

    #[test]
    fn volume_is_unknown_when_baseline_is_zero_or_missing() {
        let current = slot(
            orders_manifest(serde_json::json!({})),
            Some(catalog_with_rows(serde_json::json!(500))),
            "current",
        );
        let previous = slot(
            orders_manifest(serde_json::json!({})),
            Some(catalog_with_rows(serde_json::json!(0))),
            "backup",
        );
        let pair = ComparisonPair { current, previous };

        let checks = evaluate(
            "model.app.orders",
            &pair,
            &CheckThresholds::default(),
            now(),
        );
        assert_eq!(checks.volume.status, CheckStatus::Unknown);
        assert!(checks.volume.deviation_pct.is_none());
        assert_eq!(checks.volume.previous_row_count, Some(0.0));
    }

    #[test]
    fn reference_nodes_use_the_long_freshness_threshold() {
        // Tagged reference, last updated 6 hours ago: far past the 180
        // minute default but well inside the 7 day reference threshold.
        let current = slot(
            serde_json::json!({
                "nodes": {
                    "model.app.currency": {
                        "unique_id": "model.app.currency",
                        "name": "currency",
                        "resource_type": "model",
                        "tags": ["reference"],
                        "meta": {"last_updated_at": "2026-03-01T06:00:00Z"}
                    }
                }
            }),
            None,
            "current",
        );
        let pair = ComparisonPair {
            current,
            previous: ArtifactSlot::none(),
        };

        let checks = evaluate(
            "model.app.currency",
            &pair,
            &CheckThresholds::default(),
            now(),
        );
        assert!(checks.freshness.is_reference_like);
        assert_eq!(checks.freshness.status, CheckStatus::Pass);
        assert_eq!(checks.freshness.lag_minutes, Some(360));
        assert_eq!(checks.freshness.threshold_minutes, 10080);
        assert_eq!(checks.freshness.freshness_source, FreshnessSource::ManifestMeta);
    }

    #[test]
    fn style_key_joins_failures_in_canonical_order() {
        let current = slot(
            orders_manifest(serde_json::json!({"a": {"data_type": "bigint"}})),
            Some(serde_json::json!({
                "nodes": {
                    "model.app.orders": {
                        "metadata": {"type": "BASE TABLE"},
                        "stats": {
                            "num_rows": 2000,
                            "last_modified": "2026-01-01T00:00:00Z"
                        }
                    }
                }
            })),
            "current",
        );
        let previous = slot(
            orders_manifest(serde_json::json!({"a": {"data_type": "int"}})),
            Some(catalog_with_rows(serde_json::json!(1000))),
            "backup",
        );
        let pair = ComparisonPair { current, previous };

        let checks = evaluate(
            "model.app.orders",
            &pair,
            &CheckThresholds::default(),
            now(),
        );
        assert_eq!(checks.style_key, "schema+volume+freshness");
        assert_eq!(checks.fail_count, 3);
    }
}
