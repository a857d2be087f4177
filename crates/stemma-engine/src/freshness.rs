//! Last-updated resolution.
//!
//! A node's `last_updated` instant can live in four different places
//! depending on the toolchain version that produced the artifacts. The
//! chain below is evaluated in priority order and the winning source is
//! recorded so callers can tell where the timestamp came from.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use stemma_artifacts::{ArtifactSlot, parse_artifact_timestamp};

/// Upper guard for the legacy seconds-ago interpretation: 50 years.
const LEGACY_CREATED_AT_MAX_SECONDS: f64 = 50.0 * 365.0 * 24.0 * 3600.0;

/// Manifest `meta` keys that may carry a last-updated timestamp, in
/// priority order.
const MANIFEST_META_KEYS: &[&str] = &[
    "last_updated_at",
    "max_loaded_at",
    "modified_at",
    "updated_at",
];

/// Where a `last_updated` value was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FreshnessSource {
    /// The source-freshness artifact (`max_loaded_at`/`snapshotted_at`).
    #[serde(rename = "sources-artifact")]
    SourcesArtifact,
    /// Catalog statistics or catalog entry metadata.
    #[serde(rename = "catalog-stats")]
    CatalogStats,
    /// Manifest node `meta` mapping.
    #[serde(rename = "manifest-meta")]
    ManifestMeta,
    /// Legacy seconds-ago interpretation of the manifest `created_at`.
    #[serde(rename = "manifest-created-at-legacy")]
    ManifestCreatedAtLegacy,
    /// No timestamp available anywhere.
    #[serde(rename = "unknown")]
    Unknown,
}

/// A resolved `last_updated` instant and its provenance.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessResolution {
    /// The instant, when any source produced one.
    pub last_updated: Option<DateTime<Utc>>,
    /// Which source produced it.
    pub source: FreshnessSource,
}

/// Resolves `last_updated` for a node from the first available source:
/// sources artifact, catalog stats, manifest meta, then the legacy
/// `created_at` heuristic.
#[must_use]
pub fn resolve_last_updated(
    node_id: &str,
    slot: &ArtifactSlot,
    now: DateTime<Utc>,
) -> FreshnessResolution {
    if let Some(record) = slot.sources.as_ref().and_then(|map| map.get(node_id)) {
        let instant = record
            .max_loaded_at
            .as_deref()
            .and_then(parse_artifact_timestamp)
            .or_else(|| {
                record
                    .snapshotted_at
                    .as_deref()
                    .and_then(parse_artifact_timestamp)
            });
        if let Some(last_updated) = instant {
            return FreshnessResolution {
                last_updated: Some(last_updated),
                source: FreshnessSource::SourcesArtifact,
            };
        }
    }

    if let Some(entry) = slot.catalog.as_ref().and_then(|c| c.get(node_id)) {
        let instant = entry
            .stat_timestamp("max_loaded_at")
            .or_else(|| entry.stat_timestamp("last_modified"))
            .or_else(|| entry.stat_timestamp("updated_at"))
            .or_else(|| entry.meta_timestamp("updated_at"));
        if let Some(last_updated) = instant {
            return FreshnessResolution {
                last_updated: Some(last_updated),
                source: FreshnessSource::CatalogStats,
            };
        }
    }

    if let Some(asset) = slot.manifest.as_ref().and_then(|m| m.get(node_id)) {
        for key in MANIFEST_META_KEYS {
            if let Some(instant) = asset.meta_str(key).and_then(parse_artifact_timestamp) {
                return FreshnessResolution {
                    last_updated: Some(instant),
                    source: FreshnessSource::ManifestMeta,
                };
            }
        }

        if let Some(instant) = asset
            .created_at
            .and_then(|v| legacy_seconds_ago_instant(v, now))
        {
            return FreshnessResolution {
                last_updated: Some(instant),
                source: FreshnessSource::ManifestCreatedAtLegacy,
            };
        }
    }

    FreshnessResolution {
        last_updated: None,
        source: FreshnessSource::Unknown,
    }
}

/// Legacy compatibility: very old manifests stored `created_at` as a
/// "seconds before now" number. The interpretation only applies inside
/// `(0, 50 years)`; anything else is treated as not-a-timestamp.
/// Removing this helper requires re-baselining any artifact still
/// relying on it.
#[must_use]
pub fn legacy_seconds_ago_instant(value: f64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value <= 0.0 || value >= LEGACY_CREATED_AT_MAX_SECONDS {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let seconds = value as i64;
    now.checked_sub_signed(Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use stemma_artifacts::{Catalog, FreshnessRecord, ManifestBundle};

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    fn slot_with_manifest(manifest: serde_json::Value) -> ArtifactSlot {
        ArtifactSlot {
            manifest: Some(Arc::new(ManifestBundle::from_json(manifest).unwrap())),
            catalog: None,
            sources: None,
            source_tag: "current".to_string(),
        }
    }

    #[test]
    fn sources_artifact_wins_over_everything() {
        let mut slot = slot_with_manifest(serde_json::json!({
            "nodes": {
                "source.app.raw": {
                    "unique_id": "source.app.raw",
                    "resource_type": "source",
                    "meta": {"last_updated_at": "2026-01-01T00:00:00Z"}
                }
            }
        }));
        let mut freshness = BTreeMap::new();
        freshness.insert(
            "source.app.raw".to_string(),
            FreshnessRecord {
                max_loaded_at: Some("2026-02-28T00:00:00Z".to_string()),
                snapshotted_at: None,
            },
        );
        slot.sources = Some(Arc::new(freshness));

        let resolution = resolve_last_updated("source.app.raw", &slot, now());
        assert_eq!(resolution.source, FreshnessSource::SourcesArtifact);
        assert_eq!(
            resolution.last_updated.unwrap().to_rfc3339(),
            "2026-02-28T00:00:00+00:00"
        );
    }

    #[test]
    fn catalog_stats_beat_manifest_meta() {
        let mut slot = slot_with_manifest(serde_json::json!({
            "nodes": {
                "model.app.orders": {
                    "unique_id": "model.app.orders",
                    "resource_type": "model",
                    "meta": {"updated_at": "2026-01-01T00:00:00Z"}
                }
            }
        }));
        slot.catalog = Some(Arc::new(
            Catalog::from_json(serde_json::json!({
                "nodes": {
                    "model.app.orders": {
                        "metadata": {"type": "BASE TABLE"},
                        "stats": {"last_modified": {"value": "2026-02-20T08:00:00Z"}}
                    }
                }
            }))
            .unwrap(),
        ));

        let resolution = resolve_last_updated("model.app.orders", &slot, now());
        assert_eq!(resolution.source, FreshnessSource::CatalogStats);
    }

    #[test]
    fn manifest_meta_keys_are_tried_in_order() {
        let slot = slot_with_manifest(serde_json::json!({
            "nodes": {
                "model.app.orders": {
                    "unique_id": "model.app.orders",
                    "resource_type": "model",
                    "meta": {
                        "updated_at": "2026-01-01T00:00:00Z",
                        "last_updated_at": "2026-02-01T00:00:00Z"
                    }
                }
            }
        }));
        let resolution = resolve_last_updated("model.app.orders", &slot, now());
        assert_eq!(resolution.source, FreshnessSource::ManifestMeta);
        assert_eq!(
            resolution.last_updated.unwrap().to_rfc3339(),
            "2026-02-01T00:00:00+00:00"
        );
    }

    #[test]
    fn legacy_created_at_is_seconds_before_now() {
        let slot = slot_with_manifest(serde_json::json!({
            "nodes": {
                "model.app.orders": {
                    "unique_id": "model.app.orders",
                    "resource_type": "model",
                    "created_at": 3600.0
                }
            }
        }));
        let resolution = resolve_last_updated("model.app.orders", &slot, now());
        assert_eq!(resolution.source, FreshnessSource::ManifestCreatedAtLegacy);
        assert_eq!(
            resolution.last_updated.unwrap().to_rfc3339(),
            "2026-03-01T11:00:00+00:00"
        );
    }

    #[test]
    fn legacy_guard_rejects_out_of_range_values() {
        assert!(legacy_seconds_ago_instant(0.0, now()).is_none());
        assert!(legacy_seconds_ago_instant(-5.0, now()).is_none());
        assert!(legacy_seconds_ago_instant(f64::NAN, now()).is_none());
        // An epoch-style timestamp is far beyond 50 years of seconds.
        assert!(legacy_seconds_ago_instant(1.9e9, now()).is_none());
        assert!(legacy_seconds_ago_instant(60.0, now()).is_some());
    }

    #[test]
    fn unknown_when_nothing_matches() {
        let slot = slot_with_manifest(serde_json::json!({
            "nodes": {
                "model.app.orders": {"unique_id": "model.app.orders", "resource_type": "model"}
            }
        }));
        let resolution = resolve_last_updated("model.app.orders", &slot, now());
        assert_eq!(resolution.source, FreshnessSource::Unknown);
        assert!(resolution.last_updated.is_none());
    }
}
