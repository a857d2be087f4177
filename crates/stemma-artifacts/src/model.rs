//! In-memory data model for manifest and catalog artifacts.
//!
//! The artifacts are large, nested, and loosely schemad. Raw document
//! structs (`ManifestDoc`, `CatalogDoc`, `SourcesDoc`) mirror the JSON
//! contracts with permissive defaults so unknown or absent fields never
//! fail a load; the typed model (`Asset`, `CatalogEntry`,
//! `ManifestBundle`) is what the rest of the engine consumes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Raw manifest document
// ============================================================================

/// Top-level manifest JSON as produced by the upstream toolchain.
///
/// Only the fields the engine reads are modeled; everything else is
/// ignored during deserialization.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ManifestDoc {
    /// Manifest metadata section.
    #[serde(default)]
    pub metadata: ManifestMetadata,
    /// Model/seed/test nodes keyed by unique id.
    #[serde(default)]
    pub nodes: BTreeMap<String, RawNode>,
    /// Source definitions keyed by unique id.
    #[serde(default)]
    pub sources: BTreeMap<String, RawNode>,
    /// Macro definitions keyed by unique id.
    #[serde(default)]
    pub macros: BTreeMap<String, RawNode>,
}

/// Manifest metadata block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Schema version URL of the manifest format.
    #[serde(default)]
    pub dbt_schema_version: Option<String>,
    /// Producing toolchain version.
    #[serde(default)]
    pub dbt_version: Option<String>,
    /// Artifact generation timestamp (RFC3339 string).
    #[serde(default)]
    pub generated_at: Option<String>,
}

/// One manifest node, source, or macro as it appears on disk.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawNode {
    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub columns: BTreeMap<String, RawColumn>,
    #[serde(default)]
    pub meta: serde_json::Map<String, Value>,
    #[serde(default)]
    pub config: RawNodeConfig,
    #[serde(default)]
    pub depends_on: RawDependsOn,
    #[serde(default)]
    pub test_metadata: Option<RawTestMetadata>,
    #[serde(default)]
    pub file_key_name: Option<String>,
    /// Legacy numeric creation hint (seconds-ago in old artifacts).
    #[serde(default)]
    pub created_at: Option<f64>,
}

/// Declared column in a manifest node.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawColumn {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
}

/// Node config subset the engine reads.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawNodeConfig {
    #[serde(default)]
    pub materialized: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

/// Dependency lists of a manifest node.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawDependsOn {
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub macros: Vec<String>,
}

/// Generic-test metadata attached to test nodes.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawTestMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub kwargs: serde_json::Map<String, Value>,
}

// ============================================================================
// Raw catalog document
// ============================================================================

/// Top-level catalog JSON.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct CatalogDoc {
    /// Catalog metadata (opaque to the engine).
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    /// Physical node entries keyed by unique id.
    #[serde(default)]
    pub nodes: BTreeMap<String, RawCatalogEntry>,
    /// Physical source entries keyed by unique id.
    #[serde(default)]
    pub sources: BTreeMap<String, RawCatalogEntry>,
}

/// One catalog entry as it appears on disk.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawCatalogEntry {
    #[serde(default)]
    pub metadata: RawCatalogEntryMeta,
    #[serde(default)]
    pub columns: BTreeMap<String, RawCatalogColumn>,
    #[serde(default)]
    pub stats: BTreeMap<String, StatValue>,
}

/// Catalog entry metadata block.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawCatalogEntryMeta {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Remaining metadata fields (e.g. `updated_at` hints).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Physical column in a catalog entry.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawCatalogColumn {
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// A catalog statistic: either a primitive or a `{value}` wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    /// `{ "value": <primitive>, ... }` wrapper form.
    Wrapped {
        /// The wrapped primitive.
        value: Value,
    },
    /// Bare primitive form.
    Plain(Value),
}

impl StatValue {
    /// Returns the inner primitive, unwrapping the `{value}` form.
    #[must_use]
    pub fn inner(&self) -> &Value {
        match self {
            Self::Wrapped { value } | Self::Plain(value) => value,
        }
    }

    /// Interprets the statistic as a number, tolerating numeric strings.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self.inner() {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Interprets the statistic as a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.inner().as_str()
    }

    /// Interprets the statistic as a timestamp.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        self.as_str().and_then(parse_artifact_timestamp)
    }
}

// ============================================================================
// Raw sources-freshness document
// ============================================================================

/// Top-level source-freshness JSON (`sources.json`).
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SourcesDoc {
    /// Per-source freshness results.
    #[serde(default)]
    pub results: Vec<RawFreshnessResult>,
}

/// One freshness result row.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawFreshnessResult {
    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub max_loaded_at: Option<String>,
    #[serde(default)]
    pub snapshotted_at: Option<String>,
}

// ============================================================================
// Typed model
// ============================================================================

/// The kind of a data asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Transformed model (table or view).
    Model,
    /// Loaded seed file.
    Seed,
    /// Data test.
    Test,
    /// External source table.
    Source,
    /// Point-in-time snapshot model.
    Snapshot,
    /// Macro definition.
    Macro,
    /// Anything else.
    Other,
}

impl AssetKind {
    /// Maps a manifest `resource_type` string onto a kind.
    #[must_use]
    pub fn from_resource_type(resource_type: Option<&str>) -> Self {
        match resource_type.map(str::to_ascii_lowercase).as_deref() {
            Some("model") => Self::Model,
            Some("seed") => Self::Seed,
            Some("test") => Self::Test,
            Some("source") => Self::Source,
            Some("snapshot") => Self::Snapshot,
            Some("macro") => Self::Macro,
            _ => Self::Other,
        }
    }
}

/// Declared column on an asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column description, when declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared data type, when declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

/// Generic-test metadata attached to a test asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestMetadata {
    /// Generic test name (e.g. `not_null`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Test namespace, absent for built-in generic tests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Column the test targets, when column-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
}

/// One entity in the asset graph.
#[derive(Debug, Clone, Serialize)]
pub struct Asset {
    /// Stable unique identifier.
    pub unique_id: String,
    /// Human-readable name.
    pub name: String,
    /// Asset kind.
    pub kind: AssetKind,
    /// Database the asset lives in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Schema the asset lives in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tag set.
    pub tags: Vec<String>,
    /// Declared columns.
    pub columns: BTreeMap<String, ColumnSpec>,
    /// Free-form metadata mapping.
    pub meta: serde_json::Map<String, Value>,
    /// Materialization hint (`table`, `view`, `seed`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub materialized: Option<String>,
    /// Configured test severity (`error` or `warn`), test assets only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// Direct parent ids, ordered, possibly with duplicates.
    pub depends_on: Vec<String>,
    /// Generic-test metadata, test assets only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_metadata: Option<TestMetadata>,
    /// Model a test is attached to, when recorded by the toolchain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_key_name: Option<String>,
    /// Legacy numeric creation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
}

impl Asset {
    /// Builds a typed asset from a raw manifest node.
    ///
    /// The raw node's own `unique_id` wins over the map key when both are
    /// present; the map key is the fallback.
    #[must_use]
    pub(crate) fn from_raw(map_key: &str, raw: RawNode) -> Self {
        let unique_id = raw
            .unique_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| map_key.to_string());
        let name = raw.name.filter(|n| !n.is_empty()).unwrap_or_else(|| {
            unique_id
                .rsplit('.')
                .next()
                .unwrap_or(unique_id.as_str())
                .to_string()
        });

        let mut depends_on = raw.depends_on.nodes;
        depends_on.extend(raw.depends_on.macros);

        let test_metadata = raw.test_metadata.map(|tm| TestMetadata {
            name: tm.name,
            namespace: tm.namespace,
            column_name: tm
                .kwargs
                .get("column_name")
                .and_then(Value::as_str)
                .map(str::to_string),
        });

        Self {
            unique_id,
            name,
            kind: AssetKind::from_resource_type(raw.resource_type.as_deref()),
            database: raw.database,
            schema: raw.schema,
            description: raw.description.filter(|d| !d.is_empty()),
            tags: raw.tags,
            columns: raw
                .columns
                .into_iter()
                .map(|(name, c)| {
                    (
                        name,
                        ColumnSpec {
                            description: c.description,
                            data_type: c.data_type,
                        },
                    )
                })
                .collect(),
            meta: raw.meta,
            materialized: raw.config.materialized,
            severity: raw.config.severity,
            depends_on,
            test_metadata,
            file_key_name: raw.file_key_name,
            created_at: raw.created_at,
        }
    }

    /// Returns a boolean metadata flag, tolerating string spellings.
    #[must_use]
    pub fn meta_flag(&self, key: &str) -> bool {
        match self.meta.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Returns a string metadata value.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(Value::as_str)
    }
}

/// Physical column in a catalog entry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogColumn {
    /// Actual column type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Ordinal position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Nullability, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    /// Column comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Physical counterpart of an asset, keyed by the same unique id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogEntry {
    /// Relation type name (`BASE TABLE`, `VIEW`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Owner, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Relation comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Physical columns.
    pub columns: BTreeMap<String, CatalogColumn>,
    /// Statistics mapping (primitives or `{value}` wrappers).
    pub stats: BTreeMap<String, StatValue>,
    /// Extra per-entry metadata (e.g. `updated_at`).
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: serde_json::Map<String, Value>,
}

impl CatalogEntry {
    /// Builds a typed entry from a raw catalog entry.
    #[must_use]
    pub(crate) fn from_raw(raw: RawCatalogEntry) -> Self {
        Self {
            type_name: raw.metadata.type_name,
            owner: raw.metadata.owner,
            comment: raw.metadata.comment,
            columns: raw
                .columns
                .into_iter()
                .map(|(name, c)| {
                    (
                        name,
                        CatalogColumn {
                            data_type: c.type_name,
                            index: c.index,
                            nullable: c.nullable,
                            comment: c.comment,
                        },
                    )
                })
                .collect(),
            stats: raw.stats,
            meta: raw.metadata.extra,
        }
    }

    /// Reads the row count from `stats.num_rows` or `stats.row_count`.
    #[must_use]
    pub fn row_count(&self) -> Option<f64> {
        self.stats
            .get("num_rows")
            .or_else(|| self.stats.get("row_count"))
            .and_then(StatValue::as_f64)
    }

    /// Reads a named stat as a timestamp.
    #[must_use]
    pub fn stat_timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.stats.get(key).and_then(StatValue::as_timestamp)
    }

    /// Reads a timestamp from the entry-level metadata block.
    #[must_use]
    pub fn meta_timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.meta
            .get(key)
            .and_then(Value::as_str)
            .and_then(parse_artifact_timestamp)
    }
}

/// The catalog artifact in memory: the union of `nodes` and `sources`.
#[derive(Debug, Default)]
pub struct Catalog {
    /// Producing toolchain version, from the catalog metadata.
    pub dbt_version: Option<String>,
    /// Catalog generation timestamp, from the catalog metadata.
    pub generated_at: Option<String>,
    /// Entries keyed by unique id. Node entries shadow same-id sources.
    pub entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// Builds the merged catalog view from a raw document.
    #[must_use]
    pub(crate) fn from_doc(doc: CatalogDoc) -> Self {
        let meta_str = |key: &str| {
            doc.metadata
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let dbt_version = meta_str("dbt_version");
        let generated_at = meta_str("generated_at");

        let mut entries: BTreeMap<String, CatalogEntry> = doc
            .sources
            .into_iter()
            .map(|(id, raw)| (id, CatalogEntry::from_raw(raw)))
            .collect();
        for (id, raw) in doc.nodes {
            entries.insert(id, CatalogEntry::from_raw(raw));
        }
        Self {
            dbt_version,
            generated_at,
            entries,
        }
    }

    /// Parses a catalog JSON value. Intended for fixture construction.
    ///
    /// # Errors
    ///
    /// Returns the underlying deserialization error.
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        let doc: CatalogDoc = serde_json::from_value(value)?;
        Ok(Self::from_doc(doc))
    }

    /// Looks up an entry by unique id.
    #[must_use]
    pub fn get(&self, unique_id: &str) -> Option<&CatalogEntry> {
        self.entries.get(unique_id)
    }
}

/// Per-source freshness record from the sources artifact.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FreshnessRecord {
    /// Newest loaded-at timestamp reported for the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_loaded_at: Option<String>,
    /// Instant the freshness snapshot itself was taken.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshotted_at: Option<String>,
}

/// Freshness records keyed by unique id.
pub type FreshnessMap = BTreeMap<String, FreshnessRecord>;

/// Builds the freshness map from a raw sources document.
#[must_use]
pub(crate) fn freshness_map_from_doc(doc: SourcesDoc) -> FreshnessMap {
    doc.results
        .into_iter()
        .filter_map(|r| {
            let id = r.unique_id?;
            Some((
                id,
                FreshnessRecord {
                    max_loaded_at: r.max_loaded_at,
                    snapshotted_at: r.snapshotted_at,
                },
            ))
        })
        .collect()
}

/// The combined in-memory representation of one manifest artifact:
/// the merged asset map, the derived child index, and counts for the
/// bundle signature.
#[derive(Debug)]
pub struct ManifestBundle {
    /// Manifest metadata.
    pub metadata: ManifestMetadata,
    /// Merged asset view (`nodes ∪ sources ∪ macros`), keyed by unique id.
    /// Node entries shadow same-id sources and macros.
    pub assets: BTreeMap<String, Asset>,
    /// Inverse-dependency index: parent id → ordered child ids.
    pub child_index: BTreeMap<String, Vec<String>>,
    /// Count of `nodes` entries in the source document.
    pub node_count: usize,
    /// Count of `sources` entries in the source document.
    pub source_count: usize,
    /// Count of `macros` entries in the source document.
    pub macro_count: usize,
}

impl ManifestBundle {
    /// Builds the bundle from a raw manifest document: merges the node
    /// collections and derives the child index in one pass.
    #[must_use]
    pub(crate) fn from_doc(doc: ManifestDoc) -> Self {
        let node_count = doc.nodes.len();
        let source_count = doc.sources.len();
        let macro_count = doc.macros.len();

        let mut assets: BTreeMap<String, Asset> = BTreeMap::new();
        for (id, raw) in doc.sources {
            let asset = Asset::from_raw(&id, raw);
            assets.insert(asset.unique_id.clone(), asset);
        }
        for (id, raw) in doc.macros {
            let asset = Asset::from_raw(&id, raw);
            assets.insert(asset.unique_id.clone(), asset);
        }
        for (id, raw) in doc.nodes {
            let asset = Asset::from_raw(&id, raw);
            assets.insert(asset.unique_id.clone(), asset);
        }

        let mut child_index: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (child_id, asset) in &assets {
            for parent_id in &asset.depends_on {
                child_index
                    .entry(parent_id.clone())
                    .or_default()
                    .push(child_id.clone());
            }
        }

        Self {
            metadata: doc.metadata,
            assets,
            child_index,
            node_count,
            source_count,
            macro_count,
        }
    }

    /// Parses a manifest JSON value into a bundle. Intended for fixture
    /// construction; the store's loaders are the runtime path.
    ///
    /// # Errors
    ///
    /// Returns the underlying deserialization error.
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        let doc: ManifestDoc = serde_json::from_value(value)?;
        Ok(Self::from_doc(doc))
    }

    /// Looks up an asset in the merged view.
    #[must_use]
    pub fn get(&self, unique_id: &str) -> Option<&Asset> {
        self.assets.get(unique_id)
    }

    /// Returns the direct children of an asset (empty when it has none).
    #[must_use]
    pub fn children_of(&self, unique_id: &str) -> &[String] {
        self.child_index
            .get(unique_id)
            .map_or(&[], Vec::as_slice)
    }

    /// Bundle signature used for re-validation:
    /// `{dbt_version}:{generated_at}:{|nodes|}:{|sources|}:{|macros|}`.
    #[must_use]
    pub fn signature(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.metadata.dbt_version.as_deref().unwrap_or("unknown"),
            self.metadata.generated_at.as_deref().unwrap_or("unknown"),
            self.node_count,
            self.source_count,
            self.macro_count,
        )
    }
}

/// A loaded artifact pair from one point in time, plus its freshness map.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSlot {
    /// The manifest bundle, when this slot has one.
    pub manifest: Option<Arc<ManifestBundle>>,
    /// The catalog, when this slot has one.
    pub catalog: Option<Arc<Catalog>>,
    /// The source-freshness map, when present alongside the pair.
    pub sources: Option<Arc<FreshnessMap>>,
    /// Where this slot came from (`current`, `snapshot:{label}`,
    /// `explicit`, `backup`, `auto:{label}`, or `none`).
    pub source_tag: String,
}

impl ArtifactSlot {
    /// An empty slot with source tag `none`.
    #[must_use]
    pub fn none() -> Self {
        Self {
            manifest: None,
            catalog: None,
            sources: None,
            source_tag: "none".to_string(),
        }
    }

    /// Returns true when the slot carries no manifest.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manifest.is_none()
    }
}

/// The `(current, previous)` artifact pair bound for one request.
#[derive(Debug, Clone)]
pub struct ComparisonPair {
    /// The slot requests are evaluated against.
    pub current: ArtifactSlot,
    /// The baseline slot, possibly empty.
    pub previous: ArtifactSlot,
}

// ============================================================================
// Timestamp parsing
// ============================================================================

/// Parses the timestamp spellings that occur in the artifacts: RFC3339
/// with `Z` or offset, and naive `YYYY-MM-DD[T ]HH:MM:SS[.f]` treated as
/// UTC.
#[must_use]
pub fn parse_artifact_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_doc(json: serde_json::Value) -> ManifestDoc {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn stat_value_tolerates_all_spellings() {
        let plain: StatValue = serde_json::from_value(serde_json::json!(1300)).unwrap();
        assert_eq!(plain.as_f64(), Some(1300.0));

        let wrapped: StatValue =
            serde_json::from_value(serde_json::json!({"value": 1300})).unwrap();
        assert_eq!(wrapped.as_f64(), Some(1300.0));

        let stringy: StatValue = serde_json::from_value(serde_json::json!("1,300")).unwrap();
        assert_eq!(stringy.as_f64(), Some(1300.0));

        let junk: StatValue = serde_json::from_value(serde_json::json!(true)).unwrap();
        assert_eq!(junk.as_f64(), None);
    }

    #[test]
    fn bundle_merges_collections_with_nodes_winning() {
        let doc = manifest_doc(serde_json::json!({
            "metadata": {"dbt_version": "1.7.0", "generated_at": "2026-01-01T00:00:00Z"},
            "nodes": {
                "model.app.orders": {
                    "unique_id": "model.app.orders",
                    "name": "orders",
                    "resource_type": "model",
                    "depends_on": {"nodes": ["source.app.raw_orders"], "macros": []}
                }
            },
            "sources": {
                "source.app.raw_orders": {
                    "unique_id": "source.app.raw_orders",
                    "name": "raw_orders",
                    "resource_type": "source"
                }
            },
            "macros": {}
        }));
        let bundle = ManifestBundle::from_doc(doc);

        assert_eq!(bundle.assets.len(), 2);
        assert_eq!(bundle.node_count, 1);
        assert_eq!(bundle.source_count, 1);
        assert_eq!(
            bundle.children_of("source.app.raw_orders"),
            ["model.app.orders"]
        );
        assert_eq!(
            bundle.signature(),
            "1.7.0:2026-01-01T00:00:00Z:1:1:0"
        );
    }

    #[test]
    fn child_index_tolerates_dangling_parents() {
        let doc = manifest_doc(serde_json::json!({
            "nodes": {
                "model.app.a": {
                    "unique_id": "model.app.a",
                    "resource_type": "model",
                    "depends_on": {"nodes": ["model.app.ghost"], "macros": []}
                }
            }
        }));
        let bundle = ManifestBundle::from_doc(doc);
        // The dangling parent gets a child list but no asset entry.
        assert_eq!(bundle.children_of("model.app.ghost"), ["model.app.a"]);
        assert!(bundle.get("model.app.ghost").is_none());
    }

    #[test]
    fn asset_extracts_test_metadata_column() {
        let doc = manifest_doc(serde_json::json!({
            "nodes": {
                "test.app.not_null_orders_id": {
                    "unique_id": "test.app.not_null_orders_id",
                    "resource_type": "test",
                    "test_metadata": {
                        "name": "not_null",
                        "kwargs": {"column_name": "id"}
                    }
                }
            }
        }));
        let bundle = ManifestBundle::from_doc(doc);
        let asset = bundle.get("test.app.not_null_orders_id").unwrap();
        assert_eq!(asset.kind, AssetKind::Test);
        let tm = asset.test_metadata.as_ref().unwrap();
        assert_eq!(tm.name.as_deref(), Some("not_null"));
        assert_eq!(tm.column_name.as_deref(), Some("id"));
    }

    #[test]
    fn parse_artifact_timestamp_accepts_common_spellings() {
        assert!(parse_artifact_timestamp("2026-01-01T00:00:00Z").is_some());
        assert!(parse_artifact_timestamp("2026-01-01T00:00:00.123456+00:00").is_some());
        assert!(parse_artifact_timestamp("2026-01-01 12:30:00").is_some());
        assert!(parse_artifact_timestamp("not a time").is_none());
        assert!(parse_artifact_timestamp("").is_none());
    }

    #[test]
    fn catalog_row_count_prefers_num_rows() {
        let raw: RawCatalogEntry = serde_json::from_value(serde_json::json!({
            "metadata": {"type": "BASE TABLE"},
            "stats": {
                "num_rows": {"value": 42},
                "row_count": 7
            }
        }))
        .unwrap();
        let entry = CatalogEntry::from_raw(raw);
        assert_eq!(entry.row_count(), Some(42.0));
    }
}
