//! Bounded lineage traversal.
//!
//! Upstream and downstream closures are computed by two iterative DFS
//! traversals sharing no state. Each records the shortest-path depth per
//! reached node: a neighbor is (re)pushed only when the candidate depth
//! strictly improves on the recorded one, so cycles cost nothing beyond
//! the first full visit and deep chains never touch the call stack.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use stemma_artifacts::{
    ArtifactSlot, Asset, AssetKind, ManifestBundle, ReferenceClassification, classify,
};
use stemma_core::CancelToken;

use crate::error::{EngineError, Result};
use crate::freshness::resolve_last_updated;

/// Maximum traversal depth; request values are clamped into `[0, 100]`.
pub const MAX_TRAVERSAL_DEPTH: u32 = 100;

/// A merged column view: manifest declaration enriched with the
/// catalog's actual type (the catalog wins on conflict).
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergedColumn {
    /// Resolved data type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Declared description, when the manifest has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One asset in a lineage view, enriched with catalog-derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct LineageNode {
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
    /// Materialization hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub materialized: Option<String>,
    /// Merged column set (manifest ∪ catalog).
    pub columns: BTreeMap<String, MergedColumn>,
    /// Row count from catalog statistics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<f64>,
    /// Resolved last-updated instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Reference classification.
    pub reference: ReferenceClassification,
    /// Direct children from the child index.
    pub children: Vec<String>,
}

/// Upstream/downstream depth maxima of a lineage view.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DepthBlock {
    /// Deepest recorded ancestor depth.
    pub upstream: u32,
    /// Deepest recorded descendant depth.
    pub downstream: u32,
}

/// The computed lineage subgraph for one root.
#[derive(Debug, Clone, Serialize)]
pub struct LineageView {
    /// The root asset.
    pub root: LineageNode,
    /// Ancestors, sorted by unique id.
    pub parents: Vec<LineageNode>,
    /// Descendants, sorted by unique id.
    pub children: Vec<LineageNode>,
    /// Ancestor id → shortest upstream distance from the root.
    pub parent_depth: BTreeMap<String, u32>,
    /// Descendant id → shortest downstream distance from the root.
    pub child_depth: BTreeMap<String, u32>,
    /// Depth maxima.
    pub depth: DepthBlock,
}

/// Computes the bounded lineage view for `root_id` against the current
/// artifact slot.
///
/// # Errors
///
/// Returns [`EngineError::NodeNotFound`] when `root_id` is absent from
/// the merged node view, and [`EngineError::Cancelled`] when the caller
/// abandoned the request mid-traversal.
pub fn compute_dag(
    slot: &ArtifactSlot,
    root_id: &str,
    max_depth: u32,
    cancel: &CancelToken,
) -> Result<LineageView> {
    let bundle = slot
        .manifest
        .as_deref()
        .ok_or_else(|| EngineError::NodeNotFound {
            id: root_id.to_string(),
        })?;
    let Some(root_asset) = bundle.get(root_id) else {
        return Err(EngineError::NodeNotFound {
            id: root_id.to_string(),
        });
    };

    let max_depth = max_depth.min(MAX_TRAVERSAL_DEPTH);

    let parent_depth = traverse(bundle, root_id, max_depth, cancel, |asset_id| {
        bundle
            .get(asset_id)
            .map_or(&[] as &[String], |a| a.depends_on.as_slice())
    })?;
    let child_depth = traverse(bundle, root_id, max_depth, cancel, |asset_id| {
        bundle.children_of(asset_id)
    })?;

    let now = Utc::now();
    let enrich_ids = |depths: &BTreeMap<String, u32>| -> Vec<LineageNode> {
        depths
            .keys()
            .filter_map(|id| bundle.get(id).map(|asset| enrich(asset, bundle, slot, now)))
            .collect()
    };

    let depth = DepthBlock {
        upstream: parent_depth.values().copied().max().unwrap_or(0),
        downstream: child_depth.values().copied().max().unwrap_or(0),
    };

    Ok(LineageView {
        root: enrich(root_asset, bundle, slot, now),
        parents: enrich_ids(&parent_depth),
        children: enrich_ids(&child_depth),
        parent_depth,
        child_depth,
        depth,
    })
}

/// Shortest-depth DFS over one edge direction. The depth map doubles as
/// the visited set: a node is (re)pushed only when the candidate depth
/// strictly improves, which bounds the work even in cyclic graphs.
fn traverse<'a, F>(
    bundle: &'a ManifestBundle,
    root_id: &str,
    max_depth: u32,
    cancel: &CancelToken,
    neighbors: F,
) -> Result<BTreeMap<String, u32>>
where
    F: Fn(&str) -> &'a [String],
{
    let mut depths: BTreeMap<String, u32> = BTreeMap::new();
    let mut stack: Vec<(String, u32)> = vec![(root_id.to_string(), 0)];

    while let Some((node_id, node_depth)) = stack.pop() {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if node_depth >= max_depth {
            continue;
        }

        for neighbor in neighbors(&node_id) {
            // Dangling references are tolerated but never traversed.
            if !bundle.assets.contains_key(neighbor) {
                continue;
            }
            // Depth 0 is reserved for the root; a cycle back to it adds
            // nothing.
            if neighbor == root_id {
                continue;
            }

            let candidate = node_depth + 1;
            let improved = depths
                .get(neighbor)
                .is_none_or(|&recorded| candidate < recorded);
            if improved {
                depths.insert(neighbor.clone(), candidate);
                stack.push((neighbor.clone(), candidate));
            }
        }
    }

    Ok(depths)
}

/// Enriches one asset with catalog-derived fields.
fn enrich(
    asset: &Asset,
    bundle: &ManifestBundle,
    slot: &ArtifactSlot,
    now: DateTime<Utc>,
) -> LineageNode {
    let mut columns: BTreeMap<String, MergedColumn> = asset
        .columns
        .iter()
        .map(|(name, spec)| {
            (
                name.clone(),
                MergedColumn {
                    data_type: spec.data_type.clone(),
                    description: spec.description.clone(),
                },
            )
        })
        .collect();

    let catalog_entry = slot.catalog.as_ref().and_then(|c| c.get(&asset.unique_id));
    let mut row_count = None;
    if let Some(entry) = catalog_entry {
        row_count = entry.row_count();
        for (name, column) in &entry.columns {
            // The catalog's actual type wins over the declared one; match
            // manifest spellings case-insensitively.
            let slot_entry = columns
                .iter_mut()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
                .map(|(_, merged)| merged);
            match slot_entry {
                Some(merged) => {
                    if column.data_type.is_some() {
                        merged.data_type = column.data_type.clone();
                    }
                }
                None => {
                    columns.insert(
                        name.clone(),
                        MergedColumn {
                            data_type: column.data_type.clone(),
                            description: column.comment.clone(),
                        },
                    );
                }
            }
        }
    }

    let last_updated = resolve_last_updated(&asset.unique_id, slot, now).last_updated;

    LineageNode {
        unique_id: asset.unique_id.clone(),
        name: asset.name.clone(),
        kind: asset.kind,
        database: asset.database.clone(),
        schema: asset.schema.clone(),
        description: asset.description.clone(),
        tags: asset.tags.clone(),
        materialized: asset.materialized.clone(),
        columns,
        row_count,
        last_updated,
        reference: classify(asset),
        children: bundle.children_of(&asset.unique_id).to_vec(),
    }
}
