//! Point-in-time comparison resolution.
//!
//! Every lineage or errors request is evaluated against a bound
//! `(current, previous)` artifact pair. Resolution happens exactly once
//! per request; all subsequent traversals and checks read from the bound
//! references, so a request observes a consistent pair even while other
//! requests reload artifacts.

use std::sync::Arc;

use crate::error::{ArtifactError, Result};
use crate::model::{ArtifactSlot, ComparisonPair};
use crate::paths::resolve_artifact_path;
use crate::snapshots::{list_labels, load_snapshot, snapshot_generated_at};
use crate::store::{
    ArtifactStore, CATALOG_BACKUP_FILE, MANIFEST_BACKUP_FILE, load_catalog_at, load_manifest_at,
};

/// Caller-supplied comparison parameters, straight from the query string.
#[derive(Debug, Clone, Default)]
pub struct ResolveParams {
    /// Snapshot label to use as the current side.
    pub current_snapshot: Option<String>,
    /// Explicit current manifest path (requires the catalog path too).
    pub current_manifest_path: Option<String>,
    /// Explicit current catalog path (requires the manifest path too).
    pub current_catalog_path: Option<String>,
    /// Snapshot label to use as the previous side.
    pub previous_snapshot: Option<String>,
    /// Explicit previous manifest path.
    pub previous_manifest_path: Option<String>,
    /// Explicit previous catalog path.
    pub previous_catalog_path: Option<String>,
}

/// Resolves the `(current, previous)` artifact pair for one request.
///
/// # Errors
///
/// Returns an error when a referenced snapshot or explicit artifact
/// cannot be loaded, when an explicit pair is only partially specified,
/// or when a supplied path fails the safety check.
pub fn resolve(store: &ArtifactStore, params: &ResolveParams) -> Result<ComparisonPair> {
    let current = resolve_current(store, params)?;
    let previous = resolve_previous(store, params, &current)?;

    tracing::debug!(
        current = %current.source_tag,
        previous = %previous.source_tag,
        "resolved comparison pair"
    );

    Ok(ComparisonPair { current, previous })
}

fn resolve_current(store: &ArtifactStore, params: &ResolveParams) -> Result<ArtifactSlot> {
    if let Some(label) = params.current_snapshot.as_deref() {
        return snapshot_slot(store, label, format!("snapshot:{label}"));
    }

    match (
        params.current_manifest_path.as_deref(),
        params.current_catalog_path.as_deref(),
    ) {
        (Some(manifest), Some(catalog)) => explicit_slot(store, manifest, catalog),
        (None, None) => {
            let manifest = store.load_bundle()?;
            let catalog = store.load_catalog()?;
            let sources = store.load_sources(&store.sources_path())?;
            Ok(ArtifactSlot {
                manifest: Some(manifest),
                catalog,
                sources,
                source_tag: "current".to_string(),
            })
        }
        _ => Err(ArtifactError::InvalidParams(
            "currentManifestPath and currentCatalogPath must be provided together".to_string(),
        )),
    }
}

fn resolve_previous(
    store: &ArtifactStore,
    params: &ResolveParams,
    current: &ArtifactSlot,
) -> Result<ArtifactSlot> {
    if let Some(label) = params.previous_snapshot.as_deref() {
        return snapshot_slot(store, label, format!("snapshot:{label}"));
    }

    match (
        params.previous_manifest_path.as_deref(),
        params.previous_catalog_path.as_deref(),
    ) {
        (Some(manifest), Some(catalog)) => return explicit_slot(store, manifest, catalog),
        (None, None) => {}
        _ => {
            return Err(ArtifactError::InvalidParams(
                "previousManifestPath and previousCatalogPath must be provided together"
                    .to_string(),
            ));
        }
    }

    // Backup pair alongside the current bundle, when both files exist.
    let manifest_backup = store.root().join(MANIFEST_BACKUP_FILE);
    let catalog_backup = store.root().join(CATALOG_BACKUP_FILE);
    if manifest_backup.is_file() && catalog_backup.is_file() {
        let manifest = load_manifest_at(&manifest_backup)?;
        let catalog = load_catalog_at(&catalog_backup)?;
        return Ok(ArtifactSlot {
            manifest: Some(Arc::new(manifest)),
            catalog: catalog.map(Arc::new),
            sources: None,
            source_tag: "backup".to_string(),
        });
    }

    // Lexicographically-last snapshot whose generated_at differs from the
    // current side's.
    let current_generated_at = current
        .manifest
        .as_ref()
        .and_then(|m| m.metadata.generated_at.clone());
    let mut labels = list_labels(store.root())?;
    labels.sort();
    for label in labels.iter().rev() {
        let generated_at = snapshot_generated_at(store.root(), label);
        if generated_at.is_some() && generated_at != current_generated_at {
            return snapshot_slot(store, label, format!("auto:{label}"));
        }
    }

    Ok(ArtifactSlot::none())
}

fn snapshot_slot(store: &ArtifactStore, label: &str, source_tag: String) -> Result<ArtifactSlot> {
    let snapshot = load_snapshot(store.root(), label)?;
    let sources = match snapshot.sources_path.as_deref() {
        Some(path) => store.load_sources(path)?,
        None => None,
    };
    Ok(ArtifactSlot {
        manifest: Some(Arc::new(snapshot.manifest)),
        catalog: snapshot.catalog.map(Arc::new),
        sources,
        source_tag,
    })
}

fn explicit_slot(
    store: &ArtifactStore,
    manifest_path: &str,
    catalog_path: &str,
) -> Result<ArtifactSlot> {
    let manifest_path = resolve_artifact_path(store.root(), manifest_path)?;
    let catalog_path = resolve_artifact_path(store.root(), catalog_path)?;

    let manifest = load_manifest_at(&manifest_path)?;
    let catalog = load_catalog_at(&catalog_path)?;
    Ok(ArtifactSlot {
        manifest: Some(Arc::new(manifest)),
        catalog: catalog.map(Arc::new),
        sources: None,
        source_tag: "explicit".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshots::{SNAPSHOT_INDEX_FILE, snapshot_base};
    use std::fs;
    use std::path::Path;

    fn manifest_json(generated_at: &str) -> String {
        serde_json::json!({
            "metadata": {"dbt_version": "1.7.0", "generated_at": generated_at},
            "nodes": {"model.app.a": {"unique_id": "model.app.a", "resource_type": "model"}}
        })
        .to_string()
    }

    fn write_root_manifest(root: &Path, generated_at: &str) {
        fs::write(root.join("manifest.json"), manifest_json(generated_at)).unwrap();
    }

    fn write_snapshot(root: &Path, label: &str, generated_at: &str) {
        let dir = snapshot_base(root).join(label);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("manifest.json"), manifest_json(generated_at)).unwrap();
    }

    fn write_index(root: &Path, labels: &[&str]) {
        let base = snapshot_base(root);
        fs::create_dir_all(&base).unwrap();
        fs::write(
            base.join(SNAPSHOT_INDEX_FILE),
            serde_json::to_string(labels).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn defaults_to_in_process_bundle_and_empty_previous() {
        let tmp = tempfile::tempdir().unwrap();
        write_root_manifest(tmp.path(), "2026-03-01T00:00:00Z");

        let store = ArtifactStore::new(tmp.path());
        let pair = resolve(&store, &ResolveParams::default()).unwrap();
        assert_eq!(pair.current.source_tag, "current");
        assert_eq!(pair.previous.source_tag, "none");
        assert!(pair.previous.is_empty());
    }

    #[test]
    fn partial_explicit_pair_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_root_manifest(tmp.path(), "2026-03-01T00:00:00Z");
        let store = ArtifactStore::new(tmp.path());

        let params = ResolveParams {
            previous_manifest_path: Some("old_manifest.json".to_string()),
            ..ResolveParams::default()
        };
        let err = resolve(&store, &params).unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidParams(_)));
    }

    #[test]
    fn backup_pair_wins_over_snapshots() {
        let tmp = tempfile::tempdir().unwrap();
        write_root_manifest(tmp.path(), "2026-03-01T00:00:00Z");
        fs::write(
            tmp.path().join(MANIFEST_BACKUP_FILE),
            manifest_json("2026-02-01T00:00:00Z"),
        )
        .unwrap();
        fs::write(tmp.path().join(CATALOG_BACKUP_FILE), "{}").unwrap();
        write_index(tmp.path(), &["b1"]);
        write_snapshot(tmp.path(), "b1", "2026-01-01T00:00:00Z");

        let store = ArtifactStore::new(tmp.path());
        let pair = resolve(&store, &ResolveParams::default()).unwrap();
        assert_eq!(pair.previous.source_tag, "backup");
    }

    #[test]
    fn auto_previous_picks_last_label_with_differing_generated_at() {
        let tmp = tempfile::tempdir().unwrap();
        write_root_manifest(tmp.path(), "2026-03-01T00:00:00Z");
        write_index(tmp.path(), &["b1", "b2", "b3"]);
        write_snapshot(tmp.path(), "b1", "2026-01-01T00:00:00Z");
        write_snapshot(tmp.path(), "b2", "2026-02-01T00:00:00Z");
        // Same generated_at as the current bundle: must be skipped.
        write_snapshot(tmp.path(), "b3", "2026-03-01T00:00:00Z");

        let store = ArtifactStore::new(tmp.path());
        let pair = resolve(&store, &ResolveParams::default()).unwrap();
        assert_eq!(pair.previous.source_tag, "auto:b2");
    }

    #[test]
    fn explicit_snapshots_are_honored_on_both_sides() {
        let tmp = tempfile::tempdir().unwrap();
        write_root_manifest(tmp.path(), "2026-03-01T00:00:00Z");
        write_index(tmp.path(), &["b1", "b2"]);
        write_snapshot(tmp.path(), "b1", "2026-01-01T00:00:00Z");
        write_snapshot(tmp.path(), "b2", "2026-02-01T00:00:00Z");

        let store = ArtifactStore::new(tmp.path());
        let params = ResolveParams {
            current_snapshot: Some("b2".to_string()),
            previous_snapshot: Some("b1".to_string()),
            ..ResolveParams::default()
        };
        let pair = resolve(&store, &params).unwrap();
        assert_eq!(pair.current.source_tag, "snapshot:b2");
        assert_eq!(pair.previous.source_tag, "snapshot:b1");
    }
}
