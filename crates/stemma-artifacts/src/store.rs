//! Artifact loading and memoization.
//!
//! The store owns the three pieces of shared mutable state the engine
//! has: the memoized current manifest bundle, the memoized catalog, and
//! the per-path source-freshness cache. Each is guarded by its own lock
//! in a single-writer / many-reader discipline; loaded bundles are
//! immutable `Arc`s, so traversals snapshot a reference under the read
//! lock and compute without holding anything.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use serde::de::DeserializeOwned;

use crate::error::{ArtifactError, Result};
use crate::model::{
    Catalog, CatalogDoc, FreshnessMap, ManifestBundle, ManifestDoc, SourcesDoc,
    freshness_map_from_doc,
};

/// Well-known artifact file names at the store root.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Catalog file name.
pub const CATALOG_FILE: &str = "catalog.json";
/// Source-freshness file name.
pub const SOURCES_FILE: &str = "sources.json";
/// Previous-manifest backup file name.
pub const MANIFEST_BACKUP_FILE: &str = "manifest_backup.json";
/// Previous-catalog backup file name.
pub const CATALOG_BACKUP_FILE: &str = "catalog_backup.json";

#[derive(Debug)]
struct SourcesCacheEntry {
    modified: Option<SystemTime>,
    map: Arc<FreshnessMap>,
}

/// Memoizing loader for manifest, catalog, and source-freshness artifacts.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    bundle: RwLock<Option<Arc<ManifestBundle>>>,
    // Outer Option: load attempted; inner Option: catalog present on disk.
    catalog: RwLock<Option<Option<Arc<Catalog>>>>,
    sources_cache: RwLock<HashMap<PathBuf, SourcesCacheEntry>>,
    last_validated: Mutex<Option<String>>,
}

impl ArtifactStore {
    /// Creates a store rooted at the given artifact directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bundle: RwLock::new(None),
            catalog: RwLock::new(None),
            sources_cache: RwLock::new(HashMap::new()),
            last_validated: Mutex::new(None),
        }
    }

    /// The artifact root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the current manifest artifact.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Path of the current catalog artifact.
    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(CATALOG_FILE)
    }

    /// Path of the current source-freshness artifact.
    #[must_use]
    pub fn sources_path(&self) -> PathBuf {
        self.root.join(SOURCES_FILE)
    }

    /// Loads (or returns the memoized) current manifest bundle.
    ///
    /// # Errors
    ///
    /// Returns an error when the manifest is absent or malformed.
    pub fn load_bundle(&self) -> Result<Arc<ManifestBundle>> {
        if let Some(bundle) = self.bundle.read().expect("bundle lock").as_ref() {
            return Ok(Arc::clone(bundle));
        }

        let path = self.manifest_path();
        let doc: ManifestDoc = read_json(&path)?;
        let bundle = Arc::new(ManifestBundle::from_doc(doc));
        tracing::info!(
            path = %path.display(),
            assets = bundle.assets.len(),
            signature = %bundle.signature(),
            "loaded manifest bundle"
        );

        let mut slot = self.bundle.write().expect("bundle lock");
        // Another request may have raced us here; first write wins.
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }
        *slot = Some(Arc::clone(&bundle));
        Ok(bundle)
    }

    /// Loads (or returns the memoized) current catalog.
    ///
    /// A missing catalog is tolerated: it is logged once and `None` is
    /// memoized so downstream components operate without physical stats.
    ///
    /// # Errors
    ///
    /// Returns an error when the catalog exists but cannot be parsed.
    pub fn load_catalog(&self) -> Result<Option<Arc<Catalog>>> {
        if let Some(loaded) = self.catalog.read().expect("catalog lock").as_ref() {
            return Ok(loaded.clone());
        }

        let path = self.catalog_path();
        let loaded = match read_json::<CatalogDoc>(&path) {
            Ok(doc) => Some(Arc::new(Catalog::from_doc(doc))),
            Err(ArtifactError::Missing { .. }) => {
                tracing::warn!(path = %path.display(), "catalog artifact missing; continuing without physical stats");
                None
            }
            Err(other) => return Err(other),
        };

        let mut slot = self.catalog.write().expect("catalog lock");
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }
        *slot = Some(loaded.clone());
        Ok(loaded)
    }

    /// Loads the source-freshness map at `path`, cached per absolute path
    /// and re-read when the file's modification instant changes.
    ///
    /// A missing file is silently absent (freshness falls back to other
    /// sources).
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be parsed.
    pub fn load_sources(&self, path: &Path) -> Result<Option<Arc<FreshnessMap>>> {
        let modified = std::fs::metadata(path).ok().and_then(|m| m.modified().ok());
        if modified.is_none() && !path.exists() {
            return Ok(None);
        }

        {
            let cache = self.sources_cache.read().expect("sources lock");
            if let Some(entry) = cache.get(path) {
                if entry.modified == modified {
                    return Ok(Some(Arc::clone(&entry.map)));
                }
            }
        }

        let doc: SourcesDoc = match read_json(path) {
            Ok(doc) => doc,
            Err(ArtifactError::Missing { .. }) => return Ok(None),
            Err(other) => return Err(other),
        };
        let map = Arc::new(freshness_map_from_doc(doc));
        tracing::debug!(path = %path.display(), sources = map.len(), "loaded source freshness");

        let mut cache = self.sources_cache.write().expect("sources lock");
        cache.insert(
            path.to_path_buf(),
            SourcesCacheEntry {
                modified,
                map: Arc::clone(&map),
            },
        );
        Ok(Some(map))
    }

    /// Drops every memoized artifact so the next request reloads from
    /// disk.
    pub fn clear_all(&self) {
        *self.bundle.write().expect("bundle lock") = None;
        *self.catalog.write().expect("catalog lock") = None;
        self.sources_cache.write().expect("sources lock").clear();
        *self.last_validated.lock().expect("validation lock") = None;
        tracing::info!("artifact store cleared");
    }

    /// Re-validates the bundle when its signature changed since the last
    /// validation. The structural check is advisory: problems are logged,
    /// never failed.
    pub fn revalidate(&self, bundle: &ManifestBundle) {
        let signature = bundle.signature();
        let mut last = self.last_validated.lock().expect("validation lock");
        if last.as_deref() == Some(signature.as_str()) {
            return;
        }

        let issues = validate_bundle(bundle);
        if issues.is_empty() {
            tracing::debug!(signature = %signature, "bundle structure validated");
        } else {
            for issue in &issues {
                tracing::warn!(signature = %signature, issue = %issue, "bundle validation issue");
            }
        }
        *last = Some(signature);
    }
}

/// Loads a manifest bundle from an explicit path (snapshots, explicit
/// comparison paths). Not memoized.
///
/// # Errors
///
/// Returns an error when the file is absent or malformed.
pub fn load_manifest_at(path: &Path) -> Result<ManifestBundle> {
    let doc: ManifestDoc = read_json(path)?;
    Ok(ManifestBundle::from_doc(doc))
}

/// Loads a catalog from an explicit path. Not memoized; a missing file
/// yields `None`.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be parsed.
pub fn load_catalog_at(path: &Path) -> Result<Option<Catalog>> {
    match read_json::<CatalogDoc>(path) {
        Ok(doc) => Ok(Some(Catalog::from_doc(doc))),
        Err(ArtifactError::Missing { .. }) => Ok(None),
        Err(other) => Err(other),
    }
}

/// Structural validation: metadata presence, non-empty node union, and
/// advisory cycle detection over the dependency graph.
#[must_use]
pub fn validate_bundle(bundle: &ManifestBundle) -> Vec<String> {
    let mut issues = Vec::new();

    if bundle.metadata.generated_at.is_none() && bundle.metadata.dbt_version.is_none() {
        issues.push("manifest metadata section is empty".to_string());
    }
    if bundle.assets.is_empty() {
        issues.push("manifest contains no nodes, sources, or macros".to_string());
    }

    for cycle_entry in detect_cycles(&bundle.assets) {
        issues.push(format!("dependency cycle through {cycle_entry}"));
    }

    issues
}

/// Iterative DFS cycle detection with an explicit recursion-stack set.
/// Returns one representative id per detected back edge.
fn detect_cycles(assets: &BTreeMap<String, crate::model::Asset>) -> Vec<String> {
    let mut finished: HashSet<&str> = HashSet::new();
    let mut cycles = Vec::new();

    for start in assets.keys() {
        if finished.contains(start.as_str()) {
            continue;
        }

        // Frame: (node, next dependency index to visit).
        let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
        let mut on_stack: HashSet<&str> = HashSet::new();
        on_stack.insert(start.as_str());

        loop {
            let Some(frame) = stack.last_mut() else { break };
            let node = frame.0;
            let next = frame.1;
            frame.1 += 1;

            let deps = assets
                .get(node)
                .map_or(&[] as &[String], |a| a.depends_on.as_slice());

            if let Some(dep) = deps.get(next) {
                let dep = dep.as_str();
                // Dangling parents are tolerated and never traversed.
                if !assets.contains_key(dep) || finished.contains(dep) {
                    continue;
                }
                if on_stack.contains(dep) {
                    cycles.push(dep.to_string());
                    continue;
                }
                on_stack.insert(dep);
                stack.push((dep, 0));
            } else {
                on_stack.remove(node);
                finished.insert(node);
                stack.pop();
            }
        }
    }

    cycles
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ArtifactError::Missing {
                path: path.display().to_string(),
            }
        } else {
            ArtifactError::Io {
                path: path.display().to_string(),
                source: e,
            }
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Malformed {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle_from_json(json: serde_json::Value) -> ManifestBundle {
        let doc: ManifestDoc = serde_json::from_value(json).unwrap();
        ManifestBundle::from_doc(doc)
    }

    #[test]
    fn validate_flags_empty_bundle() {
        let bundle = bundle_from_json(serde_json::json!({}));
        let issues = validate_bundle(&bundle);
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn validate_accepts_clean_bundle() {
        let bundle = bundle_from_json(serde_json::json!({
            "metadata": {"dbt_version": "1.7.0"},
            "nodes": {
                "model.app.a": {
                    "unique_id": "model.app.a",
                    "resource_type": "model",
                    "depends_on": {"nodes": ["model.app.b"]}
                },
                "model.app.b": {"unique_id": "model.app.b", "resource_type": "model"}
            }
        }));
        assert!(validate_bundle(&bundle).is_empty());
    }

    #[test]
    fn validate_reports_cycles_without_failing() {
        let bundle = bundle_from_json(serde_json::json!({
            "metadata": {"dbt_version": "1.7.0"},
            "nodes": {
                "model.app.a": {
                    "unique_id": "model.app.a",
                    "resource_type": "model",
                    "depends_on": {"nodes": ["model.app.b"]}
                },
                "model.app.b": {
                    "unique_id": "model.app.b",
                    "resource_type": "model",
                    "depends_on": {"nodes": ["model.app.a"]}
                }
            }
        }));
        let issues = validate_bundle(&bundle);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("dependency cycle"));
    }
}
