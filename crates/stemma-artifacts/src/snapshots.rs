//! Labelled snapshot discovery.
//!
//! Snapshots are point-in-time manifest/catalog/sources triples captured
//! under `samples/adventureworks-batches/{label}/`. A sibling
//! `index.json` lists the available labels in insertion order; each
//! snapshot directory may carry a `summary.json` whose `generated_at`
//! saves a full manifest parse when only the timestamp is needed.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ArtifactError, Result};
use crate::model::{Catalog, ManifestBundle};
use crate::paths::validate_snapshot_label;
use crate::store::{CATALOG_FILE, MANIFEST_FILE, SOURCES_FILE, load_catalog_at, load_manifest_at};

/// Directory under the artifact root that holds snapshot directories.
pub const SNAPSHOT_BASE: &str = "samples/adventureworks-batches";
/// Label index file, sibling of the snapshot directories.
pub const SNAPSHOT_INDEX_FILE: &str = "index.json";
/// Optional per-snapshot summary file.
pub const SNAPSHOT_SUMMARY_FILE: &str = "summary.json";

/// `index.json` is a plain array of labels; a `{"labels": [...]}` wrapper
/// is tolerated.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotIndexDoc {
    Labels(Vec<String>),
    Wrapped { labels: Vec<String> },
}

#[derive(Debug, Default, Deserialize)]
struct SnapshotSummaryDoc {
    #[serde(default)]
    generated_at: Option<String>,
}

/// A loaded snapshot: its label and artifact pair.
#[derive(Debug)]
pub struct Snapshot {
    /// The snapshot's label.
    pub label: String,
    /// The snapshot's manifest bundle.
    pub manifest: ManifestBundle,
    /// The snapshot's catalog, when present.
    pub catalog: Option<Catalog>,
    /// Path of the snapshot's sources-freshness file, when present.
    pub sources_path: Option<PathBuf>,
}

/// Returns the snapshot base directory under `root`.
#[must_use]
pub fn snapshot_base(root: &Path) -> PathBuf {
    root.join(SNAPSHOT_BASE)
}

/// Lists available snapshot labels in insertion order.
///
/// A missing index file means no snapshots are available.
///
/// # Errors
///
/// Returns an error when the index file exists but cannot be parsed.
pub fn list_labels(root: &Path) -> Result<Vec<String>> {
    let index_path = snapshot_base(root).join(SNAPSHOT_INDEX_FILE);
    let bytes = match std::fs::read(&index_path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(ArtifactError::Io {
                path: index_path.display().to_string(),
                source: e,
            });
        }
    };

    let doc: SnapshotIndexDoc =
        serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Malformed {
            path: index_path.display().to_string(),
            message: e.to_string(),
        })?;
    Ok(match doc {
        SnapshotIndexDoc::Labels(labels) | SnapshotIndexDoc::Wrapped { labels } => labels,
    })
}

/// Loads the full artifact pair of a labelled snapshot.
///
/// # Errors
///
/// Returns an error when the label is unsafe, the snapshot directory does
/// not exist, or its manifest cannot be loaded.
pub fn load_snapshot(root: &Path, label: &str) -> Result<Snapshot> {
    validate_snapshot_label(label)?;
    let dir = snapshot_base(root).join(label);
    if !dir.is_dir() {
        return Err(ArtifactError::SnapshotNotFound {
            label: label.to_string(),
        });
    }

    let manifest = load_manifest_at(&dir.join(MANIFEST_FILE))?;
    let catalog = load_catalog_at(&dir.join(CATALOG_FILE))?;
    let sources_path = dir.join(SOURCES_FILE);
    let sources_path = sources_path.exists().then_some(sources_path);

    Ok(Snapshot {
        label: label.to_string(),
        manifest,
        catalog,
        sources_path,
    })
}

/// Reads a snapshot's `generated_at` without loading the full pair:
/// `summary.json` first, then the snapshot manifest's metadata.
#[must_use]
pub fn snapshot_generated_at(root: &Path, label: &str) -> Option<String> {
    if validate_snapshot_label(label).is_err() {
        return None;
    }
    let dir = snapshot_base(root).join(label);

    if let Ok(bytes) = std::fs::read(dir.join(SNAPSHOT_SUMMARY_FILE)) {
        if let Ok(summary) = serde_json::from_slice::<SnapshotSummaryDoc>(&bytes) {
            if summary.generated_at.is_some() {
                return summary.generated_at;
            }
        }
    }

    load_manifest_at(&dir.join(MANIFEST_FILE))
        .ok()
        .and_then(|m| m.metadata.generated_at)
}
