//! Error types for artifact operations.

use thiserror::Error;

/// Result type alias for artifact operations.
pub type Result<T> = std::result::Result<T, ArtifactError>;

/// Errors that can occur while loading or resolving artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// A required artifact file is absent.
    #[error("artifact missing: {path}")]
    Missing {
        /// Path that was looked up.
        path: String,
    },

    /// An artifact file exists but could not be parsed.
    #[error("artifact malformed: {path}: {message}")]
    Malformed {
        /// Path of the malformed artifact.
        path: String,
        /// Parse failure description.
        message: String,
    },

    /// Reading an artifact failed at the I/O layer.
    #[error("failed to read {path}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A caller-supplied parameter combination is invalid.
    #[error("invalid parameter: {0}")]
    InvalidParams(String),

    /// A caller-supplied path resolves outside the artifact root or is
    /// not a `.json` file.
    #[error("unsafe artifact path: {path}")]
    UnsafePath {
        /// The offending path as supplied by the caller.
        path: String,
    },

    /// The requested snapshot label does not exist.
    #[error("unknown snapshot: {label}")]
    SnapshotNotFound {
        /// The label that was requested.
        label: String,
    },
}

impl ArtifactError {
    /// Returns true when the error indicates an absent or unreadable
    /// required artifact (surfaced as 503 by the HTTP layer).
    #[must_use]
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            Self::Missing { .. } | Self::Malformed { .. } | Self::Io { .. }
        )
    }
}
