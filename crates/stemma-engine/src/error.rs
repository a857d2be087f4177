//! Error types for engine operations.

use thiserror::Error;

use stemma_artifacts::ArtifactError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur during lineage and check computation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested root id is absent from the merged node view.
    #[error("node not found: {id}")]
    NodeNotFound {
        /// The id that was looked up.
        id: String,
    },

    /// The computation was abandoned because the caller went away.
    #[error("computation cancelled")]
    Cancelled,

    /// An artifact could not be loaded or resolved.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
