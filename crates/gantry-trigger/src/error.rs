//! Error types for trigger evaluation.

use gantry_model::ModelError;
use thiserror::Error;

/// Result type alias for trigger operations.
pub type TriggerResult<T> = Result<T, TriggerError>;

/// Errors that can occur while resolving or deciding triggers.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// An image-change trigger has never resolved; the definition is in
    /// an explicitly illegal state for a rollout decision.
    #[error("definition {0} contains unresolved image change triggers")]
    UnresolvedImages(String),

    /// A single image-stream lookup failed for a reason other than
    /// not-found.
    #[error("image stream lookup failed: {0}")]
    Lookup(String),

    /// One or more lookups failed; not-found results are never included.
    #[error("failed to resolve image triggers for {definition}: {errors}")]
    ResolveFailed { definition: String, errors: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}
