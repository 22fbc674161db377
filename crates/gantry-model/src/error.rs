//! Error types for the Gantry domain model.

use thiserror::Error;

/// Result type alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while encoding, decoding, or interpreting
/// the domain model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to encode definition: {0}")]
    Encode(String),

    #[error("failed to decode definition: {0}")]
    Decode(String),

    #[error("instance {0} carries no encoded definition snapshot")]
    MissingSnapshot(String),

    #[error("invalid image stream tag reference {0:?}: expected name:tag")]
    InvalidTagRef(String),
}
