//! Error taxonomy for rollout orchestration.
//!
//! Client errors are never retried; conflicts are retried up to the
//! orchestrator's budget; everything else surfaces unretried.

use gantry_model::ModelError;
use gantry_trigger::TriggerError;
use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for rollout operations.
pub type RolloutResult<T> = Result<T, RolloutError>;

/// Errors that can occur while instantiating or rolling back.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("definition {0} not found")]
    DefinitionNotFound(String),

    #[error("instance {0} not found")]
    InstanceNotFound(String),

    /// Bad request shape, paused definition, invalid rollback target.
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Optimistic-concurrency failure on commit.
    #[error("conflict committing definition {0}: concurrent modification")]
    Conflict(String),

    /// The upstream reconciliation invariant is broken; never retried.
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl RolloutError {
    /// Whether this error is an optimistic-concurrency conflict that the
    /// retry loop may absorb.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RolloutError::Conflict(_))
    }

    /// Whether this is a 4xx-equivalent error the caller must fix.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RolloutError::DefinitionNotFound(_)
                | RolloutError::InstanceNotFound(_)
                | RolloutError::Invalid(_)
                | RolloutError::Trigger(TriggerError::UnresolvedImages(_))
        )
    }
}

impl From<StoreError> for RolloutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(name) => RolloutError::Conflict(name),
            StoreError::Backend(message) => RolloutError::Storage(message),
        }
    }
}
