//! The definition codec used to embed snapshots in instance annotations.
//!
//! The codec is an explicit, injected capability rather than a global
//! registry: everything that encodes or decodes a definition snapshot
//! receives a `&dyn DefinitionCodec`.

use crate::error::{ModelError, ModelResult};
use crate::types::WorkloadDefinition;

/// Encode/decode a workload definition for annotation storage.
pub trait DefinitionCodec: Send + Sync {
    fn encode(&self, definition: &WorkloadDefinition) -> ModelResult<String>;
    fn decode(&self, raw: &str) -> ModelResult<WorkloadDefinition>;
}

/// JSON codec; the platform's wire and storage format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl DefinitionCodec for JsonCodec {
    fn encode(&self, definition: &WorkloadDefinition) -> ModelResult<String> {
        serde_json::to_string(definition).map_err(|e| ModelError::Encode(e.to_string()))
    }

    fn decode(&self, raw: &str) -> ModelResult<WorkloadDefinition> {
        serde_json::from_str(raw).map_err(|e| ModelError::Decode(e.to_string()))
    }
}
