//! Image-change trigger resolution.
//!
//! Walks the definition's image-change triggers, resolves each watched
//! stream tag through the injected lookup, and retags the listed
//! containers in the pod template when the tag moved. Mutates the
//! definition in place; committing it is the caller's responsibility.

use std::collections::HashMap;

use tracing::debug;

use gantry_model::{DefinitionSpec, TriggerType, WorkloadDefinition};

use crate::error::{TriggerError, TriggerResult};

/// A named set of tags, each resolving to the latest pushed image
/// reference for that tag.
#[derive(Debug, Clone, Default)]
pub struct ImageStream {
    tags: HashMap<String, String>,
}

impl ImageStream {
    pub fn new(tags: HashMap<String, String>) -> Self {
        Self { tags }
    }

    /// The latest pushed image reference for a tag, if the tag exists.
    pub fn resolve_tag(&self, tag: &str) -> Option<&str> {
        self.tags.get(tag).map(String::as_str)
    }
}

/// Image-stream lookup collaborator.
pub trait ImageStreamLookup: Send + Sync {
    /// Fetch a stream by namespace and name. `Ok(None)` means the stream
    /// does not exist, which is never an error for trigger resolution.
    fn get_stream(&self, namespace: &str, name: &str) -> TriggerResult<Option<ImageStream>>;
}

/// In-memory stream registry, keyed by `{namespace}/{name}`. Suitable
/// for daemons that learn about pushed images through their own API
/// rather than an external registry watcher.
#[derive(Default)]
pub struct StaticImageStreams {
    streams: std::sync::RwLock<HashMap<String, ImageStream>>,
}

impl StaticImageStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a stream.
    pub fn put_stream(&self, namespace: &str, name: &str, stream: ImageStream) {
        self.streams
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(format!("{namespace}/{name}"), stream);
    }

    /// Point one tag of a stream at a new image reference, creating the
    /// stream if needed.
    pub fn put_tag(&self, namespace: &str, name: &str, tag: &str, reference: &str) {
        let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());
        streams
            .entry(format!("{namespace}/{name}"))
            .or_default()
            .tags
            .insert(tag.to_string(), reference.to_string());
    }
}

impl ImageStreamLookup for StaticImageStreams {
    fn get_stream(&self, namespace: &str, name: &str) -> TriggerResult<Option<ImageStream>> {
        Ok(self
            .streams
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&format!("{namespace}/{name}"))
            .cloned())
    }
}

/// Resolve every image-change trigger that is not excluded and is
/// eligible to fire (`force`, or automatic on an unpaused definition).
///
/// A stream that does not exist or a tag the stream does not carry makes
/// the trigger currently unresolvable and is skipped silently. Lookup
/// failures for other reasons are collected and returned as one
/// aggregated error after every trigger has been evaluated.
pub fn resolve_image_triggers(
    definition: &mut WorkloadDefinition,
    lookup: &dyn ImageStreamLookup,
    force: bool,
    excluded: &[TriggerType],
) -> TriggerResult<()> {
    if excluded.contains(&TriggerType::ImageChange) {
        return Ok(());
    }

    let label = definition.label();
    let default_namespace = definition.namespace.clone();
    let DefinitionSpec {
        triggers,
        template,
        paused,
        ..
    } = &mut definition.spec;

    let mut errors = Vec::new();
    for trigger in triggers {
        let Some(params) = trigger.image_params_mut() else {
            continue;
        };
        if !(force || (!*paused && params.automatic)) {
            continue;
        }

        let (stream_name, tag) = match params.from.split() {
            Ok(parts) => parts,
            Err(err) => {
                errors.push(err.to_string());
                continue;
            }
        };
        let namespace = params.from.namespace.as_deref().unwrap_or(&default_namespace);

        let stream = match lookup.get_stream(namespace, stream_name) {
            Ok(Some(stream)) => stream,
            Ok(None) => continue,
            Err(err) => {
                errors.push(err.to_string());
                continue;
            }
        };
        let Some(reference) = stream.resolve_tag(tag) else {
            continue;
        };
        if reference == params.last_triggered_image {
            continue;
        }
        let reference = reference.to_string();

        for container in template.all_containers_mut() {
            if params.container_names.contains(&container.name) {
                container.image = reference.clone();
            }
        }
        debug!(
            definition = %label,
            stream = %stream_name,
            tag = %tag,
            image = %reference,
            "image trigger resolved"
        );
        params.last_triggered_image = reference;
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TriggerError::ResolveFailed {
            definition: label,
            errors: errors.join("; "),
        })
    }
}
