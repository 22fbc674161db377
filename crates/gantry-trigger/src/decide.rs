//! The rollout decision.
//!
//! Compares a definition against the snapshot decoded from its latest
//! materialized instance and returns whether a new rollout is justified,
//! with the ordered causes. Image-change and config-change causes are
//! mutually exclusive in the result: if any image trigger fired, the
//! config-change cause is never added.

use tracing::debug;

use gantry_model::{Cause, PodTemplate, Trigger, WorkloadDefinition};

use crate::error::{TriggerError, TriggerResult};

/// Structural comparison deciding whether two pod templates meaningfully
/// differ. The exact scope of "meaningful" is deliberately configurable;
/// the default is full field-by-field equality.
pub type TemplateEq = fn(&PodTemplate, &PodTemplate) -> bool;

/// Default template comparison: full structural equality.
pub fn default_template_eq(a: &PodTemplate, b: &PodTemplate) -> bool {
    a == b
}

/// Decide whether a new rollout is warranted, using the default template
/// comparison.
///
/// `decoded` is the definition snapshot from the latest instance; `None`
/// when the definition has never rolled out.
pub fn decide_rollout(
    definition: &WorkloadDefinition,
    decoded: Option<&WorkloadDefinition>,
    force: bool,
) -> TriggerResult<(bool, Vec<Cause>)> {
    decide_rollout_with(definition, decoded, force, default_template_eq)
}

/// Decide whether a new rollout is warranted.
///
/// Force always wins and short-circuits every other consideration. Any
/// image-change trigger that has never resolved makes the whole call
/// fail: deciding on unresolved images would silently skip a declared
/// trigger.
pub fn decide_rollout_with(
    definition: &WorkloadDefinition,
    decoded: Option<&WorkloadDefinition>,
    force: bool,
    template_eq: TemplateEq,
) -> TriggerResult<(bool, Vec<Cause>)> {
    if force {
        return Ok((true, vec![Cause::Manual]));
    }

    for trigger in &definition.spec.triggers {
        if let Some(params) = trigger.image_params() {
            if params.last_triggered_image.is_empty() {
                return Err(TriggerError::UnresolvedImages(definition.label()));
            }
        }
    }

    let mut causes = Vec::new();
    for trigger in &definition.spec.triggers {
        let Trigger::ImageChange(params) = trigger else {
            continue;
        };
        if !params.automatic {
            continue;
        }
        let fired = match decoded {
            // First rollout: every resolved automatic trigger fires.
            None => true,
            Some(previous) => {
                let recorded = previous.spec.triggers.iter().find_map(|t| {
                    t.image_params()
                        .filter(|p| p.from.same_tag(&params.from, &definition.namespace))
                });
                match recorded {
                    // A reference absent from the previous rollout's
                    // triggers always fires (a newly added trigger).
                    None => true,
                    // The image actually moved since the last rollout.
                    Some(prev_params) => {
                        prev_params.last_triggered_image != params.last_triggered_image
                    }
                }
            }
        };
        if fired {
            debug!(
                definition = %definition.label(),
                image = %params.last_triggered_image,
                "image change trigger fired"
            );
            causes.push(Cause::ImageChange {
                image: params.last_triggered_image.clone(),
            });
        }
    }

    if causes.is_empty() && definition.has_config_change_trigger() {
        let fired = match decoded {
            None => true,
            Some(previous) => !template_eq(&definition.spec.template, &previous.spec.template),
        };
        if fired {
            debug!(definition = %definition.label(), "config change trigger fired");
            causes.push(Cause::ConfigChange);
        }
    }

    Ok((!causes.is_empty(), causes))
}
