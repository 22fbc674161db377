//! Admission hooks applied to a definition candidate before commit.

use gantry_model::{Strategy, Trigger, WorkloadDefinition};

use crate::error::{RolloutError, RolloutResult};

/// Admission collaborator: mutate runs before validate, both run before
/// every commit.
pub trait Admission: Send + Sync {
    fn mutate(&self, definition: &mut WorkloadDefinition) -> RolloutResult<()>;
    fn validate(&self, definition: &WorkloadDefinition) -> RolloutResult<()>;
}

/// Admission that admits everything unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAdmission;

impl Admission for NoAdmission {
    fn mutate(&self, _definition: &mut WorkloadDefinition) -> RolloutResult<()> {
        Ok(())
    }

    fn validate(&self, _definition: &WorkloadDefinition) -> RolloutResult<()> {
        Ok(())
    }
}

/// Default platform admission: defaults trigger namespaces and enforces
/// the trigger and strategy invariants.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerAdmission;

impl Admission for TriggerAdmission {
    fn mutate(&self, definition: &mut WorkloadDefinition) -> RolloutResult<()> {
        let namespace = definition.namespace.clone();
        for trigger in &mut definition.spec.triggers {
            if let Some(params) = trigger.image_params_mut() {
                if params.from.namespace.is_none() {
                    params.from.namespace = Some(namespace.clone());
                }
            }
        }
        Ok(())
    }

    fn validate(&self, definition: &WorkloadDefinition) -> RolloutResult<()> {
        for (i, trigger) in definition.spec.triggers.iter().enumerate() {
            if let Trigger::ImageChange(params) = trigger {
                if params.container_names.is_empty() {
                    return Err(RolloutError::Invalid(format!(
                        "trigger {i}: image change trigger must name at least one container"
                    )));
                }
                params
                    .from
                    .split()
                    .map_err(|e| RolloutError::Invalid(format!("trigger {i}: {e}")))?;
            }
        }
        if let Strategy::Rolling(params) = &definition.spec.strategy {
            if params.max_surge == 0 && params.max_unavailable == 0 {
                return Err(RolloutError::Invalid(
                    "rolling strategy cannot have both max_surge and max_unavailable set to zero"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_model::RollingParams;
    use gantry_model::fixtures::ok_definition;

    #[test]
    fn mutate_defaults_trigger_namespace() {
        let mut def = ok_definition(1);
        assert!(def.spec.triggers[0].image_params().unwrap().from.namespace.is_none());
        TriggerAdmission.mutate(&mut def).unwrap();
        assert_eq!(
            def.spec.triggers[0].image_params().unwrap().from.namespace.as_deref(),
            Some("prod")
        );
    }

    #[test]
    fn validate_rejects_empty_container_names() {
        let mut def = ok_definition(1);
        def.spec.triggers[0]
            .image_params_mut()
            .unwrap()
            .container_names
            .clear();
        let err = TriggerAdmission.validate(&def).unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("at least one container"));
    }

    #[test]
    fn validate_rejects_malformed_tag_reference() {
        let mut def = ok_definition(1);
        def.spec.triggers[0].image_params_mut().unwrap().from.name = "no-tag".to_string();
        assert!(TriggerAdmission.validate(&def).is_err());
    }

    #[test]
    fn validate_rejects_zero_fenceposts() {
        let mut def = ok_definition(1);
        def.spec.strategy = Strategy::Rolling(RollingParams {
            max_surge: 0,
            max_unavailable: 0,
            timeout_seconds: None,
        });
        assert!(TriggerAdmission.validate(&def).is_err());
    }

    #[test]
    fn valid_definition_is_admitted() {
        let def = ok_definition(1);
        TriggerAdmission.validate(&def).unwrap();
    }
}
