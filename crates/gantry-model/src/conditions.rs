//! Condition bookkeeping on a definition status.
//!
//! `set_condition` is an upsert keyed by condition type: a no-op when
//! status and reason are both unchanged, and it preserves
//! `last_transition_time` when only the reason or message moved.

use crate::types::{Condition, ConditionStatus, ConditionType, DefinitionStatus, now_unix};

/// Create a new condition with both timestamps set to now.
pub fn new_condition(
    condition_type: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: &str,
) -> Condition {
    let now = now_unix();
    Condition {
        condition_type,
        status,
        reason: reason.to_string(),
        message: message.to_string(),
        last_update_time: now,
        last_transition_time: now,
    }
}

/// Return the condition with the given type, if present.
pub fn get_condition(status: &DefinitionStatus, condition_type: ConditionType) -> Option<&Condition> {
    status
        .conditions
        .iter()
        .find(|c| c.condition_type == condition_type)
}

/// Upsert a condition by type. No-op when the existing condition of the
/// same type already has the same status and reason.
pub fn set_condition(status: &mut DefinitionStatus, mut condition: Condition) {
    if let Some(current) = get_condition(status, condition.condition_type) {
        if current.status == condition.status && current.reason == condition.reason {
            return;
        }
        // Not switching between statuses: keep the original transition time.
        if current.status == condition.status {
            condition.last_transition_time = current.last_transition_time;
        }
    }
    remove_condition(status, condition.condition_type);
    status.conditions.push(condition);
}

/// Remove the condition with the given type, if present.
pub fn remove_condition(status: &mut DefinitionStatus, condition_type: ConditionType) {
    status
        .conditions
        .retain(|c| c.condition_type != condition_type);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available(status: ConditionStatus, reason: &str, transition: u64) -> Condition {
        Condition {
            condition_type: ConditionType::Available,
            status,
            reason: reason.to_string(),
            message: String::new(),
            last_update_time: transition,
            last_transition_time: transition,
        }
    }

    #[test]
    fn set_inserts_when_absent() {
        let mut status = DefinitionStatus::default();
        set_condition(&mut status, available(ConditionStatus::True, "MinimumReplicasAvailable", 10));
        assert_eq!(status.conditions.len(), 1);
        assert!(get_condition(&status, ConditionType::Available).is_some());
    }

    #[test]
    fn set_is_idempotent_for_same_status_and_reason() {
        let mut status = DefinitionStatus::default();
        set_condition(&mut status, available(ConditionStatus::True, "Ready", 10));
        set_condition(&mut status, available(ConditionStatus::True, "Ready", 99));

        let cond = get_condition(&status, ConditionType::Available).unwrap();
        assert_eq!(cond.last_transition_time, 10, "no-op must not touch times");
        assert_eq!(status.conditions.len(), 1);
    }

    #[test]
    fn set_preserves_transition_time_when_status_unchanged() {
        let mut status = DefinitionStatus::default();
        set_condition(&mut status, available(ConditionStatus::True, "Ready", 10));
        // Same status, new reason: replaced, transition time preserved.
        set_condition(&mut status, available(ConditionStatus::True, "Scaled", 99));

        let cond = get_condition(&status, ConditionType::Available).unwrap();
        assert_eq!(cond.reason, "Scaled");
        assert_eq!(cond.last_transition_time, 10);
    }

    #[test]
    fn set_resets_transition_time_on_status_flip() {
        let mut status = DefinitionStatus::default();
        set_condition(&mut status, available(ConditionStatus::True, "Ready", 10));
        set_condition(&mut status, available(ConditionStatus::False, "Degraded", 99));

        let cond = get_condition(&status, ConditionType::Available).unwrap();
        assert_eq!(cond.status, ConditionStatus::False);
        assert_eq!(cond.last_transition_time, 99);
        assert_eq!(status.conditions.len(), 1);
    }

    #[test]
    fn remove_drops_only_matching_type() {
        let mut status = DefinitionStatus::default();
        set_condition(&mut status, available(ConditionStatus::True, "Ready", 10));
        set_condition(
            &mut status,
            Condition {
                condition_type: ConditionType::Progressing,
                ..available(ConditionStatus::True, "NewRollout", 11)
            },
        );

        remove_condition(&mut status, ConditionType::Available);
        assert!(get_condition(&status, ConditionType::Available).is_none());
        assert!(get_condition(&status, ConditionType::Progressing).is_some());
    }
}
