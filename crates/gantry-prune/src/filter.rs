//! Pre-filter predicates applied once, upstream of every resolver.
//!
//! Each predicate answers "may this instance still be considered for
//! pruning?"; `and_chain` combines them so new filters slot in without
//! touching resolver logic.

use gantry_model::{RolloutInstance, now_unix};

/// A single pre-filter predicate. Returns `true` to keep the instance
/// in the candidate pool.
pub type InstancePredicate = Box<dyn Fn(&RolloutInstance) -> bool + Send + Sync>;

/// AND-combine predicates into one filter pass.
pub fn and_chain(
    predicates: Vec<InstancePredicate>,
    instances: Vec<RolloutInstance>,
) -> Vec<RolloutInstance> {
    instances
        .into_iter()
        .filter(|instance| predicates.iter().all(|p| p(instance)))
        .collect()
}

/// Keeps only instances carrying the ownership annotation. Anything
/// not created by the orchestrator is never touched.
pub fn owned() -> InstancePredicate {
    Box::new(|instance| instance.owner().is_some())
}

/// Keeps only instances scaled fully down. An instance still holding
/// desired or current replicas is live traffic, not history.
pub fn inactive() -> InstancePredicate {
    Box::new(|instance| instance.desired_replicas() == 0 && instance.current_replicas() == 0)
}

/// Keeps only instances created at least `keep_younger_than_seconds`
/// before `now`.
pub fn older_than(keep_younger_than_seconds: u64, now: u64) -> InstancePredicate {
    Box::new(move |instance| {
        now.saturating_sub(instance.created_at) >= keep_younger_than_seconds
    })
}

/// The standard pre-filter chain for a prune run.
pub fn standard_chain(keep_younger_than_seconds: u64) -> Vec<InstancePredicate> {
    vec![
        owned(),
        inactive(),
        older_than(keep_younger_than_seconds, now_unix()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_model::RolloutPhase;
    use gantry_model::fixtures::{ok_definition, ok_instance};
    use gantry_model::instance::keys;

    /// A fully scaled-down historical instance.
    fn instance(version: i64) -> RolloutInstance {
        let mut instance = ok_instance(&ok_definition(version), version, RolloutPhase::Complete);
        instance
            .annotations
            .insert(keys::DESIRED_REPLICAS.to_string(), "0".to_string());
        instance
    }

    #[test]
    fn unowned_instances_are_dropped() {
        let mut orphaned = instance(1);
        orphaned.annotations.remove(keys::DEFINITION);
        let kept = and_chain(vec![owned()], vec![instance(2), orphaned]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].version(), 2);
    }

    #[test]
    fn scaled_up_instances_are_protected() {
        let mut live = instance(1);
        live.annotations
            .insert(keys::CURRENT_REPLICAS.to_string(), "2".to_string());
        let kept = and_chain(vec![inactive()], vec![live, instance(2)]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].version(), 2);
    }

    #[test]
    fn desired_replicas_alone_protect() {
        let mut pending = instance(1);
        pending
            .annotations
            .insert(keys::DESIRED_REPLICAS.to_string(), "3".to_string());
        assert!(and_chain(vec![inactive()], vec![pending]).is_empty());
    }

    #[test]
    fn young_instances_are_protected() {
        let now = 10_000;
        let mut old = instance(1);
        old.created_at = now - 7_200;
        let mut young = instance(2);
        young.created_at = now - 60;
        let kept = and_chain(vec![older_than(3_600, now)], vec![old, young]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].version(), 1);
    }

    #[test]
    fn chain_requires_every_predicate() {
        let now = 10_000;
        let mut old_but_live = instance(1);
        old_but_live.created_at = now - 7_200;
        old_but_live
            .annotations
            .insert(keys::CURRENT_REPLICAS.to_string(), "1".to_string());
        let kept = and_chain(
            vec![owned(), inactive(), older_than(3_600, now)],
            vec![old_but_live],
        );
        assert!(kept.is_empty());
    }
}
