//! Bounded retry-on-conflict.
//!
//! An explicit combinator over an "attempt" closure and a conflict
//! predicate, so the read-modify-write state machine stays testable
//! without a real concurrent store.

use tracing::debug;

/// Run `attempt` up to `attempts` times, retrying only errors for which
/// `is_conflict` returns true. Exhausting the budget surfaces the last
/// conflict; any other error surfaces immediately. An `attempts` of zero
/// is treated as one.
pub fn retry_conflict<T, E>(
    attempts: u32,
    is_conflict: impl Fn(&E) -> bool,
    mut attempt: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let attempts = attempts.max(1);
    let mut last_conflict = None;
    for n in 1..=attempts {
        match attempt() {
            Ok(value) => return Ok(value),
            Err(err) if is_conflict(&err) => {
                debug!(attempt = n, budget = attempts, "conflict, retrying");
                last_conflict = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_conflict.expect("at least one attempt ran"))
}
