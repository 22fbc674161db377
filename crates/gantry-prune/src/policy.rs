/// Retention knobs for a prune run.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Instances younger than this many seconds are never candidates.
    pub keep_younger_than_seconds: u64,
    /// Also reap instances whose owning definition no longer exists.
    pub orphans: bool,
    /// Most-recent Complete instances to retain per definition.
    /// Negative disables pruning of the Complete bucket.
    pub keep_complete: i32,
    /// Most-recent Failed instances to retain per definition.
    /// Negative disables pruning of the Failed bucket.
    pub keep_failed: i32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_younger_than_seconds: 60 * 60,
            orphans: false,
            keep_complete: 5,
            keep_failed: 1,
        }
    }
}
