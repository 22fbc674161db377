//! The rollout phase lattice.
//!
//! A rollout instance moves through New → Pending → Running and lands in
//! one of the two terminal phases, Complete or Failed. Terminal phases
//! have no legal outgoing transition, including to themselves.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a rollout instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutPhase {
    New,
    Pending,
    Running,
    Complete,
    Failed,
}

impl RolloutPhase {
    /// Whether it is legal to go from this phase to `next`.
    pub fn can_transition(self, next: RolloutPhase) -> bool {
        use RolloutPhase::*;
        match self {
            New => matches!(next, Pending | Running | Complete | Failed),
            Pending => matches!(next, Running | Complete | Failed),
            Running => matches!(next, Complete | Failed),
            Complete | Failed => false,
        }
    }

    /// Whether this phase is terminal (Complete or Failed).
    pub fn is_terminal(self) -> bool {
        matches!(self, RolloutPhase::Complete | RolloutPhase::Failed)
    }

    /// Annotation string form.
    pub fn as_str(self) -> &'static str {
        match self {
            RolloutPhase::New => "new",
            RolloutPhase::Pending => "pending",
            RolloutPhase::Running => "running",
            RolloutPhase::Complete => "complete",
            RolloutPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RolloutPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(RolloutPhase::New),
            "pending" => Ok(RolloutPhase::Pending),
            "running" => Ok(RolloutPhase::Running),
            "complete" => Ok(RolloutPhase::Complete),
            "failed" => Ok(RolloutPhase::Failed),
            _ => Err(()),
        }
    }
}
