//! Stage lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a stage.
///
/// A stage moves `Pending -> Skipped` or `Pending -> Running -> Completed |
/// Failed`. Regular stages that never get a turn because an earlier stage
/// failed end as `NotRun`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Declared but not yet reached.
    Pending,
    /// Suppressed by the skip signal; the action was not invoked.
    Skipped,
    /// The action is executing.
    Running,
    /// The action returned successfully.
    Completed,
    /// The action returned an error or panicked.
    Failed,
    /// Abandoned because an earlier stage failed.
    NotRun,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Skipped => write!(f, "skipped"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::NotRun => write!(f, "not_run"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Skipped | Self::Completed | Self::Failed | Self::NotRun)
    }

    /// Returns true if the run may move on to the next stage.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Skipped | Self::Completed)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Returns true if `next` is a legal successor of this status.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Skipped | Self::Running | Self::NotRun | Self::Failed)
                | (Self::Running, Self::Completed | Self::Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Completed.to_string(), "completed");
        assert_eq!(StageStatus::Skipped.to_string(), "skipped");
        assert_eq!(StageStatus::NotRun.to_string(), "not_run");
        assert_eq!(StageStatus::default(), StageStatus::Pending);
    }

    #[test]
    fn test_stage_status_predicates() {
        assert!(StageStatus::Completed.is_success());
        assert!(StageStatus::Skipped.is_success());
        assert!(!StageStatus::Failed.is_success());
        assert!(StageStatus::Failed.is_failure());
        assert!(!StageStatus::NotRun.is_failure());
        assert!(!StageStatus::Running.is_terminal());
        assert!(!StageStatus::Pending.is_terminal());
        assert!(StageStatus::NotRun.is_terminal());
    }

    #[test]
    fn test_transitions() {
        use StageStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Skipped));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        // Rejected before running, e.g. a duplicate name.
        assert!(Pending.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Skipped.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Failed));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&StageStatus::NotRun).unwrap();
        assert_eq!(json, "\"not_run\"");
        let back: StageStatus = serde_json::from_str("\"skipped\"").unwrap();
        assert_eq!(back, StageStatus::Skipped);
    }
}
