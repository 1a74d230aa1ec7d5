//! Per-stage records and the summary of a run.

use super::status::StageStatus;
use crate::errors::StageError;
use chrono::{DateTime, Utc};
use tracing::debug;

/// What happened to one stage.
#[derive(Debug, Clone)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Final status.
    pub status: StageStatus,
    /// True for stages that ran during unwinding.
    pub deferred: bool,
    /// Time spent in the action; zero if it never ran.
    pub duration_ms: f64,
    /// The failure, for failed stages.
    pub error: Option<StageError>,
    /// When the action started, if it did.
    pub started_at: Option<DateTime<Utc>>,
}

impl StageRecord {
    pub(crate) fn pending(name: impl Into<String>, deferred: bool) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Pending,
            deferred,
            duration_ms: 0.0,
            error: None,
            started_at: None,
        }
    }

    pub(crate) fn transition(&mut self, next: StageStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal stage transition {} -> {next}",
            self.status
        );
        debug!(stage = %self.name, from = %self.status, to = %next, "Stage transition");
        self.status = next;
    }
}

/// The outcome of a whole run, one record per declared stage in the
/// order stages were settled.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    records: Vec<StageRecord>,
}

impl RunReport {
    pub(crate) fn new(records: Vec<StageRecord>) -> Self {
        Self { records }
    }

    /// Returns all records.
    #[must_use]
    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    /// Returns the record for `name`, if that stage was declared.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StageRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Returns the status of `name`, if that stage was declared.
    #[must_use]
    pub fn status_of(&self, name: &str) -> Option<StageStatus> {
        self.get(name).map(|r| r.status)
    }

    /// Returns the names of stages with the given status.
    #[must_use]
    pub fn names_with(&self, status: StageStatus) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Returns the first stage that failed.
    #[must_use]
    pub fn first_failure(&self) -> Option<&StageRecord> {
        self.records.iter().find(|r| r.status.is_failure())
    }

    /// Returns true if no stage failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.first_failure().is_none()
    }

    /// Total time spent in stage actions.
    #[must_use]
    pub fn total_duration_ms(&self) -> f64 {
        self.records.iter().map(|r| r.duration_ms).sum()
    }

    /// Converts a failed run into its first error.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failed stage.
    pub fn into_result(self) -> Result<Self, StageError> {
        let failure = self
            .first_failure()
            .and_then(|r| r.error.clone());
        match failure {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}
