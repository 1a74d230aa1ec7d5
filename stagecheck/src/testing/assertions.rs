//! Assertions over run reports.

use crate::stage::{RunReport, StageStatus};

/// Asserts that no stage in the run failed.
pub fn assert_run_succeeded(report: &RunReport) {
    if let Some(failure) = report.first_failure() {
        panic!(
            "Expected run to succeed, but stage '{}' failed: {:?}",
            failure.name, failure.error
        );
    }
}

/// Asserts that the first failure of the run is the stage `name`.
pub fn assert_run_failed_at(report: &RunReport, name: &str) {
    let failed = report.first_failure().map(|r| r.name.as_str());
    assert_eq!(
        failed,
        Some(name),
        "Expected run to fail at '{name}', first failure was {failed:?}"
    );
}

/// Asserts that stage `name` ended with `expected`.
pub fn assert_stage_status(report: &RunReport, name: &str, expected: StageStatus) {
    let actual = report.status_of(name);
    assert_eq!(
        actual,
        Some(expected),
        "Expected stage '{name}' to be {expected}, got {actual:?}"
    );
}
