//! Testing utilities for drivers built on stagecheck.
//!
//! This module provides:
//! - Scripted HTTP and command collaborators
//! - A shared call counter for "was this action invoked" checks
//! - Assertions over run reports

mod assertions;
mod mocks;

pub use assertions::{assert_run_failed_at, assert_run_succeeded, assert_stage_status};
pub use mocks::{CallCounter, RecordedRequest, RecordingCommandRunner, ScriptedHttpClient};
