//! Stage runner.
//!
//! This module provides:
//! - Named stages that can be skipped from outside the test code
//! - Deferred cleanup stages that unwind even after a failure
//! - A per-stage record of what ran, for how long, and why it failed

mod plan;
mod report;
mod runner;
mod skip;
mod status;


pub use plan::StagePlan;
pub use report::{RunReport, StageRecord};
pub use runner::StageRunner;
pub use skip::{EnvSkipSignal, SkipSignal, StaticSkipSignal, DEFAULT_SKIP_PREFIX};
pub use status::StageStatus;
