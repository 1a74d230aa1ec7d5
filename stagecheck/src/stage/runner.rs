//! Sequential execution of named stages.

use super::plan::{boxed_action, StageAction, StagePlan, StepKind};
use super::report::{RunReport, StageRecord};
use super::skip::{EnvSkipSignal, SkipSignal};
use super::status::StageStatus;
use crate::config::HarnessConfig;
use crate::errors::StageError;
use crate::observability::SpanTimer;
use crate::utils::panic_message;
use chrono::Utc;
use futures::FutureExt;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

struct DeferredStage<'a> {
    name: String,
    action: StageAction<'a>,
}

/// Runs stages one at a time, honoring the skip signal and unwinding
/// deferred stages in reverse registration order.
///
/// A runner is owned by one test case. Once a stage fails the run is
/// failed: later regular stages are not executed, but deferred stages
/// still run from [`StageRunner::finish`]. Stage names are unique within
/// a run; reusing one fails the run.
pub struct StageRunner<'a> {
    skip: Arc<dyn SkipSignal>,
    declared: HashSet<String>,
    deferred: Vec<DeferredStage<'a>>,
    records: Vec<StageRecord>,
    failure: Option<StageError>,
}

impl std::fmt::Debug for StageRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("deferred", &self.deferred.len())
            .field("records", &self.records.len())
            .field("failed", &self.failure.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for StageRunner<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> StageRunner<'a> {
    /// Creates a runner that reads `SKIP_<stage>` environment variables.
    #[must_use]
    pub fn new() -> Self {
        Self::with_skip_signal(Arc::new(EnvSkipSignal::new()))
    }

    /// Creates a runner with the skip prefix from `config`.
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::with_skip_signal(Arc::new(EnvSkipSignal::with_prefix(config.skip_env_prefix.clone())))
    }

    /// Creates a runner with a custom skip signal.
    #[must_use]
    pub fn with_skip_signal(skip: Arc<dyn SkipSignal>) -> Self {
        Self {
            skip,
            declared: HashSet::new(),
            deferred: Vec::new(),
            records: Vec::new(),
            failure: None,
        }
    }

    /// Returns true once any stage has failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Returns the records of stages settled so far.
    #[must_use]
    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    /// Runs the stage `name` unless it is skipped.
    ///
    /// If the run has already failed, the stage is recorded as not run and
    /// the earlier failure is returned again.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] if the action fails or panics, or
    /// [`StageError::DuplicateName`] if `name` was already used in this run.
    pub async fn run_stage<F, Fut>(&mut self, name: &str, action: F) -> Result<(), StageError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        self.declare(name, false)?;
        if let Some(failure) = &self.failure {
            warn!(stage = name, failed_stage = failure.stage(), "Not running stage after earlier failure");
            let failure = failure.clone();
            self.records.push(not_run(name, false));
            return Err(failure);
        }

        let record = execute(self.skip.as_ref(), name, false, action).await;
        self.settle(record)
    }

    /// Registers a stage to run from [`StageRunner::finish`].
    ///
    /// Deferred stages run last registered first, even if a regular stage
    /// failed. Like any stage, they honor the skip signal. A deferred stage
    /// reusing a name is not registered and fails the run.
    pub fn defer_stage<F, Fut>(&mut self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'a,
    {
        let name = name.into();
        if self.declare(&name, true).is_err() {
            return;
        }
        self.deferred.push(DeferredStage {
            name,
            action: boxed_action(action),
        });
    }

    /// Runs the deferred stages and returns the report of the whole run.
    ///
    /// A failing deferred stage does not stop the remaining ones.
    pub async fn finish(mut self) -> RunReport {
        while let Some(stage) = self.deferred.pop() {
            let record = execute(self.skip.as_ref(), &stage.name, true, stage.action).await;
            // The first failure stays the run's failure.
            let _ = self.settle(record);
        }

        let report = RunReport::new(self.records);
        if report.is_success() {
            info!(stages = report.records().len(), "Run succeeded");
        } else {
            error!(stages = report.records().len(), "Run failed");
        }
        report
    }

    /// Executes a plan with `defer` semantics and returns the report.
    ///
    /// Regular stages run in order until the first failure and the rest are
    /// recorded as not run. A deferred stage is registered only if the plan
    /// reaches it before a failure.
    pub async fn run(mut self, plan: StagePlan<'a>) -> RunReport {
        for step in plan.steps {
            if self.declare(&step.name, step.kind == StepKind::Deferred).is_err() {
                continue;
            }
            if self.failure.is_some() {
                self.records.push(not_run(&step.name, step.kind == StepKind::Deferred));
                continue;
            }
            match step.kind {
                StepKind::Deferred => self.deferred.push(DeferredStage {
                    name: step.name,
                    action: step.action,
                }),
                StepKind::Regular => {
                    let record = execute(self.skip.as_ref(), &step.name, false, step.action).await;
                    let _ = self.settle(record);
                }
            }
        }
        self.finish().await
    }

    fn declare(&mut self, name: &str, deferred: bool) -> Result<(), StageError> {
        if self.declared.insert(name.to_string()) {
            return Ok(());
        }
        error!(stage = name, "Stage name used more than once");
        let mut record = StageRecord::pending(name, deferred);
        record.transition(StageStatus::Failed);
        record.error = Some(StageError::DuplicateName {
            stage: name.to_string(),
        });
        self.settle(record)
    }

    fn settle(&mut self, record: StageRecord) -> Result<(), StageError> {
        let result = match &record.error {
            Some(error) => {
                if self.failure.is_none() {
                    self.failure = Some(error.clone());
                }
                Err(error.clone())
            }
            None => Ok(()),
        };
        self.records.push(record);
        result
    }
}

fn not_run(name: &str, deferred: bool) -> StageRecord {
    let mut record = StageRecord::pending(name, deferred);
    record.transition(StageStatus::NotRun);
    record
}

async fn execute<F, Fut>(skip: &dyn SkipSignal, name: &str, deferred: bool, action: F) -> StageRecord
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let mut record = StageRecord::pending(name, deferred);

    if skip.is_skipped(name) {
        info!(stage = name, "Skipping stage");
        record.transition(StageStatus::Skipped);
        return record;
    }

    info!(stage = name, deferred, "Running stage");
    record.transition(StageStatus::Running);
    record.started_at = Some(Utc::now());
    let timer = SpanTimer::start(name);

    // Calling the action inside the future catches panics raised before
    // its first await too.
    let outcome = AssertUnwindSafe(async move { action().await })
        .catch_unwind()
        .await;
    record.duration_ms = timer.finish();

    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(StageError::Failed {
            stage: name.to_string(),
            message: format!("{e:#}"),
        }),
        Err(payload) => Some(StageError::Panicked {
            stage: name.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    };

    match error {
        None => {
            info!(stage = name, duration_ms = record.duration_ms, "Stage completed");
            record.transition(StageStatus::Completed);
        }
        Some(e) => {
            error!(stage = name, duration_ms = record.duration_ms, error = %e, "Stage failed");
            record.transition(StageStatus::Failed);
            record.error = Some(e);
        }
    }
    record
}
