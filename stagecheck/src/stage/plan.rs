//! Declarative stage sequences.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;

/// A stage action, boxed so regular and deferred stages can share a list.
pub(crate) type StageAction<'a> = Box<dyn FnOnce() -> BoxFuture<'a, anyhow::Result<()>> + Send + 'a>;

pub(crate) fn boxed_action<'a, F, Fut>(action: F) -> StageAction<'a>
where
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'a,
{
    Box::new(move || action().boxed())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepKind {
    Regular,
    Deferred,
}

pub(crate) struct PlannedStage<'a> {
    pub(crate) name: String,
    pub(crate) kind: StepKind,
    pub(crate) action: StageAction<'a>,
}

/// Stages in source order, with `defer` semantics for cleanup.
///
/// Regular stages run in order until one fails. A deferred stage is
/// registered when the plan reaches it and runs during unwinding, last
/// registered first, whether or not a later stage failed.
///
/// ```no_run
/// use stagecheck::stage::{StagePlan, StageRunner};
///
/// # async fn demo() {
/// let plan = StagePlan::new()
///     .defer("teardown", || async { Ok(()) })
///     .stage("setup", || async { Ok(()) })
///     .stage("validate", || async { Ok(()) });
/// let report = StageRunner::new().run(plan).await;
/// assert!(report.is_success());
/// # }
/// ```
#[derive(Default)]
pub struct StagePlan<'a> {
    pub(crate) steps: Vec<PlannedStage<'a>>,
}

impl std::fmt::Debug for StagePlan<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|s| (&s.name, s.kind)))
            .finish()
    }
}

impl<'a> StagePlan<'a> {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Appends a regular stage.
    #[must_use]
    pub fn stage<F, Fut>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'a,
    {
        self.steps.push(PlannedStage {
            name: name.into(),
            kind: StepKind::Regular,
            action: boxed_action(action),
        });
        self
    }

    /// Appends a deferred stage.
    #[must_use]
    pub fn defer<F, Fut>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'a,
    {
        self.steps.push(PlannedStage {
            name: name.into(),
            kind: StepKind::Deferred,
            action: boxed_action(action),
        });
        self
    }

    /// Returns the number of declared stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no stage was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the declared stage names in source order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}
