//! Fan-out and fan-in of provisioning work.
//!
//! A driver may build several images or clusters at once. Each task's
//! error is captured as a [`TaskOutcome`] and only escalated by the
//! caller once every task has finished.

use crate::errors::TaskError;
use crate::utils::panic_message;
use std::future::Future;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

/// The result of one task in a [`TaskGroup`].
#[derive(Debug)]
pub struct TaskOutcome<T> {
    /// The name given at spawn time.
    pub name: String,
    /// The value, or the captured failure.
    pub result: Result<T, TaskError>,
}

impl<T> TaskOutcome<T> {
    /// Returns true if the task produced a value.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Turns the captured outcome back into a `Result` for escalation.
    pub fn into_result(self) -> Result<T, TaskError> {
        self.result
    }
}

/// A set of named tasks joined together.
pub struct TaskGroup<T> {
    handles: Vec<(String, JoinHandle<anyhow::Result<T>>)>,
}

impl<T: Send + 'static> TaskGroup<T> {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Spawns a task on the current tokio runtime.
    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let name = name.into();
        debug!(task = %name, "Spawning task");
        self.handles.push((name, tokio::spawn(task)));
    }

    /// Returns the number of spawned tasks.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if nothing was spawned.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every task and returns their outcomes in spawn order.
    ///
    /// A failing task never stops the others.
    pub async fn join(self) -> Vec<TaskOutcome<T>> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        for (name, handle) in self.handles {
            let result = match handle.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(TaskError::Failed {
                    task: name.clone(),
                    message: format!("{e:#}"),
                }),
                Err(join_error) => Err(aborted(&name, join_error)),
            };
            if let Err(e) = &result {
                warn!(task = %name, error = %e, "Task failed");
            }
            outcomes.push(TaskOutcome { name, result });
        }
        outcomes
    }

    /// Waits for every task, then returns all values or the first failure
    /// in spawn order.
    pub async fn try_join(self) -> Result<Vec<T>, TaskError> {
        self.join()
            .await
            .into_iter()
            .map(TaskOutcome::into_result)
            .collect()
    }
}

impl<T: Send + 'static> Default for TaskGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TaskGroup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.handles.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("TaskGroup").field("tasks", &names).finish()
    }
}

fn aborted(name: &str, join_error: JoinError) -> TaskError {
    let message = if join_error.is_panic() {
        panic_message(join_error.into_panic().as_ref())
    } else {
        "task was cancelled".to_string()
    };
    TaskError::Aborted {
        task: name.to_string(),
        message,
    }
}
