//! The single build worker and its request handle.

use crate::errors::{BuildError, ConfigError};
use crate::retry::{do_with_retry, do_with_retryable_errors, RetryConfig, RetryableErrors};
use crate::utils::panic_message;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

const INTAKE_CAPACITY: usize = 64;

fn default_retryable_errors() -> Vec<String> {
    vec![
        "(?i)error uploading".to_string(),
        "(?i)connection reset".to_string(),
        "(?i)i/o timeout".to_string(),
        "RequestLimitExceeded".to_string(),
    ]
}

/// Configuration for the build worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Retry policy wrapped around every build action.
    #[serde(default = "default_build_retry")]
    pub retry: RetryConfig,
    /// Error message patterns treated as transient. An empty list retries
    /// every error.
    #[serde(default = "default_retryable_errors")]
    pub retryable_errors: Vec<String>,
}

fn default_build_retry() -> RetryConfig {
    RetryConfig::fixed(3, Duration::from_secs(30))
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retry: default_build_retry(),
            retryable_errors: default_retryable_errors(),
        }
    }
}

impl DedupConfig {
    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the transient error patterns.
    #[must_use]
    pub fn with_retryable_errors<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_errors = patterns.into_iter().map(Into::into).collect();
        self
    }
}

type BuildAction<T> = Box<dyn FnMut() -> BoxFuture<'static, anyhow::Result<T>> + Send>;
type BuildOutcome<T> = Result<T, BuildError>;

enum Request<T> {
    Build {
        key: String,
        action: BuildAction<T>,
        reply: oneshot::Sender<BuildOutcome<T>>,
    },
    Outcome {
        key: String,
        reply: oneshot::Sender<Option<BuildOutcome<T>>>,
    },
}

/// Handle to a build worker that runs each keyed build at most once.
///
/// The worker drains requests one at a time, so builds never overlap.
/// A request for a key that already has an outcome gets that outcome
/// replayed without running its action. Handles are cheap to clone; the
/// worker exits once every handle is dropped.
pub struct BuildDeduplicator<T> {
    intake: mpsc::Sender<Request<T>>,
}

impl<T> Clone for BuildDeduplicator<T> {
    fn clone(&self) -> Self {
        Self {
            intake: self.intake.clone(),
        }
    }
}

impl<T> std::fmt::Debug for BuildDeduplicator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildDeduplicator")
            .field("worker_running", &!self.intake.is_closed())
            .finish()
    }
}

impl<T> BuildDeduplicator<T>
where
    T: Clone + Send + 'static,
{
    /// Starts the worker on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if a retryable error pattern does not compile.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(config: DedupConfig) -> Result<Self, ConfigError> {
        let retryable = RetryableErrors::new(&config.retryable_errors)?;
        let (intake, requests) = mpsc::channel(INTAKE_CAPACITY);

        let worker = Worker {
            retry: config.retry,
            retryable,
            outcomes: HashMap::new(),
        };
        tokio::spawn(worker.run(requests));

        Ok(Self { intake })
    }

    /// Requests the build for `key`, running `action` only if no build for
    /// `key` has been requested before.
    ///
    /// Build failures come back as [`BuildError::Failed`]; the caller decides
    /// whether that is fatal.
    ///
    /// # Errors
    ///
    /// Returns the recorded build error, or [`BuildError::WorkerGone`] if
    /// the worker is no longer running.
    pub async fn request_build<F, Fut>(&self, key: impl Into<String>, mut action: F) -> BuildOutcome<T>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let key = key.into();
        let (reply, response) = oneshot::channel();

        let action: BuildAction<T> = Box::new(move || {
            // The closure itself may panic before handing back a future.
            match std::panic::catch_unwind(AssertUnwindSafe(&mut action)) {
                Ok(attempt) => AssertUnwindSafe(attempt)
                    .catch_unwind()
                    .map(|outcome| outcome.unwrap_or_else(|payload| Err(panicked(payload.as_ref()))))
                    .boxed(),
                Err(payload) => futures::future::ready(Err(panicked(payload.as_ref()))).boxed(),
            }
        });

        let request = Request::Build {
            key: key.clone(),
            action,
            reply,
        };
        if self.intake.send(request).await.is_err() {
            return Err(BuildError::WorkerGone { key });
        }
        response.await.unwrap_or(Err(BuildError::WorkerGone { key }))
    }

    /// Returns the recorded outcome for `key` without triggering a build.
    ///
    /// A build still queued behind others has no outcome yet.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::WorkerGone`] if the worker is no longer running.
    pub async fn outcome(&self, key: impl Into<String>) -> Result<Option<BuildOutcome<T>>, BuildError> {
        let key = key.into();
        let (reply, response) = oneshot::channel();

        let request = Request::Outcome {
            key: key.clone(),
            reply,
        };
        if self.intake.send(request).await.is_err() {
            return Err(BuildError::WorkerGone { key });
        }
        response.await.map_err(|_| BuildError::WorkerGone { key })
    }
}

fn panicked(payload: &(dyn std::any::Any + Send)) -> anyhow::Error {
    anyhow::anyhow!("build action panicked: {}", panic_message(payload))
}

struct Worker<T> {
    retry: RetryConfig,
    retryable: RetryableErrors,
    outcomes: HashMap<String, BuildOutcome<T>>,
}

impl<T> Worker<T>
where
    T: Clone + Send + 'static,
{
    async fn run(mut self, mut requests: mpsc::Receiver<Request<T>>) {
        debug!("Build worker started");

        while let Some(request) = requests.recv().await {
            match request {
                Request::Build { key, action, reply } => {
                    let outcome = match self.outcomes.get(&key) {
                        Some(recorded) => {
                            debug!(key = %key, "Replaying recorded build outcome");
                            recorded.clone()
                        }
                        None => {
                            let outcome = build(&self.retry, &self.retryable, &key, action).await;
                            self.outcomes.insert(key.clone(), outcome.clone());
                            outcome
                        }
                    };
                    // The caller may have given up waiting; the outcome stays recorded.
                    let _ = reply.send(outcome);
                }
                Request::Outcome { key, reply } => {
                    let _ = reply.send(self.outcomes.get(&key).cloned());
                }
            }
        }

        debug!(builds = self.outcomes.len(), "Build worker stopped");
    }
}

async fn build<T>(
    retry: &RetryConfig,
    retryable: &RetryableErrors,
    key: &str,
    mut action: BuildAction<T>,
) -> BuildOutcome<T> {
    let description = format!("build {key}");
    info!(key, "Starting build");

    let result = if retryable.is_empty() {
        do_with_retry(&description, retry, || action()).await
    } else {
        do_with_retryable_errors(&description, retryable, retry, || action()).await
    };

    match result {
        Ok(artifact) => {
            info!(key, "Build completed");
            Ok(artifact)
        }
        Err(e) => {
            error!(key, error = %e, "Build failed");
            Err(BuildError::Failed {
                key: key.to_string(),
                message: e.to_string(),
            })
        }
    }
}
