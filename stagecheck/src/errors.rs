//! Error types for the stagecheck harness.
//!
//! Every component owns a narrow error enum; [`StagecheckError`] aggregates
//! them for drivers that want a single error type.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for stagecheck operations.
#[derive(Debug, Error)]
pub enum StagecheckError {
    /// A retried operation did not succeed.
    #[error("{0}")]
    Retry(#[from] RetryError),

    /// Persisted state could not be read or written.
    #[error("{0}")]
    State(#[from] StateError),

    /// A deduplicated build failed.
    #[error("{0}")]
    Build(#[from] BuildError),

    /// A stage failed.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// An HTTP request failed at the transport level.
    #[error("{0}")]
    Http(#[from] HttpError),

    /// An external command failed.
    #[error("{0}")]
    Command(#[from] CommandError),

    /// Configuration was invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A fanned-out task failed.
    #[error("{0}")]
    Task(#[from] TaskError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal outcome of the retry engine.
#[derive(Debug, Clone, Error)]
pub enum RetryError {
    /// Every attempt failed; only the last error is kept.
    #[error("'{description}' unsuccessful after {attempts} attempts: {last_error}")]
    Exhausted {
        /// What was being retried.
        description: String,
        /// How many attempts were made.
        attempts: usize,
        /// The error from the final attempt.
        last_error: String,
    },

    /// An attempt failed with an error that is not known to be transient.
    #[error("'{description}' failed on attempt {attempt} with a non-retryable error: {error}")]
    Fatal {
        /// What was being retried.
        description: String,
        /// The attempt that produced the error (1-indexed).
        attempt: usize,
        /// The error message.
        error: String,
    },

    /// The retry loop observed a cancelled token before an attempt.
    #[error("'{description}' cancelled after {attempts} attempts: {reason}")]
    Cancelled {
        /// What was being retried.
        description: String,
        /// Attempts made before cancellation.
        attempts: usize,
        /// The cancellation reason.
        reason: String,
    },
}

impl RetryError {
    /// Returns the number of attempts that were made.
    #[must_use]
    pub fn attempts(&self) -> usize {
        match self {
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
            Self::Fatal { attempt, .. } => *attempt,
        }
    }

    /// Returns the description of the retried operation.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::Exhausted { description, .. }
            | Self::Fatal { description, .. }
            | Self::Cancelled { description, .. } => description,
        }
    }
}

/// Errors from the persisted state store.
#[derive(Debug, Error)]
pub enum StateError {
    /// The key was never saved, or was already cleaned up.
    #[error("no saved value for key '{key}' in {}", .namespace.display())]
    NotFound {
        /// The namespace (test folder) that was searched.
        namespace: PathBuf,
        /// The missing key.
        key: String,
    },

    /// The key cannot be used as a file name.
    #[error("invalid state key '{key}': {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Filesystem failure while touching a key.
    #[error("IO error for state key '{key}': {source}")]
    Io {
        /// The key being accessed.
        key: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The stored value could not be encoded or decoded.
    #[error("serialization error for state key '{key}': {source}")]
    Serialization {
        /// The key being accessed.
        key: String,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl StateError {
    /// Returns true if the error means the key does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A recorded build failure, replayed verbatim to every caller of the key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The build action failed (after any retries).
    #[error("build for '{key}' failed: {message}")]
    Failed {
        /// The dedup key.
        key: String,
        /// The rendered error.
        message: String,
    },

    /// The dedup worker is no longer running.
    #[error("build worker is not running; request for '{key}' was dropped")]
    WorkerGone {
        /// The dedup key.
        key: String,
    },
}

/// Errors raised by the stage runner.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// The stage action returned an error.
    #[error("stage '{stage}' failed: {message}")]
    Failed {
        /// The stage name.
        stage: String,
        /// The rendered error chain.
        message: String,
    },

    /// The stage action panicked.
    #[error("stage '{stage}' panicked: {message}")]
    Panicked {
        /// The stage name.
        stage: String,
        /// The panic payload, if printable.
        message: String,
    },

    /// A stage name was used twice in one run.
    #[error("stage '{stage}' is declared more than once in this run")]
    DuplicateName {
        /// The repeated stage name.
        stage: String,
    },
}

impl StageError {
    /// Returns the name of the failed stage.
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            Self::Failed { stage, .. }
            | Self::Panicked { stage, .. }
            | Self::DuplicateName { stage } => stage,
        }
    }
}

/// Failure of a task spawned by a task group, captured as data.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The task returned an error.
    #[error("task '{task}' failed: {message}")]
    Failed {
        /// The task name.
        task: String,
        /// The rendered error chain.
        message: String,
    },

    /// The task panicked or was aborted.
    #[error("task '{task}' did not complete: {message}")]
    Aborted {
        /// The task name.
        task: String,
        /// The panic payload or abort reason.
        message: String,
    },
}

/// Transport-level HTTP errors (connection refused, timeout, bad URL).
#[derive(Debug, Clone, Error)]
#[error("HTTP {method} {url} failed: {message}")]
pub struct HttpError {
    /// The HTTP method.
    pub method: String,
    /// The request URL.
    pub url: String,
    /// The rendered transport error.
    pub message: String,
}

impl HttpError {
    /// Creates a new HTTP error.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Errors from running external tools.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process could not be started.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// The program name.
        program: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully.
    #[error(
        "'{program}' exited with {}: {}",
        .exit_code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")),
        join_output(.stderr, .stdout_tail)
    )]
    NonZeroExit {
        /// The program name.
        program: String,
        /// Exit code, if the process was not killed by a signal.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
        /// Last lines of standard output. Machine-readable tools report
        /// their errors there.
        stdout_tail: String,
    },

    /// The process output did not contain what was expected.
    #[error("could not parse output of '{program}': {message}")]
    UnexpectedOutput {
        /// The program name.
        program: String,
        /// What was missing.
        message: String,
    },
}

fn join_output(stderr: &str, stdout_tail: &str) -> String {
    match (stderr.trim(), stdout_tail.trim()) {
        (err, "") => err.to_string(),
        ("", out) => out.to_string(),
        (err, out) => format!("{err}\n{out}"),
    }
}

/// Configuration and usage errors.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A value could not be parsed.
    #[error("invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        /// The setting or variable name.
        name: String,
        /// The raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A provisioning variable name is not allowed.
    #[error("invalid variable name '{0}'")]
    InvalidVariable(String),

    /// A required variable or output is missing.
    #[error("missing required value: {0}")]
    Missing(String),

    /// A regular expression did not compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern text.
        pattern: String,
        /// The compile error.
        reason: String,
    },
}

/// Convenience result alias.
pub type Result<T, E = StagecheckError> = std::result::Result<T, E>;
