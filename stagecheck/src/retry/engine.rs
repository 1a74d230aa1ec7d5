//! Bounded retry with a fixed, per-call-site sleep interval.
//!
//! Different external conditions (console boot, cluster rebalance,
//! replication lag) have very different expected latencies, so every call
//! site supplies its own [`RetryConfig`]. There is no backoff or jitter.

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cancellation::CancellationToken;
use crate::errors::{ConfigError, RetryError};

/// Configuration for retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, including the first one.
    pub max_attempts: usize,
    /// Sleep between attempts in milliseconds.
    pub sleep_between_ms: u64,
    /// Checked before every attempt when present.
    #[serde(skip)]
    pub cancellation: Option<CancellationToken>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            sleep_between_ms: 5_000,
            cancellation: None,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config with the given attempt bound and sleep interval.
    #[must_use]
    pub fn fixed(max_attempts: usize, sleep_between: Duration) -> Self {
        Self::new()
            .with_max_attempts(max_attempts)
            .with_sleep_between(sleep_between)
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the sleep between attempts.
    #[must_use]
    pub fn with_sleep_between(mut self, sleep: Duration) -> Self {
        self.sleep_between_ms = u64::try_from(sleep.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns the sleep between attempts.
    #[must_use]
    pub fn sleep_between(&self) -> Duration {
        Duration::from_millis(self.sleep_between_ms)
    }

    /// Upper bound on the time spent sleeping if every attempt fails.
    #[must_use]
    pub fn worst_case_wait(&self) -> Duration {
        let sleeps = u32::try_from(self.max_attempts.saturating_sub(1)).unwrap_or(u32::MAX);
        self.sleep_between().saturating_mul(sleeps)
    }
}

/// State tracking for a single retry loop.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Attempts made so far.
    pub attempt: usize,
    last_error: Option<String>,
}

impl RetryState {
    /// Creates a new retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if another attempt is allowed.
    #[must_use]
    pub fn has_attempts_left(&self, config: &RetryConfig) -> bool {
        self.attempt < config.max_attempts
    }

    /// Records a failed attempt, replacing any earlier error.
    pub fn record_failure(&mut self, error: String) {
        self.last_error = Some(error);
    }

    fn into_exhausted(self, description: &str) -> RetryError {
        RetryError::Exhausted {
            description: description.to_string(),
            attempts: self.attempt,
            last_error: self
                .last_error
                .unwrap_or_else(|| "no attempts were made".to_string()),
        }
    }
}

/// A compiled set of error patterns that are known to be transient.
#[derive(Debug, Clone)]
pub struct RetryableErrors {
    patterns: RegexSet,
}

impl RetryableErrors {
    /// Compiles the given regular expressions.
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(|p| p.as_ref().to_string()).collect();
        let set = RegexSet::new(&patterns).map_err(|e| ConfigError::InvalidPattern {
            pattern: patterns.join(" | "),
            reason: e.to_string(),
        })?;
        Ok(Self { patterns: set })
    }

    /// Returns true if the message matches any pattern.
    #[must_use]
    pub fn matches(&self, message: &str) -> bool {
        self.patterns.is_match(message)
    }

    /// Returns the number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns true if there are no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Runs `operation` until it succeeds or `config.max_attempts` attempts fail.
///
/// The first attempt runs immediately. After each failure except the last,
/// the loop sleeps for `config.sleep_between()`. On exhaustion the error of
/// the last attempt is returned; earlier errors are only logged.
pub async fn do_with_retry<T, E, F, Fut>(
    description: &str,
    config: &RetryConfig,
    operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    run_retry_loop(description, config, |_| true, operation).await
}

/// Like [`do_with_retry`], but only errors matching `retryable` are retried.
///
/// Any other error aborts the loop immediately with [`RetryError::Fatal`].
pub async fn do_with_retryable_errors<T, E, F, Fut>(
    description: &str,
    retryable: &RetryableErrors,
    config: &RetryConfig,
    operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    run_retry_loop(description, config, |message| retryable.matches(message), operation).await
}

async fn run_retry_loop<T, E, F, Fut, C>(
    description: &str,
    config: &RetryConfig,
    is_retryable: C,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    C: Fn(&str) -> bool,
{
    let mut state = RetryState::new();

    while state.has_attempts_left(config) {
        if let Some(token) = config.cancellation.as_ref().filter(|t| t.is_cancelled()) {
            return Err(RetryError::Cancelled {
                description: description.to_string(),
                attempts: state.attempt,
                reason: token.reason().unwrap_or_default(),
            });
        }

        state.attempt += 1;
        debug!(description, attempt = state.attempt, max_attempts = config.max_attempts, "Attempting");

        match operation().await {
            Ok(value) => {
                if state.attempt > 1 {
                    info!(description, attempts = state.attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) => {
                let message = e.to_string();
                if !is_retryable(&message) {
                    warn!(description, attempt = state.attempt, error = %message, "Non-retryable error");
                    return Err(RetryError::Fatal {
                        description: description.to_string(),
                        attempt: state.attempt,
                        error: message,
                    });
                }

                warn!(
                    description,
                    attempt = state.attempt,
                    max_attempts = config.max_attempts,
                    error = %message,
                    "Attempt failed"
                );
                state.record_failure(message);

                if state.has_attempts_left(config) {
                    pause(config).await;
                }
            }
        }
    }

    Err(state.into_exhausted(description))
}

async fn pause(config: &RetryConfig) {
    let delay = config.sleep_between();
    if delay.is_zero() {
        return;
    }
    debug!(delay_ms = config.sleep_between_ms, "Sleeping before next attempt");
    match &config.cancellation {
        Some(token) => {
            token.sleep(delay).await;
        }
        None => tokio::time::sleep(delay).await,
    }
}
