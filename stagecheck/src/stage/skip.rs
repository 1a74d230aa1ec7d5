//! Deciding whether a stage is suppressed.

use std::collections::HashSet;

/// Default prefix of the per-stage skip environment variables.
pub const DEFAULT_SKIP_PREFIX: &str = "SKIP_";

/// External signal consulted once per stage.
pub trait SkipSignal: Send + Sync {
    /// Returns true if the stage named `stage` must not run.
    fn is_skipped(&self, stage: &str) -> bool;
}

/// Skips a stage when `<prefix><stage>` is set to a non-empty value.
///
/// With the default prefix, `SKIP_validate=true` skips the `validate`
/// stage. The variable is read every time, so a driver may toggle it.
#[derive(Debug, Clone)]
pub struct EnvSkipSignal {
    prefix: String,
}

impl Default for EnvSkipSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvSkipSignal {
    /// Creates a signal using [`DEFAULT_SKIP_PREFIX`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_SKIP_PREFIX)
    }

    /// Creates a signal using a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns the variable consulted for `stage`.
    #[must_use]
    pub fn variable_for(&self, stage: &str) -> String {
        format!("{}{stage}", self.prefix)
    }
}

impl SkipSignal for EnvSkipSignal {
    fn is_skipped(&self, stage: &str) -> bool {
        std::env::var_os(self.variable_for(stage)).is_some_and(|v| !v.is_empty())
    }
}

/// A fixed set of skipped stages.
#[derive(Debug, Clone, Default)]
pub struct StaticSkipSignal {
    skipped: HashSet<String>,
}

impl StaticSkipSignal {
    /// Creates a signal that skips nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stage to skip.
    #[must_use]
    pub fn skip(mut self, stage: impl Into<String>) -> Self {
        self.skipped.insert(stage.into());
        self
    }
}

impl<S: Into<String>> FromIterator<S> for StaticSkipSignal {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            skipped: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl SkipSignal for StaticSkipSignal {
    fn is_skipped(&self, stage: &str) -> bool {
        self.skipped.contains(stage)
    }
}
