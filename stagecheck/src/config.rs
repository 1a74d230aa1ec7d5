//! Harness-wide configuration.

use crate::errors::ConfigError;
use crate::retry::RetryConfig;
use crate::stage::DEFAULT_SKIP_PREFIX;
use crate::state::DEFAULT_STATE_DIR;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding [`HarnessConfig::http_timeout_seconds`].
pub const ENV_HTTP_TIMEOUT: &str = "STAGECHECK_HTTP_TIMEOUT_SECS";
/// Environment variable overriding [`HarnessConfig::skip_env_prefix`].
pub const ENV_SKIP_PREFIX: &str = "STAGECHECK_SKIP_PREFIX";
/// Environment variable overriding [`HarnessConfig::state_dir_name`].
pub const ENV_STATE_DIR: &str = "STAGECHECK_STATE_DIR";

/// Settings shared by the components of one test harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Prefix of the per-stage skip variables.
    #[serde(default = "default_skip_prefix")]
    pub skip_env_prefix: String,
    /// Directory inside each test folder that holds persisted values.
    #[serde(default = "default_state_dir")]
    pub state_dir_name: String,
    /// Client-side timeout for every HTTP request, in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: f64,
    /// Retry policy around image builds.
    #[serde(default = "default_build_retry")]
    pub build_retry: RetryConfig,
}

fn default_skip_prefix() -> String {
    DEFAULT_SKIP_PREFIX.to_string()
}

fn default_state_dir() -> String {
    DEFAULT_STATE_DIR.to_string()
}

fn default_http_timeout() -> f64 {
    10.0
}

fn default_build_retry() -> RetryConfig {
    RetryConfig::fixed(3, Duration::from_secs(30))
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            skip_env_prefix: default_skip_prefix(),
            state_dir_name: default_state_dir(),
            http_timeout_seconds: default_http_timeout(),
            build_retry: default_build_retry(),
        }
    }
}

impl HarnessConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from defaults overlaid with environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(ENV_HTTP_TIMEOUT) {
            config.http_timeout_seconds = parse_timeout(&raw)?;
        }
        if let Ok(prefix) = std::env::var(ENV_SKIP_PREFIX) {
            config.skip_env_prefix = prefix;
        }
        if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
            config = config.with_state_dir_name(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the skip variable prefix.
    #[must_use]
    pub fn with_skip_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.skip_env_prefix = prefix.into();
        self
    }

    /// Sets the state directory name.
    #[must_use]
    pub fn with_state_dir_name(mut self, name: impl Into<String>) -> Self {
        self.state_dir_name = name.into();
        self
    }

    /// Sets the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Sets the build retry policy.
    #[must_use]
    pub fn with_build_retry(mut self, retry: RetryConfig) -> Self {
        self.build_retry = retry;
        self
    }

    /// Returns the HTTP timeout as a duration.
    ///
    /// Values that are not a representable number of seconds fall back to
    /// the default timeout.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.http_timeout_seconds)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_http_timeout()))
    }

    /// Checks the values for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.http_timeout_seconds.is_finite() || self.http_timeout_seconds <= 0.0 {
            return Err(ConfigError::InvalidValue {
                name: "http_timeout_seconds".to_string(),
                value: self.http_timeout_seconds.to_string(),
                reason: "must be a positive number of seconds".to_string(),
            });
        }
        if self.state_dir_name.is_empty() || self.state_dir_name.contains(['/', '\\']) {
            return Err(ConfigError::InvalidValue {
                name: "state_dir_name".to_string(),
                value: self.state_dir_name.clone(),
                reason: "must be a single directory name".to_string(),
            });
        }
        Ok(())
    }

    /// Builds the persisted state store for this configuration.
    #[must_use]
    pub fn state_store(&self) -> crate::state::FileStateStore {
        crate::state::FileStateStore::new().with_state_dir(self.state_dir_name.clone())
    }

    /// Builds an HTTP client with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the client
    /// cannot be built.
    #[cfg(feature = "http")]
    pub fn http_client(&self) -> Result<crate::retry::ReqwestHttpClient, crate::StagecheckError> {
        self.validate()?;
        Ok(crate::retry::ReqwestHttpClient::new(self.http_timeout())?)
    }

    /// Builds a deduplicator configuration with this build retry policy.
    #[must_use]
    pub fn dedup_config(&self) -> crate::dedup::DedupConfig {
        crate::dedup::DedupConfig::default().with_retry(self.build_retry.clone())
    }
}

fn parse_timeout(raw: &str) -> Result<f64, ConfigError> {
    raw.trim().parse::<f64>().map_err(|e| ConfigError::InvalidValue {
        name: ENV_HTTP_TIMEOUT.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::path::Path;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.skip_env_prefix, "SKIP_");
        assert_eq!(config.state_dir_name, ".test-data");
        assert_eq!(config.http_timeout(), Duration::from_secs(10));
        assert_eq!(config.build_retry.max_attempts, 3);
        assert_eq!(config.build_retry.sleep_between(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: HarnessConfig = serde_json::from_str(r#"{"http_timeout_seconds": 2.5}"#).unwrap();
        assert_eq!(config.http_timeout(), Duration::from_millis(2500));
        assert_eq!(config.skip_env_prefix, "SKIP_");
    }

    #[test]
    fn test_builder() {
        let config = HarnessConfig::new()
            .with_skip_env_prefix("CI_SKIP_")
            .with_state_dir_name("state")
            .with_http_timeout(Duration::from_secs(3))
            .with_build_retry(RetryConfig::fixed(5, Duration::from_secs(1)));

        assert_eq!(config.skip_env_prefix, "CI_SKIP_");
        assert_eq!(config.build_retry.max_attempts, 5);
        assert_eq!(config.dedup_config().retry.max_attempts, 5);
        assert_eq!(
            config.state_store().path_for(Path::new("/t"), "AmiId"),
            Path::new("/t/state/AmiId.json")
        );
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_http_client_builds() {
        assert!(HarnessConfig::default().http_client().is_ok());
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_http_client_rejects_invalid_timeout() {
        let mut config = HarnessConfig::default();
        config.http_timeout_seconds = f64::INFINITY;
        assert!(matches!(
            config.http_client(),
            Err(crate::StagecheckError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_http_timeout_never_panics() {
        for bad in [f64::INFINITY, f64::NAN, -1.0, f64::MAX] {
            let mut config = HarnessConfig::default();
            config.http_timeout_seconds = bad;
            assert_eq!(config.http_timeout(), Duration::from_secs(10));
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(HarnessConfig::new().with_http_timeout(Duration::ZERO).validate().is_err());
        assert!(HarnessConfig::new().with_state_dir_name("a/b").validate().is_err());
        assert!(HarnessConfig::new().with_state_dir_name("").validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        temp_env::with_vars(
            [
                (ENV_HTTP_TIMEOUT, Some("30")),
                (ENV_SKIP_PREFIX, Some("CI_SKIP_")),
                (ENV_STATE_DIR, Some(".state")),
            ],
            || {
                let config = HarnessConfig::from_env().unwrap();
                assert_eq!(config.http_timeout(), Duration::from_secs(30));
                assert_eq!(config.skip_env_prefix, "CI_SKIP_");
                assert_eq!(config.state_dir_name, ".state");
            },
        );
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_malformed_timeout() {
        temp_env::with_var(ENV_HTTP_TIMEOUT, Some("soon"), || {
            let err = HarnessConfig::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref value, .. } if value == "soon"));
        });
    }

    #[test]
    #[serial]
    fn test_from_env_without_overrides_is_default() {
        temp_env::with_vars_unset([ENV_HTTP_TIMEOUT, ENV_SKIP_PREFIX, ENV_STATE_DIR], || {
            let config = HarnessConfig::from_env().unwrap();
            assert_eq!(config.state_dir_name, DEFAULT_STATE_DIR);
        });
    }
}
