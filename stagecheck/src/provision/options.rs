//! Typed options for provisioning a deployment.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Returns true if `name` is usable as an infrastructure variable name.
///
/// Names start with a letter or underscore and continue with letters,
/// digits, underscores or dashes.
#[must_use]
pub fn is_valid_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    }
}

/// Everything needed to apply, query and destroy one deployment.
///
/// Saved between stages so that a later invocation can validate or tear
/// down exactly what an earlier one created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionOptions {
    /// Directory holding the infrastructure definitions.
    pub working_dir: PathBuf,
    #[serde(default)]
    vars: BTreeMap<String, Value>,
    /// Extra environment for the provisioning tool.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Restricts apply and destroy to these resource addresses.
    #[serde(default)]
    pub targets: Vec<String>,
}

impl ProvisionOptions {
    /// Creates options for the definitions in `working_dir`.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            vars: BTreeMap::new(),
            env: BTreeMap::new(),
            targets: Vec::new(),
        }
    }

    /// Sets an input variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidVariable`] if `name` is not a valid
    /// variable name.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<Self, ConfigError> {
        self.set_var(name, value)?;
        Ok(self)
    }

    /// Sets an input variable in place.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidVariable`] if `name` is not a valid
    /// variable name.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<(), ConfigError> {
        let name = name.into();
        if !is_valid_var_name(&name) {
            return Err(ConfigError::InvalidVariable(name));
        }
        self.vars.insert(name, value.into());
        Ok(())
    }

    /// Sets an environment variable for the provisioning tool.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Adds a resource address to restrict apply and destroy to.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Returns the working directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Returns a variable's value.
    #[must_use]
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Returns all variables, sorted by name.
    #[must_use]
    pub fn vars(&self) -> &BTreeMap<String, Value> {
        &self.vars
    }

    /// Renders variables as `-var name=value` argument pairs.
    ///
    /// Strings are passed raw; everything else is rendered as JSON, which
    /// the provisioning tool accepts for numbers, booleans, lists and maps.
    #[must_use]
    pub fn var_args(&self) -> Vec<String> {
        self.vars
            .iter()
            .flat_map(|(name, value)| ["-var".to_string(), format!("{name}={}", render_value(value))])
            .collect()
    }

    /// Renders targets as `-target=<address>` arguments.
    #[must_use]
    pub fn target_args(&self) -> Vec<String> {
        self.targets.iter().map(|t| format!("-target={t}")).collect()
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_var_name_validation() {
        for good in ["ami_id", "_private", "cluster-name", "A1"] {
            assert!(is_valid_var_name(good), "{good}");
        }
        for bad in ["", "1abc", "-x", "has space", "a=b", "é"] {
            assert!(!is_valid_var_name(bad), "{bad}");
        }
    }

    #[test]
    fn test_invalid_var_rejected() {
        let err = ProvisionOptions::new("/tf").with_var("bad name", "x").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVariable(name) if name == "bad name"));
    }

    #[test]
    fn test_var_args_render_types() {
        let options = ProvisionOptions::new("/tf")
            .with_var("ami_id", "ami-123")
            .unwrap()
            .with_var("cluster_size", 3)
            .unwrap()
            .with_var("zones", json!(["a", "b"]))
            .unwrap()
            .with_var("enabled", true)
            .unwrap();

        assert_eq!(
            options.var_args(),
            vec![
                "-var",
                "ami_id=ami-123",
                "-var",
                "cluster_size=3",
                "-var",
                "enabled=true",
                "-var",
                r#"zones=["a","b"]"#,
            ]
        );
    }

    #[test]
    fn test_targets_and_accessors() {
        let options = ProvisionOptions::new("/tf")
            .with_target("module.couchbase")
            .with_env("AWS_DEFAULT_REGION", "eu-west-1");
        assert_eq!(options.target_args(), vec!["-target=module.couchbase"]);
        assert_eq!(options.working_dir(), Path::new("/tf"));
        assert_eq!(options.env.get("AWS_DEFAULT_REGION").map(String::as_str), Some("eu-west-1"));
        assert_eq!(options.var("missing"), None);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let options: ProvisionOptions = serde_json::from_str(r#"{"working_dir": "/tf"}"#).unwrap();
        assert_eq!(options, ProvisionOptions::new("/tf"));
    }
}
