//! Applying and destroying infrastructure definitions.

use super::command::{run_checked, CommandRunner, CommandSpec};
use super::options::ProvisionOptions;
use crate::errors::CommandError;
use std::sync::Arc;
use tracing::info;

const TERRAFORM: &str = "terraform";

/// Drives the infrastructure tool for a set of [`ProvisionOptions`].
#[derive(Clone)]
pub struct Provisioner {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    /// Creates a provisioner that runs `terraform`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            program: TERRAFORM.to_string(),
        }
    }

    /// Uses a different executable, such as a wrapper script.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn base(&self, options: &ProvisionOptions) -> CommandSpec {
        CommandSpec::new(&self.program)
            .current_dir(options.working_dir())
            .envs(options.env.clone())
    }

    /// Initializes the working directory and applies the definitions.
    ///
    /// # Errors
    ///
    /// Returns an error if either step fails.
    pub async fn init_and_apply(&self, options: &ProvisionOptions) -> Result<String, CommandError> {
        info!(dir = %options.working_dir().display(), "Applying infrastructure");

        let init = self.base(options).args(["init", "-input=false", "-no-color"]);
        run_checked(self.runner.as_ref(), &init).await?;

        let apply = self
            .base(options)
            .args(["apply", "-input=false", "-auto-approve", "-no-color"])
            .args(options.var_args())
            .args(options.target_args());
        let output = run_checked(self.runner.as_ref(), &apply).await?;
        Ok(output.stdout)
    }

    /// Destroys everything the definitions created.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool fails.
    pub async fn destroy(&self, options: &ProvisionOptions) -> Result<String, CommandError> {
        info!(dir = %options.working_dir().display(), "Destroying infrastructure");

        let destroy = self
            .base(options)
            .args(["destroy", "-input=false", "-auto-approve", "-no-color"])
            .args(options.var_args())
            .args(options.target_args());
        let output = run_checked(self.runner.as_ref(), &destroy).await?;
        Ok(output.stdout)
    }

    /// Reads an output value, failing if it is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool fails or the output is empty.
    pub async fn output_required(&self, options: &ProvisionOptions, name: &str) -> Result<String, CommandError> {
        let spec = self.base(options).args(["output", "-no-color", "-raw", name]);
        let output = run_checked(self.runner.as_ref(), &spec).await?;

        let value = output.stdout.trim().trim_matches('"');
        if value.is_empty() {
            return Err(CommandError::UnexpectedOutput {
                program: self.program.clone(),
                message: format!("output '{name}' is empty"),
            });
        }
        Ok(value.to_string())
    }
}
