//! Local multi-container clusters.

use super::command::{run_checked, CommandRunner, CommandSpec};
use crate::errors::CommandError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// A compose project in a directory, started and stopped as a unit.
#[derive(Clone)]
pub struct ComposeProject {
    runner: Arc<dyn CommandRunner>,
    working_dir: PathBuf,
    env: BTreeMap<String, String>,
}

impl std::fmt::Debug for ComposeProject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposeProject")
            .field("working_dir", &self.working_dir)
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

impl ComposeProject {
    /// Creates a project for the compose file in `working_dir`.
    pub fn new(runner: Arc<dyn CommandRunner>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
        }
    }

    /// Sets a variable the compose file can interpolate.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    fn compose<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new("docker")
            .arg("compose")
            .args(args)
            .current_dir(&self.working_dir)
            .envs(self.env.clone())
    }

    /// Starts all services in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the services fail to start.
    pub async fn up(&self) -> Result<(), CommandError> {
        info!(dir = %self.working_dir.display(), "Starting compose project");
        run_checked(self.runner.as_ref(), &self.compose(["up", "-d"])).await?;
        Ok(())
    }

    /// Returns the combined logs of all services.
    ///
    /// # Errors
    ///
    /// Returns an error if the logs cannot be fetched.
    pub async fn logs(&self) -> Result<String, CommandError> {
        let output = run_checked(self.runner.as_ref(), &self.compose(["logs", "--no-color"])).await?;
        Ok(output.stdout)
    }

    /// Stops the services and removes their containers.
    ///
    /// # Errors
    ///
    /// Returns an error if either step fails.
    pub async fn down(&self) -> Result<(), CommandError> {
        info!(dir = %self.working_dir.display(), "Stopping compose project");
        run_checked(self.runner.as_ref(), &self.compose(["down"])).await?;
        run_checked(self.runner.as_ref(), &self.compose(["rm", "-f"])).await?;
        Ok(())
    }
}
