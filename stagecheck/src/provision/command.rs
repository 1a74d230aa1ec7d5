//! Running external tools.

use crate::errors::CommandError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

/// A command line to run, with its directory and extra environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute, looked up on `PATH`.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory; the current one when `None`.
    pub working_dir: Option<PathBuf>,
    /// Variables added to the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    /// Creates a spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds environment variables.
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Creates a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Creates a failed output with the given exit code and stderr.
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Replaces the captured stdout.
    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Returns true if the command exited with status zero.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs external commands.
///
/// Returns the captured output for any exit status; only a failure to
/// start the process is an error. Use [`run_checked`] to also reject
/// non-zero exits.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `spec` to completion.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Runs `spec` and turns a non-zero exit into [`CommandError::NonZeroExit`].
///
/// # Errors
///
/// Returns an error if the command cannot start or exits unsuccessfully.
pub async fn run_checked(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
    let output = runner.run(spec).await?;
    if output.is_success() {
        Ok(output)
    } else {
        Err(CommandError::NonZeroExit {
            program: spec.program.clone(),
            exit_code: output.exit_code,
            stdout_tail: tail_lines(&output.stdout, STDOUT_TAIL_LINES),
            stderr: output.stderr,
        })
    }
}

const STDOUT_TAIL_LINES: usize = 20;

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(count)..].join("\n")
}

/// Runs commands as local child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessCommandRunner;

impl ProcessCommandRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        info!(command = %spec, dir = ?spec.working_dir, "Running command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|source| CommandError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if result.is_success() {
            debug!(command = %spec, "Command succeeded");
        } else {
            warn!(command = %spec, exit_code = ?result.exit_code, "Command failed");
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_spec_builder_and_display() {
        let spec = CommandSpec::new("packer")
            .arg("build")
            .args(["-machine-readable", "template.json"])
            .current_dir("/work")
            .envs([("PACKER_LOG", "1")]);

        assert_eq!(spec.to_string(), "packer build -machine-readable template.json");
        assert_eq!(spec.working_dir, Some(PathBuf::from("/work")));
        assert_eq!(spec.env.get("PACKER_LOG").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_run_checked_rejects_non_zero_exit() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|spec| spec.program == "terraform")
            .times(1)
            .returning(|_| Ok(CommandOutput::failure(1, "Error: no valid credential sources")));

        let err = run_checked(&runner, &CommandSpec::new("terraform").arg("apply"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NonZeroExit { exit_code: Some(1), ref stderr, .. }
            if stderr.contains("credential")));
    }

    #[tokio::test]
    async fn test_run_checked_keeps_tail_of_stdout() {
        let stdout: String = (1..=30).map(|i| format!("1,ubuntu-ami,ui,say,line {i}\n")).collect::<String>()
            + "1,ubuntu-ami,ui,error,Error uploading ami: RequestLimitExceeded\n";
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(move |_| Ok(CommandOutput::failure(1, "").with_stdout(stdout.clone())));

        let err = run_checked(&runner, &CommandSpec::new("packer").arg("build"))
            .await
            .unwrap_err();
        let CommandError::NonZeroExit { stdout_tail, .. } = &err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(stdout_tail.lines().count(), STDOUT_TAIL_LINES);
        assert!(!stdout_tail.contains("line 11\n"));
        assert!(err.to_string().contains("Error uploading ami: RequestLimitExceeded"));
    }

    #[test]
    fn test_tail_lines_of_short_output() {
        assert_eq!(tail_lines("a\nb\n", 20), "a\nb");
        assert_eq!(tail_lines("", 20), "");
    }

    #[tokio::test]
    async fn test_run_checked_passes_success_through() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Ok(CommandOutput::success("done")));

        let output = run_checked(&runner, &CommandSpec::new("true")).await.unwrap();
        assert_eq!(output.stdout, "done");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_captures_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo \"$GREETING from $(basename \"$PWD\")\"; echo oops >&2; exit 3"])
            .current_dir(dir.path())
            .envs([("GREETING", "hello")]);

        let output = ProcessCommandRunner::new().run(&spec).await.unwrap();
        let dir_name = dir.path().file_name().unwrap().to_string_lossy().into_owned();

        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), format!("hello from {dir_name}"));
        assert_eq!(output.stderr.trim(), "oops");
        assert!(!output.is_success());
    }

    #[tokio::test]
    async fn test_process_runner_missing_program() {
        let spec = CommandSpec::new("stagecheck-definitely-not-a-real-binary");
        let err = ProcessCommandRunner::new().run(&spec).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
