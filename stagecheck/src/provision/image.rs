//! Machine image builds.

use super::command::{run_checked, CommandRunner, CommandSpec};
use crate::errors::CommandError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const PACKER: &str = "packer";

/// Builds one machine image from a template through the image tool's
/// machine-readable interface.
#[derive(Clone)]
pub struct ImageBuilder {
    runner: Arc<dyn CommandRunner>,
    template: PathBuf,
    only: Option<String>,
    vars: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl std::fmt::Debug for ImageBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBuilder")
            .field("template", &self.template)
            .field("only", &self.only)
            .field("vars", &self.vars)
            .finish_non_exhaustive()
    }
}

impl ImageBuilder {
    /// Creates a builder for `template`.
    pub fn new(runner: Arc<dyn CommandRunner>, template: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            template: template.into(),
            only: None,
            vars: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// Restricts the build to one named builder in the template.
    #[must_use]
    pub fn with_only(mut self, builder: impl Into<String>) -> Self {
        self.only = Some(builder.into());
        self
    }

    /// Sets a template variable.
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Runs the tool from `dir`.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Returns the command line the build runs.
    #[must_use]
    pub fn command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(PACKER).args(["build", "-machine-readable"]);
        if let Some(only) = &self.only {
            spec = spec.arg(format!("-only={only}"));
        }
        for (name, value) in &self.vars {
            spec = spec.args(["-var".to_string(), format!("{name}={value}")]);
        }
        spec = spec.arg(self.template.to_string_lossy());
        if let Some(dir) = &self.working_dir {
            spec = spec.current_dir(dir);
        }
        spec
    }

    /// Runs the build and returns the id of the produced image.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool fails or reports no artifact id.
    pub async fn build(&self) -> Result<String, CommandError> {
        let spec = self.command();
        info!(template = %self.template.display(), only = ?self.only, "Building image");

        let output = run_checked(self.runner.as_ref(), &spec).await?;
        let id = parse_artifact_id(&output.stdout).ok_or_else(|| CommandError::UnexpectedOutput {
            program: PACKER.to_string(),
            message: "no artifact id in machine-readable output".to_string(),
        })?;

        info!(image_id = %id, "Image built");
        Ok(id)
    }
}

/// Extracts the image id from machine-readable build output.
///
/// Artifact lines look like `<ts>,<builder>,artifact,0,id,<region>:<id>`;
/// the last one wins.
#[must_use]
pub fn parse_artifact_id(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.trim().splitn(6, ',').collect();
            match fields.as_slice() {
                [_, _, "artifact", _, "id", value] => {
                    let id = value.rsplit_once(':').map_or(*value, |(_, id)| id);
                    (!id.is_empty()).then(|| id.to_string())
                }
                _ => None,
            }
        })
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::command::{CommandOutput, MockCommandRunner};
    use pretty_assertions::assert_eq;

    const OUTPUT: &str = "\
1456332887,,ui,say,==> amazon-linux-ami: Creating the AMI: couchbase-amazon-linux
1456332887,amazon-linux-ami,artifact-count,1
1456332887,amazon-linux-ami,artifact,0,builder-id,mitchellh.amazonebs
1456332887,amazon-linux-ami,artifact,0,id,us-east-1:ami-0abc1234
1456332887,amazon-linux-ami,artifact,0,end
";

    #[test]
    fn test_parse_artifact_id() {
        assert_eq!(parse_artifact_id(OUTPUT), Some("ami-0abc1234".to_string()));
        assert_eq!(parse_artifact_id("1,b,ui,say,nothing built"), None);
        assert_eq!(parse_artifact_id("1,docker,artifact,0,id,sha256:feed"), Some("feed".to_string()));
    }

    #[test]
    fn test_command_line() {
        let builder = ImageBuilder::new(Arc::new(MockCommandRunner::new()), "couchbase.json")
            .with_only("ubuntu-ami")
            .with_var("aws_region", "us-east-2")
            .with_var("edition", "enterprise")
            .with_working_dir("/examples/couchbase-ami");

        let spec = builder.command();
        assert_eq!(
            spec.args,
            vec![
                "build",
                "-machine-readable",
                "-only=ubuntu-ami",
                "-var",
                "aws_region=us-east-2",
                "-var",
                "edition=enterprise",
                "couchbase.json",
            ]
        );
        assert_eq!(spec.working_dir, Some(PathBuf::from("/examples/couchbase-ami")));
    }

    #[tokio::test]
    async fn test_build_returns_artifact_id() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|spec| spec.program == "packer")
            .times(1)
            .returning(|_| Ok(CommandOutput::success(OUTPUT)));

        let builder = ImageBuilder::new(Arc::new(runner), "couchbase.json");
        assert_eq!(builder.build().await.unwrap(), "ami-0abc1234");
    }

    #[tokio::test]
    async fn test_build_without_artifact_is_error() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Ok(CommandOutput::success("1,b,ui,say,done")));

        let err = ImageBuilder::new(Arc::new(runner), "t.json").build().await.unwrap_err();
        assert!(matches!(err, CommandError::UnexpectedOutput { .. }));
    }
}
