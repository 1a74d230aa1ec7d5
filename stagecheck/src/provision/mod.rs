//! Narrow interfaces to the external provisioning tools.
//!
//! Image builds, infrastructure apply/destroy and local container
//! clusters all go through a [`CommandRunner`], so drivers can swap the
//! real processes for scripted ones in tests.

mod command;
mod compose;
mod image;
mod infra;
mod options;

pub use command::{run_checked, CommandOutput, CommandRunner, CommandSpec, ProcessCommandRunner};
pub use compose::ComposeProject;
pub use image::{parse_artifact_id, ImageBuilder};
pub use infra::Provisioner;
pub use options::{is_valid_var_name, ProvisionOptions};

#[cfg(test)]
pub(crate) use command::MockCommandRunner;
