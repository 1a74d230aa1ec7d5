//! Persisted state shared between stages and process invocations.
//!
//! Values are JSON, one file per key, under a directory inside the test
//! folder. A later stage, possibly run by a later CI step, reads what an
//! earlier stage wrote.

mod handle;
mod store;

pub use handle::StageState;
pub use store::{validate_key, FileStateStore, InMemoryStateStore, StateStore, DEFAULT_STATE_DIR};

/// Well-known keys.
pub mod keys {
    /// Id of the machine image built for the run.
    pub const IMAGE_ID: &str = "AmiId";
    /// Cloud region the run deploys into.
    pub const AWS_REGION: &str = "AwsRegion";
    /// Random suffix namespacing the run's resources.
    pub const UNIQUE_ID: &str = "UniqueId";
    /// Options used to provision the infrastructure.
    pub const PROVISION_OPTIONS: &str = "TerraformOptions";
}
