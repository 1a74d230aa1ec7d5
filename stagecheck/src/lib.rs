//! # Stagecheck
//!
//! Resumable, staged end-to-end tests for infrastructure that is slow to
//! provision.
//!
//! A test is split into named stages (build, deploy, validate, teardown).
//! Any stage can be skipped from the environment, and what one stage
//! produces is persisted so a later invocation can pick up where an
//! earlier one left off. Stagecheck provides:
//!
//! - **Stage runner**: skippable stages with deferred teardown that runs even after a failure
//! - **Persisted state**: typed values saved per test folder and namespaced by key
//! - **Retry engine**: bounded, fixed-interval retries and HTTP readiness polling
//! - **Build deduplication**: one keyed build at a time, each key built at most once
//! - **Provisioning collaborators**: image builds, infrastructure apply/destroy and compose clusters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stagecheck::prelude::*;
//!
//! # async fn example(dir: &std::path::Path) -> Result<(), StageError> {
//! let state = StageState::on_disk(dir);
//!
//! let plan = StagePlan::new()
//!     .defer("teardown", || async {
//!         state.cleanup_all()?;
//!         Ok(())
//!     })
//!     .stage("setup", || async {
//!         state.save_image_id("ami-123")?;
//!         Ok(())
//!     })
//!     .stage("validate", || async {
//!         let image_id = state.load_image_id()?;
//!         anyhow::ensure!(image_id.starts_with("ami-"));
//!         Ok(())
//!     });
//!
//! // `SKIP_validate=true` in the environment skips the validate stage.
//! StageRunner::new().run(plan).await.into_result()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod dedup;
pub mod errors;
pub mod observability;
pub mod parallel;
pub mod provision;
pub mod retry;
pub mod stage;
pub mod state;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::HarnessConfig;
    pub use crate::dedup::{BuildDeduplicator, DedupConfig};
    pub use crate::errors::{
        BuildError, CommandError, ConfigError, HttpError, RetryError, StageError,
        StagecheckError, StateError, TaskError,
    };
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::parallel::{TaskGroup, TaskOutcome};
    pub use crate::provision::{
        CommandRunner, ComposeProject, ImageBuilder, ProcessCommandRunner, ProvisionOptions,
        Provisioner,
    };
    pub use crate::retry::{
        do_with_retry, do_with_retryable_errors, http_get_with_retry,
        http_get_with_retry_with_custom_validation, HttpClient, HttpResponse, RetryConfig,
    };
    pub use crate::stage::{
        EnvSkipSignal, RunReport, SkipSignal, StagePlan, StageRunner, StageStatus,
        StaticSkipSignal,
    };
    pub use crate::state::{keys, FileStateStore, StageState, StateStore};
    pub use crate::utils::{format_cluster_name, unique_id};

    #[cfg(feature = "http")]
    pub use crate::retry::ReqwestHttpClient;
}

// Re-export commonly used items at the crate root
pub use errors::{Result, StagecheckError};
