//! Host provisioning for the load-testing agent.
//!
//! A run installs a Python runtime, a selection of load generator features
//! and OS tuning onto a target root, then cleans up after itself. The machine
//! ends either fully provisioned, with a marker recording the run, or cleanly
//! failed with exactly one logged reason.
//!
//! ## Modules
//!
//! - `orchestrator`: the fixed stage sequence and its report
//! - `stage`: audited units of work
//! - `registry`: feature catalog and selection parsing
//! - `features`: built-in feature installers
//! - `runtime`, `baseline`: interpreter and base system stages
//! - `tuner`: idempotent OS tuning
//! - `cleanup`: post-run removal of transient state
//! - `marker`: completion marker and run lock
//! - `command`, `apt`: system command execution and the package manager
//! - `config`, `layout`, `context`: configuration and target paths

pub mod apt;
pub mod baseline;
pub mod cleanup;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod features;
pub mod handoff;
pub mod installer;
pub mod layout;
pub mod logging;
pub mod marker;
pub mod orchestrator;
pub mod registry;
pub mod runtime;
pub mod stage;
pub mod tuner;

pub use cleanup::{Cleanup, CleanupReport};
pub use command::{CommandRunner, CommandSpec, RecordingRunner, SystemRunner};
pub use config::ProvisionConfig;
pub use error::ProvisionError;
pub use marker::{MarkerRecord, ProvisionMarker};
pub use orchestrator::{Orchestrator, ProvisionReport, ProvisionStatus};
pub use registry::{FeatureRegistry, FeatureSelection, FeatureSpec};
pub use stage::{Outcome, StageResult};
pub use tuner::{SystemTuner, TuningDirective};

/// Provisioner version (semver).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
