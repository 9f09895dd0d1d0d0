//! Error types for provisioning.

use std::io;
use std::path::PathBuf;

use loadprep_fetch::{FetchError, UnpackError};
use thiserror::Error;

/// Provisioning errors with standardized reason codes.
///
/// Stages convert these into failed outcomes; nothing above the orchestrator
/// sees them as errors.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The marker or run lock already exists.
    #[error("already provisioned: {} exists", .0.display())]
    Reentry(PathBuf),

    /// Artifact acquisition failed after retries, or was rejected outright.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Archive extraction failed.
    #[error("unpack failed: {0}")]
    Unpack(#[from] UnpackError),

    /// A system command exited non-zero.
    #[error("command `{command}` failed ({}): {stderr}", exit_label(.code))]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A system command could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// A tuning directive could not be written.
    #[error("tuning directive for {} could not be written: {source}", path.display())]
    Tuning {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A post-install check did not hold.
    #[error("post-install check failed for {feature}: {detail}")]
    Verify { feature: String, detail: String },

    /// Configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem error outside of tuning.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProvisionError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ProvisionError::Reentry(_) => "reentry",
            ProvisionError::Fetch(_) => "fetch_failed",
            ProvisionError::Unpack(_) => "unpack_failed",
            ProvisionError::Command { .. } => "command_failed",
            ProvisionError::Spawn { .. } => "command_spawn_failed",
            ProvisionError::Tuning { .. } => "tuning_failed",
            ProvisionError::Verify { .. } => "verify_failed",
            ProvisionError::InvalidConfig(_) => "invalid_config",
            ProvisionError::Io { .. } => "io_error",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ProvisionError::Io {
            path: path.into(),
            source,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}
