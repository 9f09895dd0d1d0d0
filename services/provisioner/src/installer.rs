//! Installer trait and helpers shared by feature installers.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::command::CommandSpec;
use crate::context::InstallContext;
use crate::error::ProvisionError;
use crate::layout::{is_executable, paths, write_atomic};

/// Installation procedure for one component.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Perform the installation. Any error fails the enclosing stage.
    async fn install(&self, ctx: &InstallContext<'_>) -> Result<(), ProvisionError>;

    /// Idempotency guard: true when the component is already in place.
    async fn is_satisfied(&self, _ctx: &InstallContext<'_>) -> bool {
        false
    }
}

/// Logical path of a feature's load generator configuration fragment.
pub fn fragment_path(feature: &str) -> PathBuf {
    Path::new(paths::TANK_CONFIG_DIR).join(format!("10-{}.yaml", feature))
}

/// Write a feature's configuration fragment.
pub fn write_fragment(
    ctx: &InstallContext<'_>,
    feature: &str,
    contents: &str,
) -> Result<(), ProvisionError> {
    let path = ctx.path(fragment_path(feature));
    write_atomic(&path, contents.as_bytes()).map_err(|e| ProvisionError::io(&path, e))
}

/// Fail unless the logical path is an executable file.
pub fn ensure_executable(
    ctx: &InstallContext<'_>,
    feature: &str,
    logical: impl AsRef<Path>,
) -> Result<(), ProvisionError> {
    let logical = logical.as_ref();
    if is_executable(&ctx.path(logical)) {
        return Ok(());
    }
    Err(ProvisionError::Verify {
        feature: feature.to_string(),
        detail: format!("{} is not an executable file", logical.display()),
    })
}

/// Fail unless the logical path exists (a dangling symlink counts).
pub fn ensure_exists(
    ctx: &InstallContext<'_>,
    feature: &str,
    logical: impl AsRef<Path>,
) -> Result<(), ProvisionError> {
    let logical = logical.as_ref();
    if fs::symlink_metadata(ctx.path(logical)).is_ok() {
        return Ok(());
    }
    Err(ProvisionError::Verify {
        feature: feature.to_string(),
        detail: format!("{} is missing", logical.display()),
    })
}

/// Fail unless `binary` resolves on the target's PATH.
pub async fn verify_on_path(
    ctx: &InstallContext<'_>,
    feature: &str,
    binary: &str,
) -> Result<(), ProvisionError> {
    ctx.runner
        .run(&CommandSpec::which(binary))
        .await
        .map(|_| ())
        .map_err(|e| ProvisionError::Verify {
            feature: feature.to_string(),
            detail: format!("{} not found on PATH: {}", binary, e),
        })
}
