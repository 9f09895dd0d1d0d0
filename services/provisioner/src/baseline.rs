//! Baseline system preparation.

use std::fs;

use tracing::info;

use crate::apt;
use crate::context::InstallContext;
use crate::error::ProvisionError;
use crate::layout::paths;
use crate::tuner::{SystemTuner, TuningDirective};

/// Package manager reliability settings.
pub fn apt_directives() -> Vec<TuningDirective> {
    [
        "Acquire::Retries \"5\";",
        "Acquire::http::Timeout \"30\";",
        "Acquire::https::Timeout \"30\";",
        "APT::Install-Recommends \"false\";",
        "APT::Install-Suggests \"false\";",
    ]
    .into_iter()
    .map(|line| TuningDirective::append(paths::APT_CONF, line))
    .collect()
}

/// Configure the package manager, refresh indexes, install base packages and
/// create the work directory.
pub async fn prepare(ctx: &InstallContext<'_>) -> Result<(), ProvisionError> {
    SystemTuner::new(ctx.layout).apply(&apt_directives())?;

    apt::update(ctx).await?;
    apt::install(ctx, &ctx.config.apt.base_packages).await?;

    let work_dir = ctx.path(ctx.work_dir());
    fs::create_dir_all(&work_dir).map_err(|e| ProvisionError::io(&work_dir, e))?;

    info!(
        packages = ctx.config.apt.base_packages.len(),
        work_dir = %ctx.work_dir().display(),
        "baseline ready"
    );
    Ok(())
}
