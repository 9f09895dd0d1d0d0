//! Package manager operations.
//!
//! Repository sources are written as one-line `.list` files with a
//! `signed-by` key, not through `add-apt-repository`, so the exact files are
//! known and transient sources can be removed by cleanup.

use std::path::PathBuf;

use loadprep_fetch::{ArtifactDescriptor, ArtifactKind};
use tracing::info;

use crate::command::CommandSpec;
use crate::config::AptSourceConfig;
use crate::context::InstallContext;
use crate::error::ProvisionError;
use crate::layout::{paths, write_atomic};

fn apt_get() -> CommandSpec {
    CommandSpec::new("apt-get").env("DEBIAN_FRONTEND", "noninteractive")
}

/// Refresh package indexes.
pub async fn update(ctx: &InstallContext<'_>) -> Result<(), ProvisionError> {
    ctx.runner.run(&apt_get().args(["update", "-q"])).await?;
    Ok(())
}

/// Install packages without recommends.
pub async fn install<S: AsRef<str>>(
    ctx: &InstallContext<'_>,
    packages: &[S],
) -> Result<(), ProvisionError> {
    if packages.is_empty() {
        return Ok(());
    }

    let cmd = apt_get()
        .args(["install", "-y", "-q", "--no-install-recommends"])
        .args(packages.iter().map(|p| p.as_ref().to_string()));
    ctx.runner.run(&cmd).await?;

    info!(
        packages = ?packages.iter().map(|p| p.as_ref()).collect::<Vec<_>>(),
        "packages installed"
    );
    Ok(())
}

/// Drop downloaded package files.
pub fn clean_command() -> CommandSpec {
    apt_get().arg("clean")
}

/// Logical paths of a source's list and key files.
pub fn source_paths(source: &AptSourceConfig) -> (PathBuf, PathBuf) {
    (
        PathBuf::from(paths::APT_SOURCES_DIR).join(format!("{}.list", source.name)),
        PathBuf::from(paths::APT_KEYRINGS_DIR).join(format!("{}.asc", source.name)),
    )
}

/// `deb [signed-by=...] uri suite components` line for a source.
pub fn source_line(source: &AptSourceConfig, codename: &str) -> String {
    let (_, key) = source_paths(source);
    format!(
        "deb [signed-by={}] {} {} {}\n",
        key.display(),
        source.uri,
        source.suite.as_deref().unwrap_or(codename),
        source.components.join(" ")
    )
}

/// Register a repository source: fetch its key, write its list file.
///
/// Transient sources are removed again by cleanup.
pub async fn add_source(
    ctx: &InstallContext<'_>,
    source: &AptSourceConfig,
    transient: bool,
) -> Result<(), ProvisionError> {
    let (list, key) = source_paths(source);

    ctx.fetcher
        .fetch(&ArtifactDescriptor::new(
            &source.key_url,
            ctx.path(&key),
            ArtifactKind::Package,
        ))
        .await?;

    let list_path = ctx.path(&list);
    write_atomic(&list_path, source_line(source, &ctx.config.apt.codename).as_bytes())
        .map_err(|e| ProvisionError::io(&list_path, e))?;

    if transient {
        ctx.register_transient(&list);
        ctx.register_transient(&key);
    }

    info!(source = %source.name, uri = %source.uri, transient, "package source registered");
    Ok(())
}
