//! Post-run cleanup.
//!
//! Runs after every run that got past the reentry check, successful or not.
//! Each target is removed independently; failures are logged and reported but
//! never stop the remaining targets.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::apt;
use crate::command::{CommandRunner, CommandSpec};
use crate::config::ProvisionConfig;
use crate::layout::{paths, Layout};

/// Something cleanup removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupTarget {
    /// A file or directory tree.
    RemoveTree(PathBuf),
    /// Every entry inside a directory; the directory itself stays.
    ClearDir(PathBuf),
    /// A single file.
    RemoveFile(PathBuf),
    /// A system command.
    Command(CommandSpec),
}

impl CleanupTarget {
    fn describe(&self) -> String {
        match self {
            CleanupTarget::RemoveTree(p) | CleanupTarget::RemoveFile(p) => p.display().to_string(),
            CleanupTarget::ClearDir(p) => format!("{}/*", p.display()),
            CleanupTarget::Command(cmd) => cmd.to_string(),
        }
    }
}

/// A cleanup step that did not complete.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("failed to remove {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cleanup command failed: {0}")]
    Command(String),
}

/// What cleanup did.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Targets handled, including ones that were already absent.
    pub removed: Vec<String>,
    pub failures: Vec<CleanupError>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Ordered cleanup plan.
#[derive(Debug, Clone)]
pub struct Cleanup {
    targets: Vec<CleanupTarget>,
}

impl Cleanup {
    pub fn new(targets: Vec<CleanupTarget>) -> Self {
        Self { targets }
    }

    /// Standard plan: transient paths registered during the run, package
    /// caches and logs, the work dir, then configured extras.
    pub fn for_config(config: &ProvisionConfig, transient: Vec<PathBuf>) -> Self {
        let mut targets: Vec<CleanupTarget> =
            transient.into_iter().map(CleanupTarget::RemoveTree).collect();

        targets.push(CleanupTarget::Command(apt::clean_command()));
        targets.push(CleanupTarget::ClearDir(PathBuf::from(paths::APT_LISTS_DIR)));
        targets.push(CleanupTarget::ClearDir(PathBuf::from(paths::APT_ARCHIVES_DIR)));
        targets.push(CleanupTarget::ClearDir(PathBuf::from(paths::APT_LOG_DIR)));
        targets.push(CleanupTarget::RemoveFile(PathBuf::from(paths::DPKG_LOG)));
        targets.push(CleanupTarget::RemoveFile(PathBuf::from(paths::ALTERNATIVES_LOG)));
        targets.push(CleanupTarget::RemoveTree(config.work_dir.clone()));
        targets.extend(
            config
                .cleanup
                .extra_paths
                .iter()
                .cloned()
                .map(CleanupTarget::RemoveTree),
        );

        Self { targets }
    }

    pub fn targets(&self) -> &[CleanupTarget] {
        &self.targets
    }

    /// Remove every target. Never fails.
    pub async fn run(&self, layout: &Layout, runner: &dyn CommandRunner) -> CleanupReport {
        let mut report = CleanupReport::default();

        for target in &self.targets {
            let result = match target {
                CleanupTarget::RemoveTree(p) => remove_tree(&layout.resolve(p)),
                CleanupTarget::ClearDir(p) => clear_dir(&layout.resolve(p)),
                CleanupTarget::RemoveFile(p) => remove_file(&layout.resolve(p)),
                CleanupTarget::Command(cmd) => runner
                    .run(cmd)
                    .await
                    .map(|_| ())
                    .map_err(|e| CleanupError::Command(e.to_string())),
            };

            match result {
                Ok(()) => report.removed.push(target.describe()),
                Err(e) => {
                    warn!(target_path = %target.describe(), error = %e, "cleanup step failed");
                    report.failures.push(e);
                }
            }
        }

        info!(
            removed = report.removed.len(),
            failed = report.failures.len(),
            "cleanup finished"
        );
        report
    }
}

fn not_found_ok(path: &Path, result: io::Result<()>) -> Result<(), CleanupError> {
    match result {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(CleanupError::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
        _ => Ok(()),
    }
}

fn remove_tree(path: &Path) -> Result<(), CleanupError> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    not_found_ok(path, result)
}

fn remove_file(path: &Path) -> Result<(), CleanupError> {
    not_found_ok(path, fs::remove_file(path))
}

fn clear_dir(dir: &Path) -> Result<(), CleanupError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => return not_found_ok(dir, Err(e)),
    };

    let mut first_error = None;
    for entry in entries {
        let result = entry
            .map_err(|e| CleanupError::Remove {
                path: dir.to_path_buf(),
                source: e,
            })
            .and_then(|entry| remove_tree(&entry.path()));
        if let Err(e) = result {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
