//! Shared state handed to every stage of one run.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use loadprep_fetch::ArtifactFetcher;

use crate::command::CommandRunner;
use crate::config::ProvisionConfig;
use crate::layout::Layout;

/// Everything an installer may touch.
///
/// Lives for exactly one orchestrator run.
pub struct InstallContext<'a> {
    pub config: &'a ProvisionConfig,
    pub layout: &'a Layout,
    pub runner: &'a dyn CommandRunner,
    pub fetcher: &'a ArtifactFetcher,
    /// Logical paths registered during the run that cleanup must remove.
    transient: Mutex<Vec<PathBuf>>,
}

impl<'a> InstallContext<'a> {
    pub fn new(
        config: &'a ProvisionConfig,
        layout: &'a Layout,
        runner: &'a dyn CommandRunner,
        fetcher: &'a ArtifactFetcher,
    ) -> Self {
        Self {
            config,
            layout,
            runner,
            fetcher,
            transient: Mutex::new(Vec::new()),
        }
    }

    /// Resolve a logical path against the target root.
    pub fn path(&self, logical: impl AsRef<Path>) -> PathBuf {
        self.layout.resolve(logical)
    }

    /// Logical scratch directory for downloads.
    pub fn work_dir(&self) -> &Path {
        &self.config.work_dir
    }

    /// Record a logical path that only matters while provisioning.
    pub fn register_transient(&self, logical: impl Into<PathBuf>) {
        let mut transient = self
            .transient
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let logical = logical.into();
        if !transient.contains(&logical) {
            transient.push(logical);
        }
    }

    /// Transient paths recorded so far, in registration order.
    pub fn transient_paths(&self) -> Vec<PathBuf> {
        self.transient
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
