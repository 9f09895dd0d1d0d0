//! Target filesystem layout.
//!
//! Installers speak in *logical* paths: absolute paths as seen on the machine
//! being provisioned (`/etc/sysctl.conf`). [`Layout`] maps them onto the
//! actual target root so the same code provisions `/`, a chroot, or a test
//! directory.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

/// Well-known logical paths.
pub mod paths {
    /// Drop-in directory for load generator configuration fragments.
    pub const TANK_CONFIG_DIR: &str = "/etc/yandex-tank";
    /// Package repository list files.
    pub const APT_SOURCES_DIR: &str = "/etc/apt/sources.list.d";
    /// Repository signing keys.
    pub const APT_KEYRINGS_DIR: &str = "/etc/apt/keyrings";
    /// Package manager reliability settings written by the baseline stage.
    pub const APT_CONF: &str = "/etc/apt/apt.conf.d/80-loadprep";
    /// Package index cache.
    pub const APT_LISTS_DIR: &str = "/var/lib/apt/lists";
    /// Downloaded package cache.
    pub const APT_ARCHIVES_DIR: &str = "/var/cache/apt/archives";
    /// Package manager logs.
    pub const APT_LOG_DIR: &str = "/var/log/apt";
    pub const DPKG_LOG: &str = "/var/log/dpkg.log";
    pub const ALTERNATIVES_LOG: &str = "/var/log/alternatives.log";
    /// Installed executables.
    pub const LOCAL_BIN: &str = "/usr/local/bin";
    pub const LIMITS_CONF: &str = "/etc/security/limits.conf";
    pub const SYSCTL_CONF: &str = "/etc/sysctl.conf";
}

/// Maps logical paths onto a target root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the target is the running system.
    pub fn is_host_root(&self) -> bool {
        self.root == Path::new("/")
    }

    /// Resolve a logical path against the target root.
    pub fn resolve(&self, logical: impl AsRef<Path>) -> PathBuf {
        let relative: PathBuf = logical
            .as_ref()
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        self.root.join(relative)
    }
}

/// Write a file through a temp sibling and rename it into place.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.tmp", name));

    let result = (|| {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        fs::remove_file(&tmp_path).ok();
    }
    result
}

/// Whether the file at `path` has any execute bit set.
pub fn is_executable(path: &Path) -> bool {
    match fs::metadata(path) {
        #[cfg(unix)]
        Ok(meta) => {
            use std::os::unix::fs::PermissionsExt;
            meta.is_file() && meta.permissions().mode() & 0o111 != 0
        }
        #[cfg(not(unix))]
        Ok(meta) => meta.is_file(),
        Err(_) => false,
    }
}
