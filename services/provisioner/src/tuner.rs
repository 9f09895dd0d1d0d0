//! Persistent OS tuning.
//!
//! Each directive is a single line that must be present in a target file.
//! Lines are appended only when absent, so re-applying a directive set leaves
//! files byte-identical.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ProvisionError;
use crate::layout::{paths, write_atomic, Layout};

/// How a directive is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    #[default]
    AppendIfAbsent,
}

/// One configuration line for one file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TuningDirective {
    /// Logical path of the file.
    pub target: PathBuf,
    pub line: String,
    #[serde(default)]
    pub mode: ApplyMode,
}

impl TuningDirective {
    pub fn append(target: impl Into<PathBuf>, line: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            line: line.into(),
            mode: ApplyMode::AppendIfAbsent,
        }
    }
}

/// Default descriptor and network stack limits for load generation.
pub fn default_directives() -> Vec<TuningDirective> {
    let limits = [
        "* soft nofile 1048576",
        "* hard nofile 1048576",
        "root soft nofile 1048576",
        "root hard nofile 1048576",
    ];
    let sysctl = [
        "net.core.somaxconn = 65535",
        "net.ipv4.tcp_max_syn_backlog = 65535",
        "net.core.netdev_max_backlog = 65535",
        "net.ipv4.ip_local_port_range = 1024 65535",
        "net.ipv4.tcp_tw_reuse = 1",
        "net.ipv4.tcp_fin_timeout = 15",
        "net.core.rmem_max = 16777216",
        "net.core.wmem_max = 16777216",
        "fs.file-max = 2097152",
    ];

    limits
        .into_iter()
        .map(|line| TuningDirective::append(paths::LIMITS_CONF, line))
        .chain(
            sysctl
                .into_iter()
                .map(|line| TuningDirective::append(paths::SYSCTL_CONF, line)),
        )
        .collect()
}

/// Applies tuning directives under a target root.
pub struct SystemTuner<'a> {
    layout: &'a Layout,
}

impl<'a> SystemTuner<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        Self { layout }
    }

    /// Apply directives in order. The first write failure aborts.
    pub fn apply(&self, directives: &[TuningDirective]) -> Result<(), ProvisionError> {
        let mut appended = 0usize;
        for directive in directives {
            if self.apply_one(directive)? {
                appended += 1;
            }
        }
        info!(directives = directives.len(), appended, "tuning applied");
        Ok(())
    }

    fn apply_one(&self, directive: &TuningDirective) -> Result<bool, ProvisionError> {
        let path = self.layout.resolve(&directive.target);
        let tuning_err = |source: io::Error| ProvisionError::Tuning {
            path: path.clone(),
            source,
        };

        let current = read_or_empty(&path).map_err(tuning_err)?;
        let wanted = directive.line.trim_end();

        match directive.mode {
            ApplyMode::AppendIfAbsent => {
                if current.lines().any(|l| l.trim_end() == wanted) {
                    debug!(target_file = %directive.target.display(), line = %wanted, "already present");
                    return Ok(false);
                }

                let mut updated = current;
                if !updated.is_empty() && !updated.ends_with('\n') {
                    updated.push('\n');
                }
                updated.push_str(wanted);
                updated.push('\n');

                write_atomic(&path, updated.as_bytes()).map_err(tuning_err)?;
                debug!(target_file = %directive.target.display(), line = %wanted, "appended");
                Ok(true)
            }
        }
    }
}

fn read_or_empty(path: &Path) -> io::Result<String> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}
