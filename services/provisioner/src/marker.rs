//! Provisioning marker and run lock.
//!
//! The marker records a completed run; its presence makes every later run
//! refuse to start. The lock file excludes concurrent runs on one machine.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProvisionError;
use crate::layout::write_atomic;

/// Contents of the marker file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub completed_at: DateTime<Utc>,
    pub features: Vec<String>,
    pub runtime_version: String,
    pub provisioner_version: String,
}

impl MarkerRecord {
    pub fn new(features: Vec<String>, runtime_version: impl Into<String>) -> Self {
        Self {
            completed_at: Utc::now(),
            features,
            runtime_version: runtime_version.into(),
            provisioner_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Marker at a resolved path.
#[derive(Debug, Clone)]
pub struct ProvisionMarker {
    path: PathBuf,
}

impl ProvisionMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Take the run lock. Fails with `Reentry` when the marker is present or
    /// another run holds the lock.
    pub fn acquire(&self) -> Result<RunLock, ProvisionError> {
        self.ensure_absent()?;
        self.take_lock()
    }

    fn ensure_absent(&self) -> Result<(), ProvisionError> {
        if self.exists() {
            return Err(ProvisionError::Reentry(self.path.clone()));
        }
        Ok(())
    }

    /// Create the lock file, then look for the marker again: a run that
    /// finished between the first check and the lock has already written it.
    fn take_lock(&self) -> Result<RunLock, ProvisionError> {
        let lock = self.lock_path();
        if let Some(parent) = lock.parent() {
            fs::create_dir_all(parent).map_err(|e| ProvisionError::io(parent, e))?;
        }

        let held = match OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(_) => RunLock { path: lock },
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(ProvisionError::Reentry(lock));
            }
            Err(e) => return Err(ProvisionError::io(lock, e)),
        };

        // Dropping `held` on this path releases the lock.
        self.ensure_absent()?;
        debug!(lock = %held.path.display(), "run lock acquired");
        Ok(held)
    }

    /// Atomically write the record.
    pub fn write(&self, record: &MarkerRecord) -> Result<(), ProvisionError> {
        let mut body = serde_json::to_vec_pretty(record)
            .map_err(|e| ProvisionError::io(&self.path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
        body.push(b'\n');
        write_atomic(&self.path, &body).map_err(|e| ProvisionError::io(&self.path, e))
    }

    /// Read the record, `None` when absent.
    pub fn read(&self) -> Result<Option<MarkerRecord>, ProvisionError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ProvisionError::io(&self.path, e)),
        };
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|e| ProvisionError::io(&self.path, io::Error::new(io::ErrorKind::InvalidData, e)))
    }
}

/// Held for the duration of a run; removes the lock file when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(lock = %self.path.display(), error = %e, "failed to release run lock");
            }
        }
    }
}
