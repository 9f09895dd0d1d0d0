//! Bounded-retry artifact fetcher.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::artifact::{partial_path, ArtifactDescriptor, ArtifactKind};
use crate::error::{FetchError, TransportError};
use crate::policy::RetryPolicy;
use crate::transport::Transport;

/// Resolves artifacts to files on local disk.
///
/// Transient transport failures are retried under the [`RetryPolicy`]. Every
/// other failure is terminal on first sight. A destination path is either
/// absent or holds the complete artifact.
#[derive(Clone)]
pub struct ArtifactFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl ArtifactFetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Fetch an artifact to its destination and return the destination path.
    pub async fn fetch(&self, artifact: &ArtifactDescriptor) -> Result<PathBuf, FetchError> {
        let url = artifact.source_url.as_str();
        let max_attempts = self.policy.attempts();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            debug!(url = %url, attempt, max_attempts, "fetching artifact");

            let result =
                match tokio::time::timeout(self.policy.timeout, self.transport.get(url)).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Transient(format!(
                        "attempt timed out after {}s",
                        self.policy.timeout.as_secs_f64()
                    ))),
                };

            match result {
                Ok(body) => {
                    let dest = persist(artifact, &body)?;
                    info!(
                        url = %url,
                        dest = %dest.display(),
                        kind = %artifact.kind,
                        size = body.len(),
                        attempt,
                        "artifact fetched"
                    );
                    return Ok(dest);
                }
                Err(TransportError::Transient(reason)) => {
                    warn!(url = %url, attempt, max_attempts, reason = %reason, "transient fetch failure");
                    last_error = reason;
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.backoff.delay(attempt - 1)).await;
                    }
                }
                Err(TransportError::Rejected { status }) => {
                    return Err(FetchError::Rejected {
                        url: url.to_string(),
                        status,
                    });
                }
                Err(TransportError::Fatal(detail)) => {
                    return Err(FetchError::Fatal {
                        url: url.to_string(),
                        detail,
                    });
                }
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: max_attempts,
            last_error,
        })
    }
}

/// Verify and write the body through a temp file, then rename into place.
fn persist(artifact: &ArtifactDescriptor, body: &[u8]) -> Result<PathBuf, FetchError> {
    if let Some(expected) = &artifact.sha256 {
        let actual = hex::encode(Sha256::digest(body));
        if &actual != expected {
            return Err(FetchError::ChecksumMismatch {
                url: artifact.source_url.clone(),
                expected: expected.clone(),
                actual,
            });
        }
    }

    let dest = &artifact.destination;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|source| FetchError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = partial_path(dest);
    if let Err(source) = write_temp(&temp_path, body, artifact.kind) {
        fs::remove_file(&temp_path).ok();
        return Err(FetchError::Io {
            path: temp_path,
            source,
        });
    }

    if let Err(source) = fs::rename(&temp_path, dest) {
        fs::remove_file(&temp_path).ok();
        return Err(FetchError::Io {
            path: dest.clone(),
            source,
        });
    }

    Ok(dest.clone())
}

fn write_temp(path: &Path, body: &[u8], kind: ArtifactKind) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(body)?;
    file.sync_all()?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(kind.mode()))?;
    }
    #[cfg(not(unix))]
    let _ = kind;

    Ok(())
}
