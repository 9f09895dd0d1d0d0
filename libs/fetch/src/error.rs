//! Error types for artifact fetching.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single transport attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Timeout, connection reset, or a retryable status. Worth another attempt.
    #[error("transient: {0}")]
    Transient(String),

    /// The server answered with a status that will not change on retry.
    #[error("rejected with status {status}")]
    Rejected { status: u16 },

    /// The request could not be built or followed.
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Terminal fetch errors. Callers treat every variant as stage failure.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url}: gave up after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("{url}: server rejected request with status {status}")]
    Rejected { url: String, status: u16 },

    #[error("{url}: {detail}")]
    Fatal { url: String, detail: String },

    #[error("{url}: checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("I/O error writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Archive extraction errors. These point at a bad version or URL, so they
/// are never retried.
#[derive(Debug, Error)]
pub enum UnpackError {
    #[error("cannot open archive {}: {source}", archive.display())]
    Open {
        archive: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt archive {}: {detail}", archive.display())]
    Corrupt { archive: PathBuf, detail: String },

    #[error("failed to extract {} into {}: {source}", entry.display(), dest.display())]
    Extract {
        entry: PathBuf,
        dest: PathBuf,
        #[source]
        source: io::Error,
    },
}
