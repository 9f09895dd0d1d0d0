//! Artifact descriptors.

use std::fmt;
use std::path::{Path, PathBuf};

/// What the fetched file is used for once it is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// An executable. Written with mode 0755.
    Binary,
    /// A tarball the caller unpacks afterwards.
    Archive,
    /// Input consumed as-is: repository keys, plugin jars, packages.
    Package,
}

impl ArtifactKind {
    /// Unix permission bits applied before the artifact becomes visible.
    pub fn mode(self) -> u32 {
        match self {
            ArtifactKind::Binary => 0o755,
            ArtifactKind::Archive | ArtifactKind::Package => 0o644,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Binary => "binary",
            ArtifactKind::Archive => "archive",
            ArtifactKind::Package => "package",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single remote file and where it should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    /// Remote location.
    pub source_url: String,

    /// Final path on local disk.
    pub destination: PathBuf,

    /// Expected kind.
    pub kind: ArtifactKind,

    /// Optional hex-encoded SHA-256 of the body.
    pub sha256: Option<String>,
}

impl ArtifactDescriptor {
    pub fn new(
        source_url: impl Into<String>,
        destination: impl Into<PathBuf>,
        kind: ArtifactKind,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            destination: destination.into(),
            kind,
            sha256: None,
        }
    }

    /// Require the body to match this SHA-256 digest.
    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into().to_ascii_lowercase());
        self
    }

    /// Hidden sibling path used while the transfer is in flight.
    pub fn partial_path(&self) -> PathBuf {
        partial_path(&self.destination)
    }
}

pub(crate) fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    dest.with_file_name(format!(".{}.part", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        let artifact = ArtifactDescriptor::new(
            "https://example.com/pandora",
            "/usr/local/bin/pandora",
            ArtifactKind::Binary,
        );
        assert_eq!(
            artifact.partial_path(),
            PathBuf::from("/usr/local/bin/.pandora.part")
        );
    }

    #[test]
    fn test_kind_modes() {
        assert_eq!(ArtifactKind::Binary.mode(), 0o755);
        assert_eq!(ArtifactKind::Archive.mode(), 0o644);
        assert_eq!(ArtifactKind::Package.to_string(), "package");
    }

    #[test]
    fn test_sha256_is_normalized() {
        let artifact = ArtifactDescriptor::new("u", "/tmp/x", ArtifactKind::Package)
            .with_sha256("ABCDEF");
        assert_eq!(artifact.sha256.as_deref(), Some("abcdef"));
    }
}
