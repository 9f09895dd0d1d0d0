use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use loadprep_fetch::{ArtifactDescriptor, ArtifactKind};
use tracing::info;

use crate::config::{render_url, PandoraConfig};
use crate::context::InstallContext;
use crate::error::ProvisionError;
use crate::installer::{ensure_executable, fragment_path, write_fragment, Installer};
use crate::layout::{is_executable, paths};
use crate::registry::FeatureSpec;

const NAME: &str = "pandora";

/// Pre-built pandora binary.
pub struct PandoraInstaller {
    url: String,
    sha256: Option<String>,
}

impl PandoraInstaller {
    pub fn new(config: &PandoraConfig) -> Self {
        Self {
            url: render_url(&config.url, &config.version),
            sha256: config.sha256.clone(),
        }
    }

    pub fn spec(config: &PandoraConfig) -> FeatureSpec {
        FeatureSpec::new(NAME, Arc::new(Self::new(config)))
            .produces(binary_path())
            .produces(fragment_path(NAME))
    }
}

fn binary_path() -> PathBuf {
    Path::new(paths::LOCAL_BIN).join("pandora")
}

fn fragment(binary: &Path) -> String {
    format!(
        "pandora:\n  enabled: false\n  package: yandextank.plugins.Pandora\n  pandora_cmd: {}\n",
        binary.display()
    )
}

#[async_trait]
impl Installer for PandoraInstaller {
    async fn install(&self, ctx: &InstallContext<'_>) -> Result<(), ProvisionError> {
        let binary = binary_path();

        let mut artifact = ArtifactDescriptor::new(&self.url, ctx.path(&binary), ArtifactKind::Binary);
        if let Some(digest) = &self.sha256 {
            artifact = artifact.with_sha256(digest);
        }
        ctx.fetcher.fetch(&artifact).await?;

        ensure_executable(ctx, NAME, &binary)?;
        write_fragment(ctx, NAME, &fragment(&binary))?;

        info!(binary = %binary.display(), "pandora installed");
        Ok(())
    }

    async fn is_satisfied(&self, ctx: &InstallContext<'_>) -> bool {
        is_executable(&ctx.path(binary_path())) && ctx.path(fragment_path(NAME)).is_file()
    }
}
