use std::sync::Arc;

use async_trait::async_trait;

use crate::apt;
use crate::config::{AptSourceConfig, PhantomConfig};
use crate::context::InstallContext;
use crate::error::ProvisionError;
use crate::installer::{fragment_path, verify_on_path, write_fragment, Installer};
use crate::registry::FeatureSpec;

const NAME: &str = "phantom";

const FRAGMENT: &str = "\
phantom:
  enabled: false
  package: yandextank.plugins.Phantom
  phantom_path: phantom
";

/// Phantom from its package repository. The repository is only needed while
/// installing and is removed by cleanup.
pub struct PhantomInstaller {
    source: AptSourceConfig,
    packages: Vec<String>,
}

impl PhantomInstaller {
    pub fn new(config: &PhantomConfig) -> Self {
        Self {
            source: config.source.clone(),
            packages: config.packages.clone(),
        }
    }

    pub fn spec(config: &PhantomConfig) -> FeatureSpec {
        FeatureSpec::new(NAME, Arc::new(Self::new(config))).produces(fragment_path(NAME))
    }
}

#[async_trait]
impl Installer for PhantomInstaller {
    async fn install(&self, ctx: &InstallContext<'_>) -> Result<(), ProvisionError> {
        apt::add_source(ctx, &self.source, true).await?;
        apt::update(ctx).await?;
        apt::install(ctx, &self.packages).await?;
        write_fragment(ctx, NAME, FRAGMENT)?;
        verify_on_path(ctx, NAME, "phantom").await
    }
}
