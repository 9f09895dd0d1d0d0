use std::sync::Arc;

use async_trait::async_trait;

use crate::apt;
use crate::config::{AptSourceConfig, TelegrafConfig};
use crate::context::InstallContext;
use crate::error::ProvisionError;
use crate::installer::{fragment_path, verify_on_path, write_fragment, Installer};
use crate::registry::FeatureSpec;

const NAME: &str = "telegraf";

const FRAGMENT: &str = "\
telegraf:
  enabled: true
  package: yandextank.plugins.Telegraf
";

/// Telegraf from the vendor repository. Its source stays registered.
pub struct TelegrafInstaller {
    source: AptSourceConfig,
}

impl TelegrafInstaller {
    pub fn new(config: &TelegrafConfig) -> Self {
        Self {
            source: config.source.clone(),
        }
    }

    pub fn spec(config: &TelegrafConfig) -> FeatureSpec {
        FeatureSpec::new(NAME, Arc::new(Self::new(config))).produces(fragment_path(NAME))
    }
}

#[async_trait]
impl Installer for TelegrafInstaller {
    async fn install(&self, ctx: &InstallContext<'_>) -> Result<(), ProvisionError> {
        apt::add_source(ctx, &self.source, false).await?;
        apt::update(ctx).await?;
        apt::install(ctx, &["telegraf"]).await?;
        write_fragment(ctx, NAME, FRAGMENT)?;
        verify_on_path(ctx, NAME, "telegraf").await
    }
}
