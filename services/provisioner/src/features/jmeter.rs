use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use loadprep_fetch::{unpack, ArtifactDescriptor, ArtifactKind};
use tracing::{debug, info};

use crate::config::{render_url, JmeterConfig, PluginArtifact};
use crate::context::InstallContext;
use crate::error::ProvisionError;
use crate::installer::{ensure_executable, fragment_path, write_fragment, Installer};
use crate::layout::{is_executable, paths};
use crate::registry::FeatureSpec;

const NAME: &str = "jmeter";

/// JMeter distribution unpacked under the install root, plus plugin jars and
/// a launcher symlink on PATH.
pub struct JmeterInstaller {
    version: String,
    url: String,
    sha256: Option<String>,
    home: PathBuf,
    plugins: Vec<PluginArtifact>,
}

impl JmeterInstaller {
    pub fn new(config: &JmeterConfig) -> Self {
        Self {
            version: config.version.clone(),
            url: render_url(&config.url, &config.version),
            sha256: config.sha256.clone(),
            home: config
                .install_root
                .join(format!("apache-jmeter-{}", config.version)),
            plugins: config.plugins.clone(),
        }
    }

    pub fn spec(config: &JmeterConfig) -> FeatureSpec {
        let installer = Self::new(config);
        let launcher = installer.launcher();
        FeatureSpec::new(NAME, Arc::new(installer))
            .requires(&config.java_package)
            .produces(launcher)
            .produces(link_path())
            .produces(fragment_path(NAME))
    }

    fn launcher(&self) -> PathBuf {
        self.home.join("bin").join("jmeter")
    }

    fn archive_name(&self) -> String {
        format!("apache-jmeter-{}.tgz", self.version)
    }
}

fn link_path() -> PathBuf {
    Path::new(paths::LOCAL_BIN).join("jmeter")
}

fn fragment(link: &Path) -> String {
    format!(
        "jmeter:\n  enabled: false\n  package: yandextank.plugins.JMeter\n  jmeter_path: {}\n",
        link.display()
    )
}

/// Point `link` at `target`, replacing whatever is there.
fn replace_symlink(target: &Path, link: &Path) -> io::Result<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::symlink_metadata(link) {
        Ok(_) => fs::remove_file(link)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::os::unix::fs::symlink(target, link)
}

#[async_trait]
impl Installer for JmeterInstaller {
    async fn install(&self, ctx: &InstallContext<'_>) -> Result<(), ProvisionError> {
        let archive = ctx.path(ctx.work_dir().join(self.archive_name()));
        let mut descriptor = ArtifactDescriptor::new(&self.url, &archive, ArtifactKind::Archive);
        if let Some(digest) = &self.sha256 {
            descriptor = descriptor.with_sha256(digest);
        }
        ctx.fetcher.fetch(&descriptor).await?;

        let home = ctx.path(&self.home);
        let entries = unpack(&archive, &home, 1)?;
        debug!(entries, home = %self.home.display(), "distribution unpacked");

        let ext = self.home.join("lib").join("ext");
        for plugin in &self.plugins {
            ctx.fetcher
                .fetch(&ArtifactDescriptor::new(
                    &plugin.url,
                    ctx.path(ext.join(&plugin.file)),
                    ArtifactKind::Package,
                ))
                .await?;
        }

        let launcher = self.launcher();
        ensure_executable(ctx, NAME, &launcher)?;

        let link = ctx.path(link_path());
        replace_symlink(&launcher, &link).map_err(|e| ProvisionError::io(&link, e))?;

        write_fragment(ctx, NAME, &fragment(&link_path()))?;

        info!(
            version = %self.version,
            home = %self.home.display(),
            plugins = self.plugins.len(),
            "jmeter installed"
        );
        Ok(())
    }

    async fn is_satisfied(&self, ctx: &InstallContext<'_>) -> bool {
        is_executable(&ctx.path(self.launcher()))
            && fs::symlink_metadata(ctx.path(link_path())).is_ok()
            && ctx.path(fragment_path(NAME)).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_follow_version() {
        let installer = JmeterInstaller::new(&JmeterConfig::default());
        assert_eq!(
            installer.launcher(),
            PathBuf::from("/opt/apache-jmeter-5.6.3/bin/jmeter")
        );
        assert_eq!(installer.archive_name(), "apache-jmeter-5.6.3.tgz");
        assert_eq!(
            installer.url,
            "https://archive.apache.org/dist/jmeter/binaries/apache-jmeter-5.6.3.tgz"
        );
    }

    #[test]
    fn test_replace_symlink_overwrites() {
        let dir = tempdir().unwrap();
        let link = dir.path().join("usr/local/bin/jmeter");

        replace_symlink(Path::new("/opt/apache-jmeter-5.5/bin/jmeter"), &link).unwrap();
        replace_symlink(Path::new("/opt/apache-jmeter-5.6.3/bin/jmeter"), &link).unwrap();

        assert_eq!(
            fs::read_link(&link).unwrap(),
            PathBuf::from("/opt/apache-jmeter-5.6.3/bin/jmeter")
        );
    }
}
