//! Interpreter installation.

use tracing::info;

use crate::apt;
use crate::command::CommandSpec;
use crate::config::AptSourceConfig;
use crate::context::InstallContext;
use crate::error::ProvisionError;

/// Installs `python<version>` with venv and headers from a transient source.
pub struct RuntimeInstaller<'a> {
    version: &'a str,
    source: &'a AptSourceConfig,
}

impl<'a> RuntimeInstaller<'a> {
    pub fn new(version: &'a str, source: &'a AptSourceConfig) -> Self {
        Self { version, source }
    }

    /// Packages for the requested version.
    pub fn packages(&self) -> Vec<String> {
        let python = format!("python{}", self.version);
        vec![
            python.clone(),
            format!("{}-venv", python),
            format!("{}-dev", python),
        ]
    }

    pub async fn install(&self, ctx: &InstallContext<'_>) -> Result<(), ProvisionError> {
        validate_version(self.version)?;

        apt::add_source(ctx, self.source, true).await?;
        apt::update(ctx).await?;
        apt::install(ctx, &self.packages()).await?;

        let interpreter = format!("python{}", self.version);
        ctx.runner
            .run(&CommandSpec::new(&interpreter).arg("--version"))
            .await
            .map_err(|e| ProvisionError::Verify {
                feature: interpreter.clone(),
                detail: e.to_string(),
            })?;

        info!(version = %self.version, "runtime installed");
        Ok(())
    }
}

/// Accept `<major>.<minor>` with both parts decimal digits.
pub fn validate_version(version: &str) -> Result<(), ProvisionError> {
    let valid = version
        .split_once('.')
        .map(|(major, minor)| is_digits(major) && is_digits(minor))
        .unwrap_or(false);

    if valid {
        Ok(())
    } else {
        Err(ProvisionError::InvalidConfig(format!(
            "runtime version '{}' is not <major>.<minor>",
            version
        )))
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::config::RuntimeConfig;

    #[rstest]
    #[case("3.10", true)]
    #[case("3.12", true)]
    #[case("3", false)]
    #[case("3.10.4", false)]
    #[case("3.x", false)]
    #[case(".10", false)]
    #[case("", false)]
    #[case("3.10; rm -rf /", false)]
    fn test_validate_version(#[case] version: &str, #[case] ok: bool) {
        assert_eq!(validate_version(version).is_ok(), ok);
    }

    #[test]
    fn test_packages() {
        let source = RuntimeConfig::default().source;
        let installer = RuntimeInstaller::new("3.10", &source);
        assert_eq!(
            installer.packages(),
            vec!["python3.10", "python3.10-venv", "python3.10-dev"]
        );
    }
}
