//! Feature catalog and selection.
//!
//! A feature selection string names optional components; the registry maps
//! each known name to its [`FeatureSpec`]. Unknown names are dropped at
//! resolution time rather than rejected.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::apt;
use crate::config::ProvisionConfig;
use crate::context::InstallContext;
use crate::error::ProvisionError;
use crate::features::{JmeterInstaller, PandoraInstaller, PhantomInstaller, TelegrafInstaller};
use crate::installer::{ensure_exists, Installer};
use crate::stage::{self, StageResult};

/// An installable feature.
#[derive(Clone)]
pub struct FeatureSpec {
    pub name: String,
    pub installer: Arc<dyn Installer>,
    /// System packages installed before the installer runs.
    pub requires: BTreeSet<String>,
    /// Logical paths that must exist once the installer returns.
    pub post_install_artifacts: Vec<PathBuf>,
}

impl FeatureSpec {
    pub fn new(name: impl Into<String>, installer: Arc<dyn Installer>) -> Self {
        Self {
            name: name.into(),
            installer,
            requires: BTreeSet::new(),
            post_install_artifacts: Vec::new(),
        }
    }

    pub fn requires(mut self, package: impl Into<String>) -> Self {
        self.requires.insert(package.into());
        self
    }

    pub fn produces(mut self, logical: impl Into<PathBuf>) -> Self {
        self.post_install_artifacts.push(logical.into());
        self
    }
}

impl fmt::Debug for FeatureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureSpec")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("post_install_artifacts", &self.post_install_artifacts)
            .finish_non_exhaustive()
    }
}

/// Ordered, deduplicated feature names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSelection {
    names: Vec<String>,
}

impl FeatureSelection {
    /// Parse a comma-separated selection. Absent or blank input selects
    /// `defaults`.
    pub fn parse<S: AsRef<str>>(raw: Option<&str>, defaults: &[S]) -> Self {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty());
        let tokens: Vec<&str> = match raw {
            Some(raw) => raw.split(',').map(str::trim).collect(),
            None => defaults.iter().map(|s| s.as_ref().trim()).collect(),
        };

        let mut names: Vec<String> = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !token.is_empty() && !names.iter().any(|n| n == token) {
                names.push(token.to_string());
            }
        }
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Name to feature mapping.
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    specs: BTreeMap<String, FeatureSpec>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a feature. Names are unique.
    pub fn register(&mut self, spec: FeatureSpec) -> Result<(), ProvisionError> {
        if self.specs.contains_key(&spec.name) {
            return Err(ProvisionError::InvalidConfig(format!(
                "feature '{}' registered twice",
                spec.name
            )));
        }
        self.specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// The built-in catalog.
    pub fn builtin(config: &ProvisionConfig) -> Result<Self, ProvisionError> {
        let mut registry = Self::new();
        registry.register(PandoraInstaller::spec(&config.pandora))?;
        registry.register(PhantomInstaller::spec(&config.phantom))?;
        registry.register(JmeterInstaller::spec(&config.jmeter))?;
        registry.register(TelegrafInstaller::spec(&config.telegraf))?;
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.specs.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// Known specs in selection order.
    pub fn resolve(&self, selection: &FeatureSelection) -> Vec<&FeatureSpec> {
        selection
            .names()
            .iter()
            .filter_map(|name| {
                let spec = self.specs.get(name);
                if spec.is_none() {
                    debug!(feature = %name, "unknown feature ignored");
                }
                spec
            })
            .collect()
    }

    pub fn install_procedure<'s>(&self, spec: &'s FeatureSpec) -> FeatureStage<'s> {
        FeatureStage { spec }
    }
}

/// Installation stage for one feature.
pub struct FeatureStage<'s> {
    spec: &'s FeatureSpec,
}

impl FeatureStage<'_> {
    pub fn stage_name(&self) -> String {
        format!("feature:{}", self.spec.name)
    }

    pub async fn run(&self, ctx: &InstallContext<'_>) -> StageResult {
        let spec = self.spec;
        stage::run_guarded(
            &self.stage_name(),
            || spec.installer.is_satisfied(ctx),
            || async move {
                if !spec.requires.is_empty() {
                    let packages: Vec<&str> = spec.requires.iter().map(String::as_str).collect();
                    apt::install(ctx, &packages).await?;
                }
                spec.installer.install(ctx).await?;
                for artifact in &spec.post_install_artifacts {
                    ensure_exists(ctx, &spec.name, artifact)?;
                }
                Ok(())
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rstest::rstest;

    use super::*;

    struct NoopInstaller;

    #[async_trait]
    impl Installer for NoopInstaller {
        async fn install(&self, _ctx: &InstallContext<'_>) -> Result<(), ProvisionError> {
            Ok(())
        }
    }

    fn registry(names: &[&str]) -> FeatureRegistry {
        let mut registry = FeatureRegistry::new();
        for name in names {
            registry
                .register(FeatureSpec::new(*name, Arc::new(NoopInstaller)))
                .unwrap();
        }
        registry
    }

    const DEFAULTS: &[&str] = &["pandora", "phantom", "jmeter", "telegraf"];

    #[rstest]
    #[case::absent(None, &["pandora", "phantom", "jmeter", "telegraf"])]
    #[case::empty(Some(""), &["pandora", "phantom", "jmeter", "telegraf"])]
    #[case::blank(Some("  "), &["pandora", "phantom", "jmeter", "telegraf"])]
    #[case::single(Some("telegraf"), &["telegraf"])]
    #[case::keeps_order(Some("telegraf,pandora"), &["telegraf", "pandora"])]
    #[case::dedup_first_wins(Some("jmeter,pandora,jmeter"), &["jmeter", "pandora"])]
    #[case::trims_tokens(Some(" pandora , phantom "), &["pandora", "phantom"])]
    #[case::drops_empty_tokens(Some("pandora,,phantom,"), &["pandora", "phantom"])]
    #[case::only_separators(Some(",,"), &[])]
    #[case::case_sensitive(Some("Pandora"), &["Pandora"])]
    fn test_parse(#[case] raw: Option<&str>, #[case] expected: &[&str]) {
        let selection = FeatureSelection::parse(raw, DEFAULTS);
        assert_eq!(selection.names(), expected);
    }

    #[rstest]
    #[case::known_only("phantom,pandora", &["phantom", "pandora"])]
    #[case::unknown_dropped("pandora,unknownFeature,telegraf", &["pandora", "telegraf"])]
    #[case::all_unknown("nginx,redis", &[])]
    #[case::case_mismatch("JMETER,jmeter", &["jmeter"])]
    fn test_resolve(#[case] raw: &str, #[case] expected: &[&str]) {
        let registry = registry(DEFAULTS);
        let selection = FeatureSelection::parse(Some(raw), DEFAULTS);

        let resolved: Vec<&str> = registry
            .resolve(&selection)
            .into_iter()
            .map(|spec| spec.name.as_str())
            .collect();
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry(&["pandora"]);
        let err = registry
            .register(FeatureSpec::new("pandora", Arc::new(NoopInstaller)))
            .unwrap_err();
        assert_eq!(err.reason_code(), "invalid_config");
    }

    #[test]
    fn test_builtin_catalog() {
        let registry = FeatureRegistry::builtin(&ProvisionConfig::default()).unwrap();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["jmeter", "pandora", "phantom", "telegraf"]
        );

        let jmeter = registry.get("jmeter").unwrap();
        assert!(jmeter.requires.contains("openjdk-17-jre-headless"));
        assert!(jmeter
            .post_install_artifacts
            .contains(&PathBuf::from("/usr/local/bin/jmeter")));
        assert_eq!(
            registry.install_procedure(jmeter).stage_name(),
            "feature:jmeter"
        );
    }
}
