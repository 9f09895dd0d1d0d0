//! Provisioning configuration.
//!
//! Everything that varies between images (versions, URLs, repository sources,
//! tuning values) lives here. The file format is TOML; every field has a
//! default so an absent or empty file is a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use loadprep_fetch::{BackoffPolicy, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::tuner::TuningDirective;

/// Complete provisioning configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Target filesystem root. Logical paths resolve against it.
    pub root: PathBuf,

    /// Scratch directory for downloads, removed by cleanup.
    pub work_dir: PathBuf,

    /// Marker written after a successful run.
    pub marker_path: PathBuf,

    /// Features installed when the selection is absent or blank.
    pub default_features: Vec<String>,

    /// Language runtime settings.
    pub runtime: RuntimeConfig,

    /// Artifact fetch budget.
    pub fetch: FetchSettings,

    /// Package manager settings.
    pub apt: AptConfig,

    pub pandora: PandoraConfig,
    pub phantom: PhantomConfig,
    pub jmeter: JmeterConfig,
    pub telegraf: TelegrafConfig,

    /// OS tuning directives applied by the tuning stage.
    pub tuning: Vec<TuningDirective>,

    pub cleanup: CleanupConfig,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            work_dir: PathBuf::from("/tmp/loadprep"),
            marker_path: PathBuf::from("/etc/loadprep/provisioned.json"),
            default_features: ["pandora", "phantom", "jmeter", "telegraf"]
                .into_iter()
                .map(String::from)
                .collect(),
            runtime: RuntimeConfig::default(),
            fetch: FetchSettings::default(),
            apt: AptConfig::default(),
            pandora: PandoraConfig::default(),
            phantom: PhantomConfig::default(),
            jmeter: JmeterConfig::default(),
            telegraf: TelegrafConfig::default(),
            tuning: crate::tuner::default_directives(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl ProvisionConfig {
    /// Load configuration from a TOML file, or return the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        Self::from_toml(&contents).with_context(|| format!("Failed to parse config from {:?}", path))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// Interpreter installation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// `<major>.<minor>` interpreter version.
    pub version: String,

    /// Repository providing the interpreter packages.
    pub source: AptSourceConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: "3.10".to_string(),
            source: AptSourceConfig {
                name: "deadsnakes".to_string(),
                uri: "https://ppa.launchpadcontent.net/deadsnakes/ppa/ubuntu".to_string(),
                suite: None,
                components: vec!["main".to_string()],
                key_url: "https://keyserver.ubuntu.com/pks/lookup?op=get&search=0xF23C5A6CF475977595C89F51BA6932366A755776".to_string(),
            },
        }
    }
}

/// Fetch budget, in config-friendly units.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub max_attempts: u32,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            connect_timeout_secs: 3,
            timeout_secs: 30,
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
        }
    }
}

impl FetchSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            timeout: Duration::from_secs(self.timeout_secs),
            backoff: BackoffPolicy {
                base: Duration::from_millis(self.backoff_base_ms),
                max: Duration::from_millis(self.backoff_max_ms),
                ..BackoffPolicy::default()
            },
        }
    }
}

/// Package manager configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AptConfig {
    /// Distribution codename used for sources without an explicit suite.
    pub codename: String,

    /// Packages installed by the baseline stage.
    pub base_packages: Vec<String>,
}

impl Default for AptConfig {
    fn default() -> Self {
        Self {
            codename: "jammy".to_string(),
            base_packages: ["ca-certificates", "curl", "gnupg", "tzdata", "locales"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// A package repository registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AptSourceConfig {
    /// File stem for the list and key files.
    pub name: String,

    /// Repository base URI.
    pub uri: String,

    /// Suite; the distribution codename when absent.
    #[serde(default)]
    pub suite: Option<String>,

    #[serde(default = "default_components")]
    pub components: Vec<String>,

    /// Armored signing key location.
    pub key_url: String,
}

fn default_components() -> Vec<String> {
    vec!["main".to_string()]
}

/// Pre-built pandora binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PandoraConfig {
    pub version: String,

    /// Download URL; `{version}` is substituted.
    pub url: String,

    /// Optional SHA-256 of the binary.
    pub sha256: Option<String>,
}

impl Default for PandoraConfig {
    fn default() -> Self {
        Self {
            version: "0.5.32".to_string(),
            url: "https://github.com/yandex/pandora/releases/download/v{version}/pandora_{version}_linux_amd64".to_string(),
            sha256: None,
        }
    }
}

/// Phantom from its package repository.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhantomConfig {
    pub source: AptSourceConfig,
    pub packages: Vec<String>,
}

impl Default for PhantomConfig {
    fn default() -> Self {
        Self {
            source: AptSourceConfig {
                name: "yandex-load".to_string(),
                uri: "https://ppa.launchpadcontent.net/yandex-load/main/ubuntu".to_string(),
                suite: None,
                components: default_components(),
                key_url: "https://keyserver.ubuntu.com/pks/lookup?op=get&search=0x6ACB0F7BE4EBC07D".to_string(),
            },
            packages: vec!["phantom".to_string(), "phantom-ssl".to_string()],
        }
    }
}

/// JMeter distribution archive and plugins.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JmeterConfig {
    pub version: String,

    /// Archive URL; `{version}` is substituted.
    pub url: String,

    /// Optional SHA-256 of the archive.
    pub sha256: Option<String>,

    /// Parent directory of the unpacked distribution.
    pub install_root: PathBuf,

    /// Java runtime package required by JMeter.
    pub java_package: String,

    /// Extra jars dropped into `lib/ext`.
    pub plugins: Vec<PluginArtifact>,
}

impl Default for JmeterConfig {
    fn default() -> Self {
        Self {
            version: "5.6.3".to_string(),
            url: "https://archive.apache.org/dist/jmeter/binaries/apache-jmeter-{version}.tgz".to_string(),
            sha256: None,
            install_root: PathBuf::from("/opt"),
            java_package: "openjdk-17-jre-headless".to_string(),
            plugins: vec![
                PluginArtifact {
                    url: "https://jmeter-plugins.org/get/".to_string(),
                    file: "jmeter-plugins-manager.jar".to_string(),
                },
                PluginArtifact {
                    url: "https://repo1.maven.org/maven2/kg/apc/cmdrunner/2.3/cmdrunner-2.3.jar".to_string(),
                    file: "cmdrunner-2.3.jar".to_string(),
                },
            ],
        }
    }
}

/// A single downloadable jar.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginArtifact {
    pub url: String,
    pub file: String,
}

/// Telegraf from the vendor repository.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegrafConfig {
    pub source: AptSourceConfig,
}

impl Default for TelegrafConfig {
    fn default() -> Self {
        Self {
            source: AptSourceConfig {
                name: "influxdata".to_string(),
                uri: "https://repos.influxdata.com/debian".to_string(),
                suite: Some("stable".to_string()),
                components: default_components(),
                key_url: "https://repos.influxdata.com/influxdata-archive_compat.key".to_string(),
            },
        }
    }
}

/// Extra cleanup targets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Additional logical paths removed after every run.
    pub extra_paths: Vec<PathBuf>,
}

/// Substitute `{version}` in a URL template.
pub fn render_url(template: &str, version: &str) -> String {
    template.replace("{version}", version)
}
