//! Shared fixtures for provisioner integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use loadprep_fetch::ArtifactFetcher;
use loadprep_provisioner::config::render_url;
use loadprep_provisioner::{
    CommandRunner, FeatureRegistry, Orchestrator, ProvisionConfig, RecordingRunner,
};
use loadprep_testing::{ScriptedTransport, TarballBuilder};
use tempfile::TempDir;

/// A scratch target root with a default configuration pointing at it.
pub struct Harness {
    pub root: TempDir,
    pub config: ProvisionConfig,
}

impl Harness {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let mut config = ProvisionConfig::default();
        config.root = root.path().to_path_buf();
        config.fetch.max_attempts = 3;
        config.fetch.backoff_base_ms = 0;
        config.fetch.backoff_max_ms = 0;
        Self { root, config }
    }

    /// Resolve a logical path under the scratch root.
    pub fn path(&self, logical: impl AsRef<Path>) -> PathBuf {
        let relative = logical.as_ref().strip_prefix("/").unwrap_or(logical.as_ref());
        self.root.path().join(relative)
    }

    /// Transport answering every artifact URL the default catalog needs.
    pub fn transport(&self) -> ScriptedTransport {
        let config = &self.config;
        let mut transport = ScriptedTransport::new()
            .serve(
                render_url(&config.pandora.url, &config.pandora.version),
                "#!/bin/sh\necho pandora\n",
            )
            .serve(
                render_url(&config.jmeter.url, &config.jmeter.version),
                jmeter_tarball(&config.jmeter.version),
            )
            .serve(config.runtime.source.key_url.clone(), "deadsnakes-key")
            .serve(config.phantom.source.key_url.clone(), "yandex-load-key")
            .serve(config.telegraf.source.key_url.clone(), "influxdata-key");

        for plugin in &config.jmeter.plugins {
            transport = transport.serve(plugin.url.clone(), format!("jar:{}", plugin.file));
        }
        transport
    }

    pub fn orchestrator(
        &self,
        transport: Arc<ScriptedTransport>,
        runner: Arc<RecordingRunner>,
    ) -> Orchestrator {
        let registry = FeatureRegistry::builtin(&self.config).unwrap();
        let fetcher = ArtifactFetcher::new(transport, self.config.fetch.retry_policy());
        let runner: Arc<dyn CommandRunner> = runner;
        Orchestrator::new(self.config.clone(), registry, runner, fetcher)
    }
}

/// Minimal JMeter distribution: launcher plus one library.
pub fn jmeter_tarball(version: &str) -> Vec<u8> {
    let top = format!("apache-jmeter-{}", version);
    TarballBuilder::new()
        .executable(format!("{}/bin/jmeter", top), "#!/bin/sh\necho jmeter\n")
        .file(format!("{}/lib/ApacheJMeter_core.jar", top), "core")
        .file(format!("{}/LICENSE", top), "Apache-2.0")
        .build()
}

/// Whether the file at `path` has an execute bit.
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
