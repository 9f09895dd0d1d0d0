//! Top-level provisioning sequence.
//!
//! ```text
//! Init -+-> marker or lock present -> AlreadyProvisioned (exit 1)
//!       |
//!       +-> Baseline -> RuntimeInstall -> FeatureInstall* -> SystemTuning -> Marker
//!              |  first failure skips the remaining install stages
//!              +-> Cleanup -> Done
//! ```
//!
//! Cleanup runs after every run that passed the reentry check. The exit
//! code is 0 only when every stage succeeded.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use loadprep_fetch::ArtifactFetcher;
use tracing::{error, info};

use crate::baseline;
use crate::cleanup::{Cleanup, CleanupReport};
use crate::command::CommandRunner;
use crate::config::ProvisionConfig;
use crate::context::InstallContext;
use crate::error::ProvisionError;
use crate::layout::Layout;
use crate::marker::{MarkerRecord, ProvisionMarker};
use crate::registry::{FeatureRegistry, FeatureSelection, FeatureSpec};
use crate::runtime::RuntimeInstaller;
use crate::stage::{self, StageResult};
use crate::tuner::SystemTuner;

/// Orchestrator phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    AlreadyProvisioned,
    Baseline,
    RuntimeInstall,
    FeatureInstall,
    SystemTuning,
    Marker,
    Cleanup,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Init => "init",
            Phase::AlreadyProvisioned => "already_provisioned",
            Phase::Baseline => "baseline",
            Phase::RuntimeInstall => "runtime_install",
            Phase::FeatureInstall => "feature_install",
            Phase::SystemTuning => "system_tuning",
            Phase::Marker => "marker",
            Phase::Cleanup => "cleanup",
            Phase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStatus {
    Provisioned,
    AlreadyProvisioned { marker: PathBuf },
    Failed { stage: String, code: String, reason: String },
}

/// Everything a run produced.
#[derive(Debug)]
pub struct ProvisionReport {
    pub status: ProvisionStatus,
    pub stages: Vec<StageResult>,
    /// Resolved feature names, in install order.
    pub features: Vec<String>,
    /// Absent when the run was rejected before doing anything.
    pub cleanup: Option<CleanupReport>,
}

impl ProvisionReport {
    pub fn succeeded(&self) -> bool {
        self.status == ProvisionStatus::Provisioned
    }

    pub fn exit_code(&self) -> u8 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.name == name)
    }
}

impl From<&ProvisionReport> for ExitCode {
    fn from(report: &ProvisionReport) -> Self {
        ExitCode::from(report.exit_code())
    }
}

/// Runs the provisioning sequence against one target root.
pub struct Orchestrator {
    config: ProvisionConfig,
    layout: Layout,
    registry: FeatureRegistry,
    runner: Arc<dyn CommandRunner>,
    fetcher: ArtifactFetcher,
}

impl Orchestrator {
    pub fn new(
        config: ProvisionConfig,
        registry: FeatureRegistry,
        runner: Arc<dyn CommandRunner>,
        fetcher: ArtifactFetcher,
    ) -> Self {
        let layout = Layout::new(&config.root);
        Self {
            config,
            layout,
            registry,
            runner,
            fetcher,
        }
    }

    pub fn marker(&self) -> ProvisionMarker {
        ProvisionMarker::new(self.layout.resolve(&self.config.marker_path))
    }

    pub async fn run(&self, selection: Option<&str>, runtime_version: &str) -> ProvisionReport {
        transition(Phase::Init);
        let marker = self.marker();

        let _lock = match marker.acquire() {
            Ok(lock) => lock,
            Err(ProvisionError::Reentry(path)) => {
                transition(Phase::AlreadyProvisioned);
                error!(
                    stage = "init",
                    code = "reentry",
                    marker = %path.display(),
                    "provisioning refused: machine already provisioned or a run is in progress"
                );
                return ProvisionReport {
                    status: ProvisionStatus::AlreadyProvisioned { marker: path },
                    stages: Vec::new(),
                    features: Vec::new(),
                    cleanup: None,
                };
            }
            Err(e) => {
                error!(stage = "init", code = e.reason_code(), error = %e, "provisioning aborted");
                return ProvisionReport {
                    status: ProvisionStatus::Failed {
                        stage: "init".to_string(),
                        code: e.reason_code().to_string(),
                        reason: e.to_string(),
                    },
                    stages: Vec::new(),
                    features: Vec::new(),
                    cleanup: None,
                };
            }
        };

        let features = FeatureSelection::parse(selection, &self.config.default_features);
        let resolved = self.registry.resolve(&features);
        let feature_names: Vec<String> = resolved.iter().map(|s| s.name.clone()).collect();
        info!(
            requested = ?features.names(),
            features = ?feature_names,
            runtime_version,
            root = %self.layout.root().display(),
            "provisioning started"
        );

        let ctx = InstallContext::new(
            &self.config,
            &self.layout,
            self.runner.as_ref(),
            &self.fetcher,
        );
        let mut stages: Vec<StageResult> = Vec::new();

        self.install(&ctx, &resolved, &feature_names, runtime_version, &mut stages)
            .await;

        let status = match stages.iter().find_map(|s| s.failure().map(|f| (s, f))) {
            Some((failed, (code, reason))) => {
                error!(stage = %failed.name, code, reason, "provisioning failed");
                ProvisionStatus::Failed {
                    stage: failed.name.clone(),
                    code: code.to_string(),
                    reason: reason.to_string(),
                }
            }
            None => ProvisionStatus::Provisioned,
        };

        transition(Phase::Cleanup);
        let cleanup = Cleanup::for_config(&self.config, ctx.transient_paths())
            .run(&self.layout, self.runner.as_ref())
            .await;

        transition(Phase::Done);
        info!(
            succeeded = status == ProvisionStatus::Provisioned,
            stages = stages.len(),
            cleanup_failures = cleanup.failures.len(),
            "provisioning finished"
        );

        ProvisionReport {
            status,
            stages,
            features: feature_names,
            cleanup: Some(cleanup),
        }
    }

    /// Run install stages until one fails.
    async fn install(
        &self,
        ctx: &InstallContext<'_>,
        resolved: &[&FeatureSpec],
        feature_names: &[String],
        runtime_version: &str,
        stages: &mut Vec<StageResult>,
    ) {
        transition(Phase::Baseline);
        if !record(stages, stage::run("baseline", || baseline::prepare(ctx)).await) {
            return;
        }

        transition(Phase::RuntimeInstall);
        let runtime = RuntimeInstaller::new(runtime_version, &self.config.runtime.source);
        if !record(stages, stage::run("runtime", || runtime.install(ctx)).await) {
            return;
        }

        transition(Phase::FeatureInstall);
        for spec in resolved {
            let procedure = self.registry.install_procedure(spec);
            if !record(stages, procedure.run(ctx).await) {
                return;
            }
        }

        transition(Phase::SystemTuning);
        let tuner = SystemTuner::new(&self.layout);
        let tuning = stage::run("tuning", || async { tuner.apply(&self.config.tuning) }).await;
        if !record(stages, tuning) {
            return;
        }

        transition(Phase::Marker);
        let marker = self.marker();
        let record_body = MarkerRecord::new(feature_names.to_vec(), runtime_version);
        let written = stage::run("marker", || async { marker.write(&record_body) }).await;
        record(stages, written);
    }
}

fn record(stages: &mut Vec<StageResult>, result: StageResult) -> bool {
    let ok = result.is_success();
    stages.push(result);
    ok
}

fn transition(phase: Phase) {
    info!(phase = %phase, "phase transition");
}
