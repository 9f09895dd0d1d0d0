//! `provision`: prepares a host for the load-testing agent.
//!
//! Exit codes: 0 when the host is fully provisioned, 1 when the run was
//! refused, a stage failed, or setup failed.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use loadprep_fetch::{ArtifactFetcher, HttpTransport};
use loadprep_provisioner::layout::Layout;
use loadprep_provisioner::{
    handoff, logging, CommandRunner, FeatureRegistry, FeatureSelection, Orchestrator,
    ProvisionConfig, ProvisionMarker, RecordingRunner, SystemRunner,
};
use tracing::{error, info};

mod cli;

use cli::{Cli, Command, ConfigArgs, RunArgs};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(1);
    }

    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Features(args) => features(&args),
        Command::Status(args) => status(&args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "provision failed");
            let mut source = e.source();
            while let Some(cause) = source {
                error!(cause = %cause, "caused by");
                source = cause.source();
            }
            ExitCode::from(1)
        }
    }
}

/// Load the config file and apply CLI overrides.
fn load_config(args: &ConfigArgs) -> Result<ProvisionConfig> {
    let mut config = ProvisionConfig::load(args.config.as_deref())?;
    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    Ok(config)
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let mut config = load_config(&args.target)?;
    if let Some(version) = &args.runtime_version {
        config.runtime.version = version.clone();
    }
    let runtime_version = config.runtime.version.clone();

    let layout = Layout::new(&config.root);
    if args.dry_run && layout.is_host_root() {
        bail!("--dry-run writes files under the target root; pass a scratch --root");
    }

    let registry = FeatureRegistry::builtin(&config).context("Failed to build feature catalog")?;

    let runner: Arc<dyn CommandRunner> = if args.dry_run {
        Arc::new(RecordingRunner::new())
    } else if layout.is_host_root() {
        Arc::new(SystemRunner::new())
    } else {
        Arc::new(SystemRunner::chrooted(layout.root()))
    };

    let policy = config.fetch.retry_policy();
    let transport = HttpTransport::new(&policy).context("Failed to build HTTP client")?;
    let fetcher = ArtifactFetcher::new(Arc::new(transport), policy);

    info!(
        version = loadprep_provisioner::VERSION,
        root = %layout.root().display(),
        dry_run = args.dry_run,
        "provision starting"
    );

    let orchestrator = Orchestrator::new(config, registry, runner, fetcher);
    let report = orchestrator
        .run(args.features.as_deref(), &runtime_version)
        .await;

    if report.succeeded() && !args.agent.is_empty() {
        let err = handoff::exec(&args.agent);
        return Err(err).with_context(|| format!("Failed to exec agent {:?}", args.agent[0]));
    }

    Ok(ExitCode::from(&report))
}

fn features(args: &ConfigArgs) -> Result<ExitCode> {
    let config = load_config(args)?;
    let registry = FeatureRegistry::builtin(&config)?;
    let defaults = FeatureSelection::parse(None, &config.default_features);

    for name in registry.names() {
        let marker = if defaults.names().iter().any(|d| d == name) {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, name);
    }
    println!();
    println!("* default: {}", defaults.names().join(","));
    Ok(ExitCode::SUCCESS)
}

fn status(args: &ConfigArgs) -> Result<ExitCode> {
    let config = load_config(args)?;
    let marker = ProvisionMarker::new(Layout::new(&config.root).resolve(&config.marker_path));

    match marker.read()? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("not provisioned ({} absent)", marker.path().display());
            Ok(ExitCode::from(1))
        }
    }
}
