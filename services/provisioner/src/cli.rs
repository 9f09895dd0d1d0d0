//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Prepare a host to run the load-testing agent.
#[derive(Debug, Parser)]
#[command(name = "provision")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Also write JSON logs to this file (capped at 1 MiB).
    #[arg(long, global = true, env = "LOADPREP_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the full provisioning sequence.
    Run(RunArgs),

    /// List known features and the default selection.
    Features(ConfigArgs),

    /// Show the provisioning marker, if any.
    Status(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Configuration file (TOML).
    #[arg(long, env = "LOADPREP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Target filesystem root.
    #[arg(long, env = "LOADPREP_ROOT")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub target: ConfigArgs,

    /// Comma-separated feature list. Blank selects the defaults.
    #[arg(long, env = "LOADPREP_FEATURES")]
    pub features: Option<String>,

    /// Python runtime version, `<major>.<minor>`.
    #[arg(long, env = "LOADPREP_RUNTIME_VERSION")]
    pub runtime_version: Option<String>,

    /// Record system commands instead of running them. Requires a non-host --root.
    #[arg(long)]
    pub dry_run: bool,

    /// Agent command to exec into after a successful run.
    #[arg(last = true)]
    pub agent: Vec<String>,
}
