//! System command execution.
//!
//! Every package-manager call and post-install probe goes through
//! [`CommandRunner`]. Commands are never retried: a non-zero exit is returned
//! as [`ProvisionError::Command`] and fails the stage.

use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::ProvisionError;

/// Maximum stderr bytes kept in an error.
const STDERR_TAIL_BYTES: usize = 2048;

/// A command line plus environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// `sh -c "command -v <binary>"`: succeeds when `binary` is on PATH.
    pub fn which(binary: &str) -> Self {
        Self::new("sh").arg("-c").arg(format!("command -v {}", binary))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Command execution interface.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion. Non-zero exit is an error.
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, ProvisionError>;
}

/// Runs commands on the host, or inside `chroot <root>` for a non-host root.
pub struct SystemRunner {
    chroot: Option<PathBuf>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self { chroot: None }
    }

    /// Run every command inside `root` via `chroot`.
    pub fn chrooted(root: impl Into<PathBuf>) -> Self {
        Self {
            chroot: Some(root.into()),
        }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, ProvisionError> {
        let cmd_line = cmd.to_string();
        debug!(command = %cmd_line, "running command");

        let mut command = match &self.chroot {
            Some(root) => {
                let mut c = tokio::process::Command::new("chroot");
                c.arg(root).arg(&cmd.program);
                c
            }
            None => tokio::process::Command::new(&cmd.program),
        };
        command
            .args(&cmd.args)
            .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        let output = command.output().await.map_err(|source| ProvisionError::Spawn {
            command: cmd_line.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(ProvisionError::Command {
                command: cmd_line,
                code: output.status.code(),
                stderr: tail(stderr.trim(), STDERR_TAIL_BYTES).to_string(),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Keep the last `max` bytes of `s`, on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// Runner that records commands instead of executing them.
///
/// Backs `--dry-run` and the test suites. Commands whose rendered line
/// contains a configured pattern fail with exit code 100.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<String>>,
    fail_on: Vec<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any command whose line contains `pattern`.
    pub fn failing_on(mut self, pattern: impl Into<String>) -> Self {
        self.fail_on.push(pattern.into());
        self
    }

    /// Every command line seen, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whether a recorded command line contains `needle`.
    pub fn ran(&self, needle: &str) -> bool {
        self.calls().iter().any(|line| line.contains(needle))
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, ProvisionError> {
        let line = cmd.to_string();
        info!(command = %line, "[DRY-RUN] command");
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line.clone());

        if self.fail_on.iter().any(|p| line.contains(p.as_str())) {
            return Err(ProvisionError::Command {
                command: line,
                code: Some(100),
                stderr: "simulated failure".to_string(),
            });
        }

        Ok(CommandOutput::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let cmd = CommandSpec::new("apt-get")
            .args(["install", "-y", "telegraf"])
            .env("DEBIAN_FRONTEND", "noninteractive");
        assert_eq!(cmd.to_string(), "apt-get install -y telegraf");
    }

    #[test]
    fn test_which() {
        assert_eq!(CommandSpec::which("phantom").to_string(), "sh -c command -v phantom");
    }

    #[test]
    fn test_tail_respects_char_boundary() {
        let s = "ééééé";
        let t = tail(s, 3);
        assert!(s.ends_with(t));
        assert!(t.len() <= 3);
    }

    #[tokio::test]
    async fn test_recording_runner_fails_on_pattern() {
        let runner = RecordingRunner::new().failing_on("python3.10");

        runner.run(&CommandSpec::new("apt-get").arg("update")).await.unwrap();
        let err = runner
            .run(&CommandSpec::new("apt-get").args(["install", "-y", "python3.10"]))
            .await
            .unwrap_err();

        assert_eq!(err.reason_code(), "command_failed");
        assert_eq!(runner.calls().len(), 2);
        assert!(runner.ran("apt-get update"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_reports_exit_code() {
        let runner = SystemRunner::new();

        let ok = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo provisioned"]))
            .await
            .unwrap();
        assert_eq!(ok.stdout.trim(), "provisioned");

        let err = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]))
            .await
            .unwrap_err();
        match err {
            ProvisionError::Command { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected Command error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_system_runner_spawn_failure() {
        let err = SystemRunner::new()
            .run(&CommandSpec::new("definitely-not-a-real-binary-loadprep"))
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "command_spawn_failed");
    }
}
