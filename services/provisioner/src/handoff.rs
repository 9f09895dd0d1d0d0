//! Hand-off to the agent entrypoint after a successful run.

use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;

/// Replace the current process with `argv`.
///
/// Only returns on failure: an empty argv, or `exec` itself failing.
pub fn exec(argv: &[String]) -> io::Error {
    let Some((program, args)) = argv.split_first() else {
        return io::Error::new(io::ErrorKind::InvalidInput, "empty agent command");
    };
    tracing::info!(program = %program, args = ?args, "handing off to agent");
    Command::new(program).args(args).exec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_argv_is_rejected() {
        assert_eq!(exec(&[]).kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_missing_binary_returns_error() {
        let err = exec(&["/nonexistent/loadprep-agent".to_string()]);
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
