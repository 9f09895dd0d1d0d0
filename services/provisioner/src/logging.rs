//! Logging initialization.
//!
//! Human-readable events go to stderr. With a log file configured, the same
//! events are also written there as JSON, capped in size, so a failed image
//! build leaves a machine-readable audit trail behind.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "LOADPREP_LOG";

/// Log file budget (1 MiB).
const LOG_FILE_BUDGET: u64 = 1024 * 1024;

/// Writer that accepts everything but forwards at most `remaining` bytes.
struct Truncating<W> {
    inner: W,
    remaining: u64,
}

impl<W: Write> Write for Truncating<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let take = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        if take > 0 {
            let written = self.inner.write(&buf[..take])?;
            self.remaining -= written as u64;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn open_log_file(path: &Path) -> io::Result<Truncating<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(Truncating {
        inner: File::create(path)?,
        remaining: LOG_FILE_BUDGET,
    })
}

/// Install the global subscriber.
pub fn init(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    // `Mutex<W: Write>` is a `MakeWriter`.
    let file_layer = log_file
        .map(open_log_file)
        .transpose()?
        .map(|file| tracing_subscriber::fmt::layer().json().with_writer(Mutex::new(file)));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_file_stops_at_budget() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs/provision.log");

        let mut writer = open_log_file(&path).unwrap();
        writer.remaining = 100;
        assert_eq!(writer.write(&[b'x'; 60]).unwrap(), 60);
        assert_eq!(writer.write(&[b'y'; 60]).unwrap(), 60);
        assert_eq!(writer.write(b"dropped").unwrap(), 7);
        writer.flush().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.len(), 100);
        assert!(contents.ends_with(&"y".repeat(40)));
    }

    #[test]
    fn test_log_file_is_truncated_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("provision.log");
        fs::write(&path, "previous run\n").unwrap();

        let mut writer = open_log_file(&path).unwrap();
        writer.write_all(b"fresh\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
    }
}
