//! Shared test doubles for loadprep crates.
//!
//! - [`ScriptedTransport`]: a [`Transport`] that replays scripted responses per URL
//! - [`TarballBuilder`]: builds in-memory `.tar.gz` archives

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use loadprep_fetch::{Transport, TransportError};

#[derive(Default)]
struct Script {
    /// Responses consumed front to back.
    queued: VecDeque<Result<Bytes, TransportError>>,
    /// Returned once the queue is empty.
    fallback: Option<Result<Bytes, TransportError>>,
}

/// Transport that answers from a per-URL script and counts attempts.
///
/// URLs without a script answer `Rejected { status: 404 }`.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `url` with `body`.
    pub fn serve(self, url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.script(url, Vec::new(), Ok(body.into()))
    }

    /// Fail `failures` times with a transient error, then answer `body`.
    pub fn fail_then_serve(
        self,
        url: impl Into<String>,
        failures: usize,
        body: impl Into<Bytes>,
    ) -> Self {
        let queued = (0..failures)
            .map(|i| Err(TransportError::Transient(format!("connection reset ({})", i + 1))))
            .collect();
        self.script(url, queued, Ok(body.into()))
    }

    /// Fail every attempt with a transient error.
    pub fn always_fail(self, url: impl Into<String>) -> Self {
        self.script(
            url,
            Vec::new(),
            Err(TransportError::Transient("connection timed out".to_string())),
        )
    }

    /// Always answer `url` with an HTTP status the fetcher will not retry.
    pub fn reject(self, url: impl Into<String>, status: u16) -> Self {
        self.script(url, Vec::new(), Err(TransportError::Rejected { status }))
    }

    fn script(
        self,
        url: impl Into<String>,
        queued: Vec<Result<Bytes, TransportError>>,
        fallback: Result<Bytes, TransportError>,
    ) -> Self {
        self.scripts.lock().unwrap().insert(
            url.into(),
            Script {
                queued: queued.into(),
                fallback: Some(fallback),
            },
        );
        self
    }

    /// Number of attempts made against `url`.
    pub fn attempts(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    /// Every requested URL, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Whether `url` was requested at least once.
    pub fn was_requested(&self, url: &str) -> bool {
        self.attempts(url) > 0
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<Bytes, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());

        let mut scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get_mut(url) else {
            return Err(TransportError::Rejected { status: 404 });
        };

        if let Some(next) = script.queued.pop_front() {
            return next;
        }

        script
            .fallback
            .clone()
            .unwrap_or(Err(TransportError::Rejected { status: 404 }))
    }
}

/// Builds gzip-compressed tar archives in memory.
#[derive(Default)]
pub struct TarballBuilder {
    files: Vec<(String, Vec<u8>, u32)>,
}

impl TarballBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a regular file with mode 0644.
    pub fn file(self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.file_with_mode(path, contents, 0o644)
    }

    /// Add an executable file with mode 0755.
    pub fn executable(self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.file_with_mode(path, contents, 0o755)
    }

    pub fn file_with_mode(
        mut self,
        path: impl Into<String>,
        contents: impl Into<Vec<u8>>,
        mode: u32,
    ) -> Self {
        self.files.push((path.into(), contents.into(), mode));
        self
    }

    /// Encode as `.tar.gz` bytes.
    pub fn build(self) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::fast());
        let mut builder = tar::Builder::new(encoder);

        for (path, contents, mode) in &self.files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(*mode);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_slice())
                .unwrap();
        }

        let mut encoder = builder.into_inner().unwrap();
        encoder.flush().unwrap();
        encoder.finish().unwrap()
    }
}
