//! Integration tests for the fetch retry loop.
//!
//! These use a scripted transport so every attempt is deterministic and no
//! sockets are opened.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use loadprep_fetch::{
    ArtifactDescriptor, ArtifactFetcher, ArtifactKind, BackoffPolicy, FetchError, RetryPolicy,
};
use loadprep_testing::ScriptedTransport;
use tempfile::TempDir;

const URL: &str = "https://github.com/yandex/pandora/releases/download/v0.5.32/pandora_0.5.32_linux_amd64";

fn test_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 10,
        connect_timeout: Duration::from_secs(3),
        timeout: Duration::from_secs(30),
        backoff: BackoffPolicy::none(),
    }
}

fn fetcher(transport: Arc<ScriptedTransport>) -> ArtifactFetcher {
    ArtifactFetcher::new(transport, test_policy())
}

fn dir_entries(dir: &TempDir) -> Vec<String> {
    fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_first_attempt_success() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(ScriptedTransport::new().serve(URL, "pandora-binary"));
    let dest = temp_dir.path().join("pandora");

    let path = fetcher(transport.clone())
        .fetch(&ArtifactDescriptor::new(URL, &dest, ArtifactKind::Binary))
        .await
        .unwrap();

    assert_eq!(path, dest);
    assert_eq!(fs::read(&dest).unwrap(), b"pandora-binary");
    assert_eq!(transport.attempts(URL), 1);
}

#[tokio::test]
async fn test_success_on_last_attempt_matches_first_attempt() {
    let first_dir = TempDir::new().unwrap();
    let retry_dir = TempDir::new().unwrap();

    let eager = Arc::new(ScriptedTransport::new().serve(URL, "pandora-binary"));
    let flaky = Arc::new(ScriptedTransport::new().fail_then_serve(URL, 9, "pandora-binary"));

    let first = fetcher(eager)
        .fetch(&ArtifactDescriptor::new(
            URL,
            first_dir.path().join("pandora"),
            ArtifactKind::Binary,
        ))
        .await
        .unwrap();
    let retried = fetcher(flaky.clone())
        .fetch(&ArtifactDescriptor::new(
            URL,
            retry_dir.path().join("pandora"),
            ArtifactKind::Binary,
        ))
        .await
        .unwrap();

    assert_eq!(flaky.attempts(URL), 10);
    assert_eq!(fs::read(first).unwrap(), fs::read(&retried).unwrap());
    assert_eq!(dir_entries(&retry_dir), vec!["pandora".to_string()]);
}

#[tokio::test]
async fn test_exhaustion_leaves_no_file() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(ScriptedTransport::new().always_fail(URL));
    let dest = temp_dir.path().join("pandora");

    let err = fetcher(transport.clone())
        .fetch(&ArtifactDescriptor::new(URL, &dest, ArtifactKind::Binary))
        .await
        .unwrap_err();

    match err {
        FetchError::Exhausted { attempts, url, .. } => {
            assert_eq!(attempts, 10);
            assert_eq!(url, URL);
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert_eq!(transport.attempts(URL), 10);
    assert!(!dest.exists());
    assert!(dir_entries(&temp_dir).is_empty());
}

#[tokio::test]
async fn test_rejected_status_is_not_retried() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(ScriptedTransport::new().reject(URL, 404));

    let err = fetcher(transport.clone())
        .fetch(&ArtifactDescriptor::new(
            URL,
            temp_dir.path().join("pandora"),
            ArtifactKind::Binary,
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Rejected { status: 404, .. }));
    assert_eq!(transport.attempts(URL), 1);
}

#[tokio::test]
async fn test_attempt_cap_respected() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(ScriptedTransport::new().fail_then_serve(URL, 3, "late"));
    let policy = RetryPolicy {
        max_attempts: 3,
        ..test_policy()
    };

    let err = ArtifactFetcher::new(transport.clone(), policy)
        .fetch(&ArtifactDescriptor::new(
            URL,
            temp_dir.path().join("pandora"),
            ArtifactKind::Binary,
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
    assert_eq!(transport.attempts(URL), 3);
}

#[tokio::test]
async fn test_existing_destination_replaced_atomically() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("jmeter.tgz");
    fs::write(&dest, "stale").unwrap();

    let transport = Arc::new(ScriptedTransport::new().serve(URL, "fresh"));
    fetcher(transport)
        .fetch(&ArtifactDescriptor::new(URL, &dest, ArtifactKind::Archive))
        .await
        .unwrap();

    assert_eq!(fs::read_to_string(&dest).unwrap(), "fresh");
}
