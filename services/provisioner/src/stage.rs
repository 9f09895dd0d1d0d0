//! Stages: named, audited units of provisioning work.
//!
//! A stage wraps an action with `ENTER`/`EXIT` log events and turns any
//! [`ProvisionError`] into a failed [`StageResult`]. Stages never decide
//! whether the run continues; the orchestrator does.

use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::ProvisionError;

/// Outcome of one stage invocation. There is no partial success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed { code: String, reason: String },
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failed { .. } => "failed",
        }
    }
}

/// Audit record for one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// The idempotency guard found the work already done.
    pub skipped: bool,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl StageResult {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Failure reason code and message, if the stage failed.
    pub fn failure(&self) -> Option<(&str, &str)> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Failed { code, reason } => Some((code, reason)),
        }
    }
}

/// Run `action` as a stage.
pub async fn run<F, Fut>(name: &str, action: F) -> StageResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), ProvisionError>>,
{
    run_guarded(name, || async { false }, action).await
}

/// Run `action` as a stage unless `guard` reports the work is already done.
///
/// A satisfied guard yields Success with `skipped` set and no side effects.
pub async fn run_guarded<G, GFut, F, Fut>(name: &str, guard: G, action: F) -> StageResult
where
    G: FnOnce() -> GFut,
    GFut: Future<Output = bool>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), ProvisionError>>,
{
    let started_at = Utc::now();
    let clock = Instant::now();
    info!(stage = %name, "ENTER");

    let skipped = guard().await;
    let outcome = if skipped {
        info!(stage = %name, "already satisfied, skipping");
        Outcome::Success
    } else {
        match action().await {
            Ok(()) => Outcome::Success,
            Err(e) => Outcome::Failed {
                code: e.reason_code().to_string(),
                reason: e.to_string(),
            },
        }
    };

    let result = StageResult {
        name: name.to_string(),
        started_at,
        ended_at: Utc::now(),
        skipped,
        outcome,
    };

    info!(
        stage = %name,
        outcome = result.outcome.label(),
        skipped,
        elapsed_ms = clock.elapsed().as_millis() as u64,
        "EXIT"
    );

    result
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[tokio::test]
    async fn test_success() {
        let result = run("baseline", || async { Ok(()) }).await;
        assert!(result.is_success());
        assert!(!result.skipped);
        assert_eq!(result.name, "baseline");
        assert!(result.ended_at >= result.started_at);
    }

    #[tokio::test]
    async fn test_failure_is_captured() {
        let result = run("runtime", || async {
            Err(ProvisionError::InvalidConfig("runtime version 'latest'".to_string()))
        })
        .await;

        assert!(!result.is_success());
        let (code, reason) = result.failure().unwrap();
        assert_eq!(code, "invalid_config");
        assert!(reason.contains("latest"));
    }

    #[tokio::test]
    async fn test_guard_short_circuits() {
        let ran = Cell::new(false);
        let result = run_guarded(
            "feature:pandora",
            || async { true },
            || async {
                ran.set(true);
                Ok(())
            },
        )
        .await;

        assert!(result.is_success());
        assert!(result.skipped);
        assert!(!ran.get());
    }

    #[tokio::test]
    async fn test_unsatisfied_guard_runs_action() {
        let ran = Cell::new(false);
        let result = run_guarded(
            "feature:pandora",
            || async { false },
            || async {
                ran.set(true);
                Ok(())
            },
        )
        .await;

        assert!(result.is_success());
        assert!(!result.skipped);
        assert!(ran.get());
    }

    #[test]
    fn test_result_serialization() {
        let result = StageResult {
            name: "tuning".to_string(),
            started_at: Utc::now(),
            ended_at: Utc::now(),
            skipped: false,
            outcome: Outcome::Failed {
                code: "tuning_failed".to_string(),
                reason: "permission denied".to_string(),
            },
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"outcome\":\"failed\""));
        assert!(json.contains("\"code\":\"tuning_failed\""));
    }
}
