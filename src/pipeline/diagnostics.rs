// =============================================================================
// Stage Diagnostics - tagged per-stage outcomes
// =============================================================================
//
// Every stage function returns a `StageOutcome` instead of raising:
//
//   Ok(value)                   complete data
//   Degraded { value, note }    partial or empty data, pipeline continues
//   Failed(error)               the orchestrator decides: substitute defaults
//                               or abort the run
//
// `run_stage` / `timed` wrap a stage, measure it, log it and turn the outcome
// into a `Diagnostic` for the report.
// =============================================================================

use std::future::Future;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::ScanError;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStage {
    FetchSnapshots,
    FetchNews,
    Rank,
    Allocate,
    PersistReport,
}

impl ScanStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchSnapshots => "fetch_snapshots",
            Self::FetchNews => "fetch_news",
            Self::Rank => "rank",
            Self::Allocate => "allocate",
            Self::PersistReport => "persist_report",
        }
    }
}

impl std::fmt::Display for ScanStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Ok,
    Degraded,
    Failed,
}

/// Recorded execution outcome of one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: ScanStage,
    pub status: StageStatus,
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tagged result of a stage function.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Ok(T),
    Degraded { value: T, note: String },
    Failed(ScanError),
}

impl<T> StageOutcome<T> {
    pub fn degraded(value: T, note: impl Into<String>) -> Self {
        Self::Degraded {
            value,
            note: note.into(),
        }
    }
}

impl<T> From<Result<T, ScanError>> for StageOutcome<T> {
    fn from(result: Result<T, ScanError>) -> Self {
        match result {
            Ok(v) => Self::Ok(v),
            Err(e) => Self::Failed(e),
        }
    }
}

fn finish<T>(
    stage: ScanStage,
    started: Instant,
    outcome: StageOutcome<T>,
) -> (Result<T, ScanError>, Diagnostic) {
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    let diag = |status, note, error| Diagnostic {
        stage,
        status,
        duration_ms,
        note,
        error,
    };

    match outcome {
        StageOutcome::Ok(value) => {
            info!(stage = %stage, duration_ms = format!("{:.1}", duration_ms), "stage ok");
            (Ok(value), diag(StageStatus::Ok, None, None))
        }
        StageOutcome::Degraded { value, note } => {
            warn!(stage = %stage, duration_ms = format!("{:.1}", duration_ms), note = %note, "stage degraded");
            (Ok(value), diag(StageStatus::Degraded, Some(note), None))
        }
        StageOutcome::Failed(e) => {
            error!(stage = %stage, duration_ms = format!("{:.1}", duration_ms), error = %e, "stage failed");
            let message = e.to_string();
            (Err(e), diag(StageStatus::Failed, None, Some(message)))
        }
    }
}

/// Run an async stage and record its diagnostic.
pub async fn run_stage<T, F>(stage: ScanStage, fut: F) -> (Result<T, ScanError>, Diagnostic)
where
    F: Future<Output = StageOutcome<T>>,
{
    let started = Instant::now();
    let outcome = fut.await;
    finish(stage, started, outcome)
}

/// Run a synchronous stage and record its diagnostic.
pub fn timed<T>(stage: ScanStage, f: impl FnOnce() -> StageOutcome<T>) -> (Result<T, ScanError>, Diagnostic) {
    let started = Instant::now();
    let outcome = f();
    finish(stage, started, outcome)
}
