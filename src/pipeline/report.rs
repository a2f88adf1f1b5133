// =============================================================================
// Scan Report - the durable, append-only audit record of one run
// =============================================================================
//
// One JSON document per run, written once into the reports directory as
//   scan_<UTC timestamp>_<run-id prefix>.json
// The file is opened with `create_new`, so a run can never overwrite another
// run's report even when several runs share a directory.
// =============================================================================

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::allocation::AllocationPlan;
use crate::config::PolicyConfig;
use crate::decision_envelope::CandidateDecision;
use crate::error::ScanError;
use crate::pipeline::diagnostics::{Diagnostic, ScanStage, StageStatus};
use crate::ranker::{NewsDiagnostic, Recommendation};
use crate::regime::RegimeState;

/// Overall outcome of a run, as surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Degraded,
    Failed,
}

impl RunStatus {
    /// `Failed` when the run aborted, `Degraded` when any stage was not ok.
    pub fn summarize(aborted: bool, diagnostics: &[Diagnostic]) -> Self {
        if aborted {
            Self::Failed
        } else if diagnostics.iter().any(|d| d.status != StageStatus::Ok) {
            Self::Degraded
        } else {
            Self::Ok
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Degraded => write!(f, "degraded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(default)]
    pub failed_stage: Option<ScanStage>,
    pub watchlist: Vec<String>,
    pub top_n: usize,
    pub policy_fingerprint: String,
    /// Verbatim policy the run was scored under.
    pub policy: PolicyConfig,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub allocation: AllocationPlan,
    #[serde(default)]
    pub decisions: Vec<CandidateDecision>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    pub regime: RegimeState,
    #[serde(default)]
    pub news: NewsDiagnostic,
}

impl Report {
    /// Empty report for a run that has just started.
    pub fn new(
        run_id: impl Into<String>,
        generated_at: DateTime<Utc>,
        watchlist: Vec<String>,
        top_n: usize,
        policy: &PolicyConfig,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            generated_at,
            status: RunStatus::Ok,
            failed_stage: None,
            watchlist,
            top_n,
            policy_fingerprint: policy.fingerprint(),
            policy: policy.clone(),
            recommendations: Vec::new(),
            allocation: AllocationPlan::default(),
            decisions: Vec::new(),
            diagnostics: Vec::new(),
            regime: RegimeState::neutral(),
            news: NewsDiagnostic::default(),
        }
    }

    pub fn diagnostic(&self, stage: ScanStage) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|d| d.stage == stage)
    }

    /// Unique, timestamp-sortable file name.
    pub fn file_name(&self) -> String {
        let prefix = self.run_id.split('-').next().unwrap_or("run");
        format!(
            "scan_{}_{}.json",
            self.generated_at.format("%Y%m%dT%H%M%S%3fZ"),
            prefix
        )
    }
}

// =============================================================================
// ReportStore
// =============================================================================

#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the report. Never overwrites an existing file.
    pub async fn persist(&self, report: &Report) -> Result<PathBuf, ScanError> {
        let path = self.dir.join(report.file_name());
        let fail = |message: String| ScanError::Persistence {
            path: path.display().to_string(),
            message,
        };

        let body = serde_json::to_vec_pretty(report).map_err(|e| fail(format!("serialize: {e}")))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| fail(format!("create reports dir: {e}")))?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| fail(format!("open: {e}")))?;
        file.write_all(&body).await.map_err(|e| fail(format!("write: {e}")))?;
        file.flush().await.map_err(|e| fail(format!("flush: {e}")))?;

        info!(path = %path.display(), status = %report.status, "report persisted");
        Ok(path)
    }

    /// Load up to `limit` of the most recent reports, newest first.
    /// Unreadable files are skipped with a warning.
    pub fn load_recent(&self, limit: usize) -> Result<Vec<Report>, ScanError> {
        if !self.dir.exists() {
            warn!(dir = %self.dir.display(), "reports directory does not exist");
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.dir).map_err(|e| ScanError::Persistence {
            path: self.dir.display().to_string(),
            message: format!("read dir: {e}"),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("scan_") && n.ends_with(".json"))
            })
            .collect();
        paths.sort();
        paths.reverse();

        let mut reports = Vec::new();
        for path in paths.into_iter().take(limit) {
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str::<Report>(&s).map_err(|e| e.to_string()));
            match parsed {
                Ok(report) => reports.push(report),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable report"),
            }
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(run_id: &str) -> Report {
        Report::new(
            run_id,
            Utc::now(),
            vec!["AAA".into()],
            5,
            &PolicyConfig::default(),
        )
    }

    #[test]
    fn status_summary_follows_diagnostics() {
        let ok = Diagnostic {
            stage: ScanStage::FetchNews,
            status: StageStatus::Ok,
            duration_ms: 1.0,
            note: None,
            error: None,
        };
        let failed = Diagnostic {
            status: StageStatus::Failed,
            ..ok.clone()
        };
        assert_eq!(RunStatus::summarize(false, &[ok.clone()]), RunStatus::Ok);
        assert_eq!(RunStatus::summarize(false, &[ok.clone(), failed]), RunStatus::Degraded);
        assert_eq!(RunStatus::summarize(true, &[ok]), RunStatus::Failed);
    }

    #[tokio::test]
    async fn persisted_report_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path().join("reports"));
        let r = report("0f1e2d3c-aaaa-bbbb-cccc-000000000000");
        let path = store.persist(&r).await.unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("scan_"));
        assert!(path.to_str().unwrap().ends_with("_0f1e2d3c.json"));

        let loaded = store.load_recent(10).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].run_id, r.run_id);
        assert_eq!(loaded[0].policy_fingerprint, r.policy_fingerprint);
    }

    #[tokio::test]
    async fn persist_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let r = report("11111111-0000-0000-0000-000000000000");
        store.persist(&r).await.unwrap();
        let err = store.persist(&r).await.unwrap_err();
        assert!(matches!(err, ScanError::Persistence { .. }));
    }

    #[test]
    fn load_skips_garbage_and_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scan_garbage.json"), "nope").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let store = ReportStore::new(dir.path());
        assert!(store.load_recent(10).unwrap().is_empty());
        assert!(ReportStore::new(dir.path().join("missing")).load_recent(10).unwrap().is_empty());
    }
}
