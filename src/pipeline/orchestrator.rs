// =============================================================================
// Scan Orchestrator - one end-to-end run per invocation
// =============================================================================
//
// States:
//
//   fetch_snapshots ┐
//                   ├─> rank -> allocate -> persist_report -> done
//   fetch_news ─────┘
//
// The two fetches are independent and run concurrently, each under a bounded
// timeout (a timeout is reported exactly like a provider error). Stage rules:
//
//   - fetch_snapshots failure (or zero usable snapshots) aborts the run
//   - fetch_news failure substitutes empty news (news_score 0, no events)
//   - a run-fatal error in rank / allocate aborts the run
//   - an aborted run still persists a report with the diagnostics so far
//   - a persistence failure is surfaced to the caller as an error
// =============================================================================

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::allocation::{allocate, AllocationPlan};
use crate::config::PolicyConfig;
use crate::decision_envelope::{BlockingLayer, CandidateDecision};
use crate::error::ScanError;
use crate::pipeline::diagnostics::{run_stage, timed, Diagnostic, ScanStage, StageOutcome};
use crate::pipeline::report::{Report, ReportStore, RunStatus};
use crate::providers::{MarketDataProvider, NewsProvider};
use crate::ranker::{RankOutcome, Ranker};
use crate::types::{NewsItem, Snapshot};

/// Caller input for one run.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub watchlist: Vec<String>,
    pub top_n: usize,
    /// Symbols currently held (exempt from the chase filter).
    pub holdings: HashSet<String>,
}

/// A completed (possibly failed) run whose report reached disk.
#[derive(Debug, Clone)]
pub struct ScanRun {
    pub report: Report,
    pub report_path: PathBuf,
    pub persist_diagnostic: Diagnostic,
}

impl ScanRun {
    /// Ok and degraded runs count as success for the caller.
    pub fn succeeded(&self) -> bool {
        self.report.status != RunStatus::Failed
    }
}

pub struct ScanOrchestrator {
    market: Arc<dyn MarketDataProvider>,
    news: Arc<dyn NewsProvider>,
    policy: PolicyConfig,
    store: ReportStore,
    timeout: Duration,
}

/// Trim, drop blanks and de-duplicate (case-insensitive), keeping order.
fn normalize_watchlist(symbols: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && seen.insert(s.to_uppercase()))
        .map(str::to_string)
        .collect()
}

async fn with_timeout<T, F>(provider: &str, limit: Duration, fut: F) -> Result<T, ScanError>
where
    F: Future<Output = Result<T, ScanError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ScanError::Timeout {
            provider: provider.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

impl ScanOrchestrator {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        news: Arc<dyn NewsProvider>,
        policy: PolicyConfig,
        store: ReportStore,
        timeout: Duration,
    ) -> Self {
        Self {
            market,
            news,
            policy,
            store,
            timeout,
        }
    }

    // -------------------------------------------------------------------------
    // Stage functions
    // -------------------------------------------------------------------------

    async fn fetch_snapshots(&self, watchlist: &[String]) -> StageOutcome<Vec<Snapshot>> {
        let snaps = match with_timeout(self.market.name(), self.timeout, self.market.get_snapshots(watchlist)).await {
            Ok(s) => s,
            Err(e) => return StageOutcome::Failed(e),
        };

        let invalid = snaps.iter().filter(|s| s.validate().is_err()).count();
        if snaps.len() == invalid {
            return StageOutcome::Failed(ScanError::provider(
                self.market.name(),
                format!("no usable snapshots for {} symbols", watchlist.len()),
            ));
        }

        let returned: HashSet<String> = snaps.iter().map(|s| s.symbol.trim().to_uppercase()).collect();
        let missing = watchlist
            .iter()
            .filter(|s| !returned.contains(&s.to_uppercase()))
            .count();

        let mut notes = Vec::new();
        if missing > 0 {
            notes.push(format!("missing {missing} of {} symbols", watchlist.len()));
        }
        if invalid > 0 {
            notes.push(format!("{invalid} invalid records excluded"));
        }
        if notes.is_empty() {
            StageOutcome::Ok(snaps)
        } else {
            StageOutcome::degraded(snaps, notes.join("; "))
        }
    }

    async fn fetch_news(&self, watchlist: &[String]) -> StageOutcome<Vec<NewsItem>> {
        let items = match with_timeout(self.news.name(), self.timeout, self.news.get_news(watchlist)).await {
            Ok(items) => items,
            Err(e) => return StageOutcome::Failed(e),
        };

        if items.is_empty() {
            return StageOutcome::degraded(items, "news provider returned 0 items");
        }
        let invalid = items.iter().filter(|n| n.validate().is_err()).count();
        if invalid > 0 {
            return StageOutcome::degraded(items, format!("{invalid} invalid news items excluded"));
        }
        StageOutcome::Ok(items)
    }

    // -------------------------------------------------------------------------
    // Run
    // -------------------------------------------------------------------------

    /// Execute one run. Returns `Err` only when the report cannot be
    /// persisted; every other failure is recorded in the report.
    pub async fn run(&self, request: &ScanRequest) -> Result<ScanRun, ScanError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let watchlist = normalize_watchlist(&request.watchlist);
        let holdings: HashSet<String> = request
            .holdings
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        info!(
            run_id = %run_id,
            symbols = watchlist.len(),
            top_n = request.top_n,
            market = self.market.name(),
            news = self.news.name(),
            "scan started"
        );

        let mut report = Report::new(&run_id, started_at, watchlist.clone(), request.top_n, &self.policy);

        // --- fetch_snapshots || fetch_news ----------------------------------
        let ((snapshots, snap_diag), (news, news_diag)) = tokio::join!(
            run_stage(ScanStage::FetchSnapshots, self.fetch_snapshots(&watchlist)),
            run_stage(ScanStage::FetchNews, self.fetch_news(&watchlist)),
        );
        report.diagnostics.push(snap_diag);
        report.diagnostics.push(news_diag);

        let snapshots = match snapshots {
            Ok(s) => s,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "no snapshots, aborting run");
                return self.abort(report, ScanStage::FetchSnapshots).await;
            }
        };
        let news = news.unwrap_or_else(|e| {
            warn!(run_id = %run_id, error = %e, "news unavailable, scoring with neutral news");
            Vec::new()
        });

        // --- rank -----------------------------------------------------------
        let (ranked, rank_diag) = timed(ScanStage::Rank, || {
            StageOutcome::from(
                Ranker::new(&self.policy)
                    .and_then(|ranker| ranker.rank(&snapshots, &news, &holdings, started_at, request.top_n)),
            )
        });
        report.diagnostics.push(rank_diag);
        let ranked = match ranked {
            Ok(r) => r,
            Err(e) if e.is_run_fatal() => return self.abort(report, ScanStage::Rank).await,
            Err(_) => RankOutcome::empty(),
        };

        // --- allocate -------------------------------------------------------
        let (plan, alloc_diag) = timed(ScanStage::Allocate, || {
            StageOutcome::from(allocate(&ranked.recommendations, &self.policy))
        });
        report.diagnostics.push(alloc_diag);
        let plan = match plan {
            Ok(p) => p,
            Err(e) if e.is_run_fatal() => return self.abort(report, ScanStage::Allocate).await,
            Err(_) => AllocationPlan::default(),
        };

        // --- assemble -------------------------------------------------------
        let returned: HashSet<String> = snapshots.iter().map(|s| s.symbol.trim().to_uppercase()).collect();
        report.decisions = watchlist
            .iter()
            .filter(|s| !returned.contains(&s.to_uppercase()))
            .map(|s| {
                CandidateDecision::excluded(
                    s.clone(),
                    BlockingLayer::MissingSnapshot,
                    None,
                    "no snapshot returned by market provider",
                )
            })
            .chain(ranked.decisions)
            .collect();
        report.recommendations = ranked.recommendations;
        report.allocation = plan;
        report.regime = ranked.regime;
        report.news = ranked.news;
        report.status = RunStatus::summarize(false, &report.diagnostics);

        self.persist(report).await
    }

    async fn abort(&self, mut report: Report, stage: ScanStage) -> Result<ScanRun, ScanError> {
        report.status = RunStatus::Failed;
        report.failed_stage = Some(stage);
        self.persist(report).await
    }

    async fn persist(&self, report: Report) -> Result<ScanRun, ScanError> {
        let (path, persist_diagnostic) = run_stage(
            ScanStage::PersistReport,
            async { StageOutcome::from(self.store.persist(&report).await) },
        )
        .await;
        let report_path = path?;

        info!(
            run_id = %report.run_id,
            status = %report.status,
            recommendations = report.recommendations.len(),
            path = %report_path.display(),
            "scan finished"
        );

        Ok(ScanRun {
            report,
            report_path,
            persist_diagnostic,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::decision_envelope::Verdict;
    use crate::pipeline::diagnostics::StageStatus;
    use crate::providers::{MockMarketDataProvider, MockNewsProvider, NullNewsProvider};

    struct StaticMarket(Vec<Snapshot>);

    #[async_trait]
    impl MarketDataProvider for StaticMarket {
        fn name(&self) -> &str {
            "static"
        }
        async fn get_snapshots(&self, _symbols: &[String]) -> Result<Vec<Snapshot>, ScanError> {
            Ok(self.0.clone())
        }
    }

    struct FailingMarket;

    #[async_trait]
    impl MarketDataProvider for FailingMarket {
        fn name(&self) -> &str {
            "failing"
        }
        async fn get_snapshots(&self, _symbols: &[String]) -> Result<Vec<Snapshot>, ScanError> {
            Err(ScanError::provider("failing", "connection reset"))
        }
    }

    struct FailingNews;

    #[async_trait]
    impl NewsProvider for FailingNews {
        fn name(&self) -> &str {
            "failing"
        }
        async fn get_news(&self, _symbols: &[String]) -> Result<Vec<NewsItem>, ScanError> {
            Err(ScanError::provider("failing", "HTTP 503"))
        }
    }

    struct SlowNews;

    #[async_trait]
    impl NewsProvider for SlowNews {
        fn name(&self) -> &str {
            "slow"
        }
        async fn get_news(&self, _symbols: &[String]) -> Result<Vec<NewsItem>, ScanError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    fn snap(symbol: &str, ret: f64) -> Snapshot {
        Snapshot {
            symbol: symbol.into(),
            name: String::new(),
            price: 12.0,
            pe_ttm: Some(10.0),
            pb: Some(1.0),
            roe: Some(20.0),
            revenue_growth: Some(15.0),
            return_20d: Some(ret),
            volume_ratio: Some(1.2),
            as_of: Utc::now(),
        }
    }

    fn universe() -> Vec<Snapshot> {
        let mut lag = snap("BBB", -5.0);
        lag.pe_ttm = None;
        vec![snap("AAA", 5.0), lag]
    }

    fn request(symbols: &[&str]) -> ScanRequest {
        ScanRequest {
            watchlist: symbols.iter().map(|s| s.to_string()).collect(),
            top_n: 5,
            holdings: HashSet::new(),
        }
    }

    fn orchestrator(
        market: Arc<dyn MarketDataProvider>,
        news: Arc<dyn NewsProvider>,
        dir: &std::path::Path,
    ) -> ScanOrchestrator {
        ScanOrchestrator::new(
            market,
            news,
            PolicyConfig::default(),
            ReportStore::new(dir),
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn failing_news_degrades_but_completes() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(StaticMarket(universe())), Arc::new(FailingNews), dir.path());
        let run = orch.run(&request(&["AAA", "BBB"])).await.unwrap();

        assert!(run.succeeded());
        assert_eq!(run.report.status, RunStatus::Degraded);
        let news = run.report.diagnostic(ScanStage::FetchNews).unwrap();
        assert_eq!(news.status, StageStatus::Failed);
        assert!(news.error.as_deref().unwrap().contains("HTTP 503"));

        assert_eq!(run.report.recommendations.len(), 1);
        for rec in &run.report.recommendations {
            assert_eq!(rec.news_score, 0.0);
            assert_eq!(rec.news_event_count, 0);
        }
        assert!(run.report_path.exists());
    }

    #[tokio::test]
    async fn slow_news_times_out_like_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(StaticMarket(universe())), Arc::new(SlowNews), dir.path());
        let run = orch.run(&request(&["AAA", "BBB"])).await.unwrap();

        let news = run.report.diagnostic(ScanStage::FetchNews).unwrap();
        assert_eq!(news.status, StageStatus::Failed);
        assert!(news.error.as_deref().unwrap().contains("timed out"));
        assert_eq!(run.report.recommendations.len(), 1);
    }

    #[tokio::test]
    async fn empty_news_is_degraded_with_note() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(StaticMarket(universe())), Arc::new(NullNewsProvider), dir.path());
        let run = orch.run(&request(&["AAA", "BBB"])).await.unwrap();

        let news = run.report.diagnostic(ScanStage::FetchNews).unwrap();
        assert_eq!(news.status, StageStatus::Degraded);
        assert_eq!(news.note.as_deref(), Some("news provider returned 0 items"));
        let snaps = run.report.diagnostic(ScanStage::FetchSnapshots).unwrap();
        assert_eq!(snaps.status, StageStatus::Ok);
    }

    #[tokio::test]
    async fn snapshot_failure_aborts_but_still_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(FailingMarket), Arc::new(MockNewsProvider), dir.path());
        let run = orch.run(&request(&["AAA"])).await.unwrap();

        assert!(!run.succeeded());
        assert_eq!(run.report.failed_stage, Some(ScanStage::FetchSnapshots));
        assert!(run.report.recommendations.is_empty());
        assert!(run.report.diagnostic(ScanStage::Rank).is_none());

        let on_disk: Report =
            serde_json::from_str(&std::fs::read_to_string(&run.report_path).unwrap()).unwrap();
        assert_eq!(on_disk.status, RunStatus::Failed);
        assert_eq!(on_disk.diagnostics.len(), 2);
    }

    #[tokio::test]
    async fn misconfigured_policy_aborts_at_rank() {
        let dir = tempfile::tempdir().unwrap();
        let mut policy = PolicyConfig::default();
        policy.weights.catalyst = 0.5;
        let orch = ScanOrchestrator::new(
            Arc::new(StaticMarket(universe())),
            Arc::new(NullNewsProvider),
            policy,
            ReportStore::new(dir.path()),
            Duration::from_millis(200),
        );
        let run = orch.run(&request(&["AAA", "BBB"])).await.unwrap();

        assert!(!run.succeeded());
        let rank = run.report.diagnostic(ScanStage::Rank).unwrap();
        assert_eq!(rank.status, StageStatus::Failed);
        assert!(rank.error.as_deref().unwrap().contains("composition error"));
        assert!(run.report.diagnostic(ScanStage::Allocate).is_none());

        let on_disk: Report =
            serde_json::from_str(&std::fs::read_to_string(&run.report_path).unwrap()).unwrap();
        assert_eq!(on_disk.status, RunStatus::Failed);
        assert_eq!(on_disk.failed_stage, Some(ScanStage::Rank));
        assert!(on_disk.recommendations.is_empty());
        assert!(on_disk.allocation.allocations.is_empty());
        assert_eq!(on_disk.diagnostics.len(), 3);
    }

    #[tokio::test]
    async fn missing_symbols_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(StaticMarket(universe())), Arc::new(NullNewsProvider), dir.path());
        let run = orch.run(&request(&["AAA", "BBB", "CCC"])).await.unwrap();

        let snaps = run.report.diagnostic(ScanStage::FetchSnapshots).unwrap();
        assert_eq!(snaps.status, StageStatus::Degraded);
        let missing = run
            .report
            .decisions
            .iter()
            .find(|d| d.symbol == "CCC")
            .unwrap();
        assert_eq!(missing.blocking_layer, Some(BlockingLayer::MissingSnapshot));
        assert!(run
            .report
            .decisions
            .iter()
            .any(|d| d.symbol == "AAA" && d.verdict == Verdict::Selected));
    }

    #[tokio::test]
    async fn allocation_respects_policy() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(StaticMarket(universe())), Arc::new(NullNewsProvider), dir.path());
        let run = orch.run(&request(&["AAA", "BBB"])).await.unwrap();

        let plan = &run.report.allocation;
        assert_eq!(plan.allocations.len(), 1);
        assert!(plan.allocated <= 0.8 + 1e-9);
        assert!(plan.allocations[0].weight <= 0.2 + 1e-9);
    }

    #[tokio::test]
    async fn concurrent_runs_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            Arc::new(MockMarketDataProvider),
            Arc::new(MockNewsProvider),
            dir.path(),
        );
        let req = request(&["600000", "000001", "300750"]);
        let (a, b) = tokio::join!(orch.run(&req), orch.run(&req));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.report_path, b.report_path);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn unwritable_store_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let orch = orchestrator(
            Arc::new(StaticMarket(universe())),
            Arc::new(NullNewsProvider),
            &blocker.join("reports"),
        );
        let err = orch.run(&request(&["AAA"])).await.unwrap_err();
        assert!(matches!(err, ScanError::Persistence { .. }));
    }

    #[test]
    fn watchlist_is_normalized() {
        let list = normalize_watchlist(&[
            " AAA ".to_string(),
            "".to_string(),
            "aaa".to_string(),
            "BBB".to_string(),
        ]);
        assert_eq!(list, vec!["AAA".to_string(), "BBB".to_string()]);
    }
}
