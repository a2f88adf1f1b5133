// =============================================================================
// Evaluation Aggregator - post-hoc attribution over persisted reports
// =============================================================================
//
// Joins past recommendations with realized outcomes on (symbol, report date)
// and computes sample count, win rate, mean and median return per bucket:
//
//   score     70+ / 60-70 / <60
//   event     dominant news event of the recommendation
//   holding   0-1d / 1-3d / 3-7d / 7d+
//   period    day / ISO week / month of entry
//
// Purely aggregative. A bucket without enough samples yields an explicit
// `insufficient_sample` marker rather than failing the aggregation.
// =============================================================================

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::pipeline::diagnostics::{ScanStage, StageStatus};
use crate::pipeline::report::{Report, RunStatus};

const SCORE_BUCKETS: [&str; 3] = ["70+", "60-70", "<60"];
const HOLDING_BUCKETS: [&str; 4] = ["0-1d", "1-3d", "3-7d", "7d+"];
const NO_EVENT: &str = "no_event";

// Data-quality thresholds.
const MIN_HEALTHY_SAMPLES: usize = 30;
const MIN_NEWS_COVERAGE_PCT: f64 = 50.0;
const MIN_EVENT_DIVERSITY: usize = 3;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Realized result of acting on one recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealizedOutcome {
    pub symbol: String,
    /// Date of the report that recommended the symbol.
    pub entry_date: NaiveDate,
    /// Realized return, in percent.
    pub return_pct: f64,
    pub holding_days: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PeriodGranularity {
    Day,
    #[default]
    Week,
    Month,
}

impl PeriodGranularity {
    pub fn key(self, date: NaiveDate) -> String {
        match self {
            Self::Day => date.format("%Y-%m-%d").to_string(),
            Self::Week => {
                let week = date.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Self::Month => date.format("%Y-%m").to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BucketStats {
    Stats {
        sample_count: usize,
        /// Percentage of samples with a positive return.
        win_rate: f64,
        mean_return: f64,
        median_return: f64,
    },
    InsufficientSample {
        sample_count: usize,
    },
}

impl BucketStats {
    fn compute(returns: &[f64], min_samples: usize) -> Self {
        let n = returns.len();
        if n == 0 || n < min_samples {
            return Self::InsufficientSample { sample_count: n };
        }
        let mut sorted = returns.to_vec();
        sorted.sort_by(f64::total_cmp);
        let median_return = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        Self::Stats {
            sample_count: n,
            win_rate: returns.iter().filter(|r| **r > 0.0).count() as f64 / n as f64 * 100.0,
            mean_return: returns.iter().sum::<f64>() / n as f64,
            median_return,
        }
    }

    pub fn sample_count(&self) -> usize {
        match self {
            Self::Stats { sample_count, .. } | Self::InsufficientSample { sample_count } => *sample_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketRow {
    pub bucket: String,
    pub stats: BucketStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDuration {
    pub runs: usize,
    pub mean_ms: f64,
    pub failures: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub reports_considered: usize,
    pub recommendations_considered: usize,
    pub matched_samples: usize,
    pub unmatched_outcomes: usize,
    pub overall: BucketStats,
    pub by_score: Vec<BucketRow>,
    pub by_event: Vec<BucketRow>,
    pub by_holding: Vec<BucketRow>,
    pub by_period: Vec<BucketRow>,
    /// Share of recommendations that carried at least one news event.
    pub news_coverage_pct: f64,
    /// Distinct dominant events among recommendations.
    pub event_diversity: usize,
    pub alerts: Vec<String>,
    pub stage_durations: BTreeMap<ScanStage, StageDuration>,
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

fn score_bucket(score: f64) -> &'static str {
    if score >= 70.0 {
        SCORE_BUCKETS[0]
    } else if score >= 60.0 {
        SCORE_BUCKETS[1]
    } else {
        SCORE_BUCKETS[2]
    }
}

fn holding_bucket(days: f64) -> &'static str {
    if days < 1.0 {
        HOLDING_BUCKETS[0]
    } else if days < 3.0 {
        HOLDING_BUCKETS[1]
    } else if days < 7.0 {
        HOLDING_BUCKETS[2]
    } else {
        HOLDING_BUCKETS[3]
    }
}

struct Sample {
    score: f64,
    event: String,
    holding_days: f64,
    period: String,
    return_pct: f64,
}

#[derive(Debug, Clone)]
pub struct EvaluationAggregator {
    granularity: PeriodGranularity,
    min_samples: usize,
}

impl Default for EvaluationAggregator {
    fn default() -> Self {
        Self::new(PeriodGranularity::default())
    }
}

impl EvaluationAggregator {
    pub fn new(granularity: PeriodGranularity) -> Self {
        Self {
            granularity,
            min_samples: 1,
        }
    }

    /// Buckets with fewer samples report `insufficient_sample`.
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(1);
        self
    }

    pub fn aggregate(&self, reports: &[Report], outcomes: &[RealizedOutcome]) -> EvaluationSummary {
        let mut by_key: HashMap<(String, NaiveDate), &RealizedOutcome> = HashMap::new();
        for o in outcomes {
            by_key
                .entry((o.symbol.trim().to_uppercase(), o.entry_date))
                .or_insert(o);
        }

        // Oldest first, so an outcome is credited to the earliest report that
        // recommended the symbol on its entry date.
        let mut usable: Vec<&Report> = reports.iter().filter(|r| r.status != RunStatus::Failed).collect();
        usable.sort_by_key(|r| r.generated_at);

        let mut samples = Vec::new();
        let mut used: HashSet<(String, NaiveDate)> = HashSet::new();
        let mut recs_total = 0usize;
        let mut recs_with_news = 0usize;
        let mut events: HashMap<String, usize> = HashMap::new();

        for report in &usable {
            let date = report.generated_at.date_naive();
            for rec in &report.recommendations {
                recs_total += 1;
                if rec.news_event_count > 0 {
                    recs_with_news += 1;
                }
                let event = rec
                    .dominant_event
                    .map(|e| e.as_str().to_string())
                    .unwrap_or_else(|| NO_EVENT.to_string());
                *events.entry(event.clone()).or_insert(0) += 1;

                let key = (rec.symbol.trim().to_uppercase(), date);
                if used.contains(&key) {
                    continue;
                }
                if let Some(o) = by_key.get(&key) {
                    if !o.return_pct.is_finite() {
                        continue;
                    }
                    used.insert(key);
                    samples.push(Sample {
                        score: rec.composite_score,
                        event,
                        holding_days: o.holding_days,
                        period: self.granularity.key(o.entry_date),
                        return_pct: o.return_pct,
                    });
                }
            }
        }

        let all: Vec<f64> = samples.iter().map(|s| s.return_pct).collect();

        let fixed_rows = |labels: &[&str], pick: &dyn Fn(&Sample) -> &'static str| -> Vec<BucketRow> {
            labels
                .iter()
                .map(|label| {
                    let returns: Vec<f64> = samples
                        .iter()
                        .filter(|s| pick(*s) == *label)
                        .map(|s| s.return_pct)
                        .collect();
                    BucketRow {
                        bucket: label.to_string(),
                        stats: BucketStats::compute(&returns, self.min_samples),
                    }
                })
                .collect()
        };
        let keyed_rows = |key: &dyn Fn(&Sample) -> String| -> Vec<BucketRow> {
            let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
            for s in &samples {
                groups.entry(key(s)).or_default().push(s.return_pct);
            }
            groups
                .into_iter()
                .map(|(bucket, returns)| BucketRow {
                    bucket,
                    stats: BucketStats::compute(&returns, self.min_samples),
                })
                .collect()
        };

        let by_score = fixed_rows(&SCORE_BUCKETS, &|s| score_bucket(s.score));
        let by_holding = fixed_rows(&HOLDING_BUCKETS, &|s| holding_bucket(s.holding_days));
        let by_event = keyed_rows(&|s| s.event.clone());
        let by_period = keyed_rows(&|s| s.period.clone());

        let news_coverage_pct = if recs_total == 0 {
            0.0
        } else {
            recs_with_news as f64 / recs_total as f64 * 100.0
        };
        let event_diversity = events.keys().filter(|k| k.as_str() != NO_EVENT).count();

        let mut alerts = Vec::new();
        if samples.len() < MIN_HEALTHY_SAMPLES {
            alerts.push(format!(
                "sample size {} below {MIN_HEALTHY_SAMPLES}; statistics are unstable",
                samples.len()
            ));
        }
        if news_coverage_pct < MIN_NEWS_COVERAGE_PCT {
            alerts.push(format!(
                "news coverage {news_coverage_pct:.1}% below {MIN_NEWS_COVERAGE_PCT:.0}%"
            ));
        }
        if event_diversity < MIN_EVENT_DIVERSITY {
            alerts.push(format!(
                "event diversity {event_diversity} below {MIN_EVENT_DIVERSITY}; attribution may overfit one event"
            ));
        }

        let stage_durations = stage_durations(reports);

        debug!(
            reports = usable.len(),
            samples = samples.len(),
            alerts = alerts.len(),
            "evaluation aggregated"
        );
        let overall = BucketStats::compute(&all, self.min_samples);
        info!(
            reports = usable.len(),
            matched = overall.sample_count(),
            unmatched = outcomes.len() - used.len(),
            "evaluation complete"
        );

        EvaluationSummary {
            reports_considered: usable.len(),
            recommendations_considered: recs_total,
            matched_samples: samples.len(),
            unmatched_outcomes: outcomes.len() - used.len(),
            overall,
            by_score,
            by_event,
            by_holding,
            by_period,
            news_coverage_pct,
            event_diversity,
            alerts,
            stage_durations,
        }
    }
}

/// Mean duration and failure count per stage across all reports, including
/// failed runs.
fn stage_durations(reports: &[Report]) -> BTreeMap<ScanStage, StageDuration> {
    let mut acc: BTreeMap<ScanStage, (usize, f64, usize)> = BTreeMap::new();
    for d in reports.iter().flat_map(|r| r.diagnostics.iter()) {
        let entry = acc.entry(d.stage).or_insert((0, 0.0, 0));
        entry.0 += 1;
        entry.1 += d.duration_ms;
        if d.status == StageStatus::Failed {
            entry.2 += 1;
        }
    }
    acc.into_iter()
        .map(|(stage, (runs, total, failures))| {
            (
                stage,
                StageDuration {
                    runs,
                    mean_ms: total / runs as f64,
                    failures,
                },
            )
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::config::PolicyConfig;
    use crate::pipeline::diagnostics::Diagnostic;
    use crate::ranker::Recommendation;
    use crate::signals::EventType;
    use crate::types::PositionState;

    fn rec(symbol: &str, score: f64, event: Option<EventType>) -> Recommendation {
        Recommendation {
            symbol: symbol.into(),
            name: String::new(),
            rank: 1,
            composite_score: score,
            valuation_score: 50.0,
            quality_score: 50.0,
            trend_score: 50.0,
            catalyst_score: 0.0,
            news_score: 0.0,
            keyword_score: 0.0,
            fusion_weight: 0.35,
            news_event_count: usize::from(event.is_some()),
            news_summary: String::new(),
            dominant_event: event,
            regime_adjustment: 0.0,
            risk_penalty: 0.0,
            risk_note: String::new(),
            position_state: PositionState::NewEntry,
            entry_price: 10.0,
            reason: String::new(),
            contributions: Vec::new(),
        }
    }

    fn report(day: u32, recs: Vec<Recommendation>) -> Report {
        let at = Utc.with_ymd_and_hms(2026, 9, day, 9, 30, 0).unwrap();
        let mut r = Report::new(format!("run-{day}"), at, vec![], 5, &PolicyConfig::default());
        r.recommendations = recs;
        r.diagnostics.push(Diagnostic {
            stage: ScanStage::Rank,
            status: StageStatus::Ok,
            duration_ms: day as f64,
            note: None,
            error: None,
        });
        r
    }

    fn outcome(symbol: &str, day: u32, ret: f64, held: f64) -> RealizedOutcome {
        RealizedOutcome {
            symbol: symbol.into(),
            entry_date: NaiveDate::from_ymd_opt(2026, 9, day).unwrap(),
            return_pct: ret,
            holding_days: held,
        }
    }

    fn row<'a>(rows: &'a [BucketRow], bucket: &str) -> &'a BucketStats {
        &rows.iter().find(|r| r.bucket == bucket).unwrap().stats
    }

    #[test]
    fn buckets_by_score_event_and_holding() {
        let reports = vec![
            report(1, vec![rec("AAA", 75.0, Some(EventType::NewOrder)), rec("BBB", 62.0, None)]),
            report(2, vec![rec("AAA", 72.0, Some(EventType::NewOrder))]),
        ];
        let outcomes = vec![
            outcome("AAA", 1, 4.0, 2.0),
            outcome("bbb", 1, -2.0, 0.5),
            outcome("AAA", 2, 6.0, 10.0),
            outcome("ZZZ", 2, 9.0, 1.0),
        ];
        let s = EvaluationAggregator::default().aggregate(&reports, &outcomes);

        assert_eq!(s.matched_samples, 3);
        assert_eq!(s.unmatched_outcomes, 1);
        match row(&s.by_score, "70+") {
            BucketStats::Stats {
                sample_count,
                win_rate,
                mean_return,
                median_return,
            } => {
                assert_eq!(*sample_count, 2);
                assert!((win_rate - 100.0).abs() < 1e-9);
                assert!((mean_return - 5.0).abs() < 1e-9);
                assert!((median_return - 5.0).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            row(&s.by_score, "<60"),
            &BucketStats::InsufficientSample { sample_count: 0 }
        );
        assert_eq!(row(&s.by_event, "new_order").sample_count(), 2);
        assert_eq!(row(&s.by_event, NO_EVENT).sample_count(), 1);
        assert_eq!(row(&s.by_holding, "0-1d").sample_count(), 1);
        assert_eq!(row(&s.by_holding, "1-3d").sample_count(), 1);
        assert_eq!(row(&s.by_holding, "7d+").sample_count(), 1);
        assert_eq!(s.overall.sample_count(), 3);
    }

    #[test]
    fn outcome_is_counted_once_across_same_day_reports() {
        let mut later = report(1, vec![rec("AAA", 65.0, None)]);
        later.generated_at += chrono::Duration::hours(4);
        let reports = vec![later, report(1, vec![rec("AAA", 75.0, None)])];
        let outcomes = vec![outcome("AAA", 1, 5.0, 2.0), outcome("ZZZ", 1, 1.0, 2.0)];
        let s = EvaluationAggregator::default().aggregate(&reports, &outcomes);

        assert_eq!(s.recommendations_considered, 2);
        assert_eq!(s.matched_samples, 1);
        assert_eq!(s.unmatched_outcomes, 1);
        assert_eq!(s.overall.sample_count(), 1);
        // The morning report (score 75) claims the outcome.
        assert_eq!(row(&s.by_score, "70+").sample_count(), 1);
        assert_eq!(row(&s.by_score, "60-70").sample_count(), 0);
    }

    #[test]
    fn empty_input_marks_everything_insufficient() {
        let s = EvaluationAggregator::default().aggregate(&[], &[]);
        assert_eq!(s.overall, BucketStats::InsufficientSample { sample_count: 0 });
        assert!(s.by_event.is_empty());
        assert_eq!(s.by_score.len(), 3);
        assert_eq!(s.alerts.len(), 3);
    }

    #[test]
    fn min_samples_threshold_applies_per_bucket() {
        let reports = vec![report(1, vec![rec("AAA", 75.0, None)])];
        let outcomes = vec![outcome("AAA", 1, 3.0, 1.0)];
        let s = EvaluationAggregator::default()
            .with_min_samples(2)
            .aggregate(&reports, &outcomes);
        assert_eq!(s.overall, BucketStats::InsufficientSample { sample_count: 1 });
    }

    #[test]
    fn failed_runs_are_ignored_but_timed() {
        let mut failed = report(3, vec![rec("AAA", 80.0, None)]);
        failed.status = RunStatus::Failed;
        let s = EvaluationAggregator::default().aggregate(
            &[report(1, vec![]), failed],
            &[outcome("AAA", 3, 5.0, 1.0)],
        );
        assert_eq!(s.reports_considered, 1);
        assert_eq!(s.matched_samples, 0);
        let rank = &s.stage_durations[&ScanStage::Rank];
        assert_eq!(rank.runs, 2);
        assert!((rank.mean_ms - 2.0).abs() < 1e-9);
    }

    #[test]
    fn period_keys_follow_granularity() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert_eq!(PeriodGranularity::Day.key(d), "2026-01-01");
        assert_eq!(PeriodGranularity::Week.key(d), "2026-W01");
        assert_eq!(PeriodGranularity::Month.key(d), "2026-01");
        // ISO week-year differs from the calendar year at the boundary.
        let d = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        assert_eq!(PeriodGranularity::Week.key(d), "2026-W53");
    }

    #[test]
    fn median_of_even_sample_is_midpoint() {
        match BucketStats::compute(&[1.0, -3.0, 7.0, 5.0], 1) {
            BucketStats::Stats {
                median_return,
                win_rate,
                ..
            } => {
                assert!((median_return - 3.0).abs() < 1e-12);
                assert!((win_rate - 75.0).abs() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
