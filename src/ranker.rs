// =============================================================================
// Ranker - composite scoring, gating and top-N selection
// =============================================================================
//
// For each symbol with a valid snapshot:
//
//   composite = w_v * valuation + w_q * quality + w_t * trend + w_c * catalyst
//             + regime_adjustment - risk_penalty
//
// Candidate states:  scored -> { excluded (veto | score gate) | qualified }
//                    qualified -> { selected (top-N) | truncated }
//
// Qualified candidates are sorted by composite descending; equal scores are
// ordered by symbol ascending so that the output is deterministic. Every
// candidate leaves a `CandidateDecision` behind.
// =============================================================================

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{CompositeWeights, PolicyConfig};
use crate::decision_envelope::{BlockingLayer, CandidateDecision};
use crate::error::ScanError;
use crate::factors::FactorScores;
use crate::regime::{RegimeDetector, RegimeState};
use crate::risk::{RiskAssessment, RiskGate};
use crate::signals::news_events::{deduplicate, events_for, signal_for};
use crate::signals::{keyword_scores, CatalystFuser, EventType, Extraction, NewsEventExtractor};
use crate::types::{NewsItem, PositionState, Snapshot};

// =============================================================================
// Composite score
// =============================================================================

/// The five sub-scores behind one composite. `news` is informational: it is
/// already folded into `catalyst`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub valuation: f64,
    pub quality: f64,
    pub trend: f64,
    pub catalyst: f64,
    pub news: f64,
}

/// The contribution of a single term to the composite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreContribution {
    pub name: String,
    pub weight: f64,
    pub value: f64,
    pub contribution: f64,
}

/// Pure composite formula. No state beyond its arguments.
pub fn composite_score(
    sub: &SubScores,
    regime_adjustment: f64,
    risk_penalty: f64,
    weights: &CompositeWeights,
) -> f64 {
    contributions(sub, regime_adjustment, risk_penalty, weights)
        .iter()
        .map(|c| c.contribution)
        .sum()
}

/// Per-term breakdown of [`composite_score`].
pub fn contributions(
    sub: &SubScores,
    regime_adjustment: f64,
    risk_penalty: f64,
    weights: &CompositeWeights,
) -> Vec<ScoreContribution> {
    let term = |name: &str, weight: f64, value: f64| ScoreContribution {
        name: name.to_string(),
        weight,
        value,
        contribution: weight * value,
    };
    vec![
        term("valuation", weights.valuation, sub.valuation),
        term("quality", weights.quality, sub.quality),
        term("trend", weights.trend, sub.trend),
        term("catalyst", weights.catalyst, sub.catalyst),
        term("regime_adjustment", 1.0, regime_adjustment),
        term("risk_penalty", -1.0, risk_penalty),
    ]
}

fn check_range(symbol: &str, name: &str, value: f64, lo: f64, hi: f64) -> Result<(), ScanError> {
    if value.is_finite() && (lo..=hi).contains(&value) {
        Ok(())
    } else {
        Err(ScanError::Composition(format!(
            "{symbol}: {name} score {value} outside [{lo}, {hi}]"
        )))
    }
}

// =============================================================================
// Output types
// =============================================================================

/// One ranked, gate-passing candidate. Built once per run, never mutated
/// after ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    /// 1-based position in the output.
    pub rank: usize,
    pub composite_score: f64,
    pub valuation_score: f64,
    pub quality_score: f64,
    pub trend_score: f64,
    pub catalyst_score: f64,
    pub news_score: f64,
    pub keyword_score: f64,
    /// Structured-news weight used by the fuser.
    pub fusion_weight: f64,
    pub news_event_count: usize,
    pub news_summary: String,
    #[serde(default)]
    pub dominant_event: Option<EventType>,
    pub regime_adjustment: f64,
    pub risk_penalty: f64,
    pub risk_note: String,
    pub position_state: PositionState,
    pub entry_price: f64,
    pub reason: String,
    #[serde(default)]
    pub contributions: Vec<ScoreContribution>,
}

/// News-signal diagnostic persisted with every report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsDiagnostic {
    pub items_received: usize,
    pub items_rejected: usize,
    pub duplicates_dropped: usize,
    pub events_extracted: usize,
    /// Scored symbols with at least one event.
    pub symbols_with_news: usize,
    /// `symbols_with_news` as a percentage of scored symbols.
    pub coverage_pct: f64,
    /// Mean news score across scored symbols.
    pub avg_news_score: f64,
    #[serde(default)]
    pub event_type_counts: BTreeMap<EventType, usize>,
}

/// Everything the rank stage hands to the rest of the pipeline.
#[derive(Debug, Clone)]
pub struct RankOutcome {
    pub recommendations: Vec<Recommendation>,
    pub decisions: Vec<CandidateDecision>,
    pub regime: RegimeState,
    pub news: NewsDiagnostic,
}

impl RankOutcome {
    /// Outcome with nothing scored, used when the run cannot rank.
    pub fn empty() -> Self {
        Self {
            recommendations: Vec::new(),
            decisions: Vec::new(),
            regime: RegimeState::neutral(),
            news: NewsDiagnostic::default(),
        }
    }
}

// =============================================================================
// Ranker
// =============================================================================

pub struct Ranker {
    policy: PolicyConfig,
    extractor: NewsEventExtractor,
    fuser: CatalystFuser,
    gate: RiskGate,
    regime: RegimeDetector,
}

impl Ranker {
    /// Build all per-run scorers from the policy. Fails with a Composition
    /// error when the policy is misconfigured.
    pub fn new(policy: &PolicyConfig) -> Result<Self, ScanError> {
        policy.validate()?;
        Ok(Self {
            policy: policy.clone(),
            extractor: NewsEventExtractor::from_policy(policy)?,
            fuser: CatalystFuser::new(&policy.fusion),
            gate: RiskGate::new(policy),
            regime: RegimeDetector::new(&policy.regime),
        })
    }

    /// Score, gate, sort and truncate. `holdings` holds upper-cased symbols
    /// currently held; they are exempt from the chase filter.
    pub fn rank(
        &self,
        snapshots: &[Snapshot],
        news: &[NewsItem],
        holdings: &HashSet<String>,
        as_of: DateTime<Utc>,
        top_n: usize,
    ) -> Result<RankOutcome, ScanError> {
        let mut decisions = Vec::new();

        // --- Validate and deduplicate snapshots -----------------------------
        let mut seen = HashSet::new();
        let mut valid: Vec<&Snapshot> = Vec::with_capacity(snapshots.len());
        for snap in snapshots {
            if let Err(e) = snap.validate() {
                warn!(error = %e, "snapshot excluded");
                decisions.push(CandidateDecision::excluded(
                    snap.symbol.clone(),
                    BlockingLayer::Validation,
                    None,
                    e.to_string(),
                ));
                continue;
            }
            if !seen.insert(snap.symbol.trim().to_uppercase()) {
                warn!(symbol = %snap.symbol, "duplicate snapshot excluded");
                decisions.push(CandidateDecision::excluded(
                    snap.symbol.clone(),
                    BlockingLayer::Validation,
                    None,
                    "duplicate snapshot",
                ));
                continue;
            }
            valid.push(snap);
        }

        // --- Market-wide and news signals -----------------------------------
        let owned: Vec<Snapshot> = valid.iter().map(|s| (*s).clone()).collect();
        let regime = self.regime.detect(&owned);
        let extraction = self.extractor.extract(news, as_of);
        let keywords = keyword_scores(&deduplicate(news), &self.policy.news);

        // --- Score every candidate ------------------------------------------
        let mut scored: Vec<(Recommendation, RiskAssessment)> = Vec::with_capacity(valid.len());
        for snap in &valid {
            let key = snap.symbol.trim().to_uppercase();
            let position = if holdings.contains(&key) {
                PositionState::Held
            } else {
                PositionState::NewEntry
            };

            let factors = FactorScores::from_snapshot(snap);
            let signal = signal_for(&extraction.signals, &snap.symbol);
            let keyword = keywords.get(&key).copied().unwrap_or(0.0);
            let fused = self.fuser.fuse(keyword, signal.news_score, signal.event_count);
            let events = events_for(&extraction.events, &snap.symbol);
            let risk = self.gate.assess(snap, &events, position);

            let sub = SubScores {
                valuation: factors.valuation,
                quality: factors.quality,
                trend: factors.trend,
                catalyst: fused.catalyst_score,
                news: signal.news_score,
            };
            check_range(&snap.symbol, "valuation", sub.valuation, 0.0, 100.0)?;
            check_range(&snap.symbol, "quality", sub.quality, 0.0, 100.0)?;
            check_range(&snap.symbol, "trend", sub.trend, 0.0, 100.0)?;
            check_range(&snap.symbol, "catalyst", sub.catalyst, -100.0, 100.0)?;
            check_range(&snap.symbol, "news", sub.news, -100.0, 100.0)?;

            let weights = &self.policy.weights;
            let parts = contributions(&sub, regime.adjustment, risk.penalty, weights);
            let composite = composite_score(&sub, regime.adjustment, risk.penalty, weights);
            if !composite.is_finite() {
                return Err(ScanError::Composition(format!(
                    "{}: composite score is not finite",
                    snap.symbol
                )));
            }

            let news_summary = signal.summary();
            let reason = format!(
                "valuation {:.0} | quality {:.0} | trend {:.0} | catalyst {:+.1} | {}",
                sub.valuation, sub.quality, sub.trend, sub.catalyst, news_summary
            );

            debug!(
                symbol = %snap.symbol,
                composite = format!("{:.2}", composite),
                catalyst = format!("{:.2}", sub.catalyst),
                news_events = signal.event_count,
                risk_penalty = risk.penalty,
                "candidate scored"
            );

            scored.push((
                Recommendation {
                    symbol: snap.symbol.clone(),
                    name: snap.name.clone(),
                    rank: 0,
                    composite_score: composite,
                    valuation_score: sub.valuation,
                    quality_score: sub.quality,
                    trend_score: sub.trend,
                    catalyst_score: sub.catalyst,
                    news_score: sub.news,
                    keyword_score: keyword,
                    fusion_weight: fused.structured_weight,
                    news_event_count: signal.event_count,
                    news_summary,
                    dominant_event: signal.dominant_event(),
                    regime_adjustment: regime.adjustment,
                    risk_penalty: risk.penalty,
                    risk_note: risk.note.clone(),
                    position_state: position,
                    entry_price: snap.price,
                    reason,
                    contributions: parts,
                },
                risk,
            ));
        }

        let news_diag = news_diagnostic(&extraction, &scored);

        // --- Gates ----------------------------------------------------------
        let mut qualified = Vec::with_capacity(scored.len());
        for (rec, risk) in scored {
            if let Some(veto) = risk.veto {
                debug!(symbol = %rec.symbol, veto = %veto, "candidate vetoed");
                decisions.push(CandidateDecision::excluded(
                    rec.symbol,
                    BlockingLayer::RiskVeto,
                    Some(rec.composite_score),
                    format!("{veto}: {}", risk.note),
                ));
            } else if rec.composite_score < self.policy.min_score {
                decisions.push(CandidateDecision::excluded(
                    rec.symbol,
                    BlockingLayer::ScoreGate,
                    Some(rec.composite_score),
                    format!(
                        "composite {:.2} below min_score {:.2}",
                        rec.composite_score, self.policy.min_score
                    ),
                ));
            } else {
                qualified.push(rec);
            }
        }

        // --- Sort and truncate ----------------------------------------------
        qualified.sort_by(|a, b| {
            b.composite_score
                .total_cmp(&a.composite_score)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        let qualified_count = qualified.len();
        let limit = top_n.min(self.policy.max_positions);

        let mut recommendations = Vec::with_capacity(limit);
        for (i, mut rec) in qualified.into_iter().enumerate() {
            let rank = i + 1;
            if rank <= limit {
                rec.rank = rank;
                decisions.push(CandidateDecision::selected(
                    rec.symbol.clone(),
                    rec.composite_score,
                    rec.reason.clone(),
                ));
                recommendations.push(rec);
            } else {
                decisions.push(CandidateDecision::truncated(
                    rec.symbol,
                    rec.composite_score,
                    rank,
                    limit,
                ));
            }
        }

        info!(
            scored = valid.len(),
            qualified = qualified_count,
            selected = recommendations.len(),
            regime = %regime.regime,
            "ranking complete"
        );

        Ok(RankOutcome {
            recommendations,
            decisions,
            regime,
            news: news_diag,
        })
    }
}

fn news_diagnostic(
    extraction: &Extraction,
    scored: &[(Recommendation, RiskAssessment)],
) -> NewsDiagnostic {
    let mut event_type_counts = BTreeMap::new();
    for e in &extraction.events {
        *event_type_counts.entry(e.event_type).or_insert(0) += 1;
    }

    let with_news = scored.iter().filter(|(r, _)| r.news_event_count > 0).count();
    let (coverage_pct, avg_news_score) = if scored.is_empty() {
        (0.0, 0.0)
    } else {
        let n = scored.len() as f64;
        (
            with_news as f64 / n * 100.0,
            scored.iter().map(|(r, _)| r.news_score).sum::<f64>() / n,
        )
    };

    NewsDiagnostic {
        items_received: extraction.items_received,
        items_rejected: extraction.rejected.len(),
        duplicates_dropped: extraction.duplicates_dropped,
        events_extracted: extraction.events.len(),
        symbols_with_news: with_news,
        coverage_pct,
        avg_news_score,
        event_type_counts,
    }
}
