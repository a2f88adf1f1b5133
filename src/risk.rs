// =============================================================================
// Risk Gate - per-symbol penalty, veto and chase filter
// =============================================================================
//
// Penalty checks (each contributes once):
//   1. Low Price: price below the policy floor
//   2. High Valuation: PE above the policy ceiling
//   3. Weak ROE: ROE below the policy floor
//   4. Negative news: one check per distinct negative event type present
//
// Vetoes (independent of the penalty's effect on rank):
//   - Chase filter: 20-day return above `chase_filter_pct` on a NEW entry.
//     Existing holdings are exempt.
//   - Fatal risk:   total penalty above `max_risk_penalty`.
// =============================================================================

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{PolicyConfig, RiskParams};
use crate::signals::{EventType, NewsEvent};
use crate::types::{PositionState, Snapshot};

/// Upper bound on the accumulated penalty.
const MAX_PENALTY: f64 = 100.0;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One evaluated penalty check, kept for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCheck {
    pub name: String,
    pub penalty: f64,
}

/// Why a symbol was vetoed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VetoReason {
    ChaseFilter,
    FatalRisk,
}

impl std::fmt::Display for VetoReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChaseFilter => write!(f, "chase_filter"),
            Self::FatalRisk => write!(f, "fatal_risk"),
        }
    }
}

/// Risk verdict for one symbol in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub symbol: String,
    pub penalty: f64,
    /// One line naming the dominant risk driver.
    pub note: String,
    pub veto: Option<VetoReason>,
    pub checks: Vec<RiskCheck>,
}

// ---------------------------------------------------------------------------
// Risk Gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RiskGate {
    params: RiskParams,
    chase_filter_pct: f64,
}

impl RiskGate {
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            params: policy.risk.clone(),
            chase_filter_pct: policy.chase_filter_pct,
        }
    }

    /// True when a new entry has already run up too far.
    pub fn is_chasing(&self, snapshot: &Snapshot, position: PositionState) -> bool {
        position == PositionState::NewEntry
            && snapshot
                .finite_return_20d()
                .is_some_and(|r| r > self.chase_filter_pct)
    }

    /// Evaluate all checks for one symbol. `events` are the symbol's news
    /// events for this run.
    pub fn assess(
        &self,
        snapshot: &Snapshot,
        events: &[&NewsEvent],
        position: PositionState,
    ) -> RiskAssessment {
        let p = &self.params;
        let mut checks = Vec::new();

        if snapshot.price.is_finite() && snapshot.price > 0.0 && snapshot.price < p.low_price {
            checks.push(RiskCheck {
                name: format!("low price {:.2} < {:.2}", snapshot.price, p.low_price),
                penalty: p.low_price_penalty,
            });
        }
        if let Some(pe) = snapshot.pe_ttm.filter(|v| v.is_finite()) {
            if pe > p.max_pe {
                checks.push(RiskCheck {
                    name: format!("high valuation PE {pe:.1} > {:.0}", p.max_pe),
                    penalty: p.high_pe_penalty,
                });
            }
        }
        if let Some(roe) = snapshot.roe.filter(|v| v.is_finite()) {
            if roe < p.min_roe {
                checks.push(RiskCheck {
                    name: format!("weak ROE {roe:.1}% < {:.1}%", p.min_roe),
                    penalty: p.weak_roe_penalty,
                });
            }
        }

        let negative: BTreeSet<EventType> = events
            .iter()
            .map(|e| e.event_type)
            .filter(|t| t.is_negative())
            .collect();
        for event in negative {
            checks.push(RiskCheck {
                name: format!("negative news: {event}"),
                penalty: p.event_penalty(event),
            });
        }

        let penalty = checks.iter().map(|c| c.penalty).sum::<f64>().min(MAX_PENALTY);

        let veto = if self.is_chasing(snapshot, position) {
            Some(VetoReason::ChaseFilter)
        } else if penalty > p.max_risk_penalty {
            Some(VetoReason::FatalRisk)
        } else {
            None
        };

        let note = match veto {
            Some(VetoReason::ChaseFilter) => format!(
                "chase filter: 20d return {:.1}% > {:.1}%",
                snapshot.finite_return_20d().unwrap_or_default(),
                self.chase_filter_pct
            ),
            _ => checks
                .iter()
                .max_by(|a, b| a.penalty.total_cmp(&b.penalty))
                .map(|c| c.name.clone())
                .unwrap_or_else(|| "no significant risk".to_string()),
        };

        debug!(
            symbol = %snapshot.symbol,
            penalty,
            veto = ?veto,
            note = %note,
            "risk assessed"
        );

        RiskAssessment {
            symbol: snapshot.symbol.clone(),
            penalty,
            note,
            veto,
            checks,
        }
    }
}
