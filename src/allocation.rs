// =============================================================================
// Allocator - score-proportional weights under portfolio caps
// =============================================================================
//
//   investable = 1 - cash_buffer
//   w_i        = investable * score_i / Σ score        (selected symbols only)
//
// Any weight above `max_position_pct` is pinned to the cap and the freed
// capital is redistributed over the uncapped symbols, repeating until no
// weight exceeds the cap or every symbol is capped (water-filling). Capital
// that cannot be placed stays in cash.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PolicyConfig;
use crate::error::ScanError;
use crate::ranker::Recommendation;
use crate::types::PositionState;

const EPS: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Exit levels attached to a position. Advisory only; nothing is executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionNote {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub trailing_stop_pct: f64,
    #[serde(default)]
    pub stop_price: Option<f64>,
    #[serde(default)]
    pub take_profit_price: Option<f64>,
}

impl ExecutionNote {
    fn new(entry_price: f64, policy: &PolicyConfig) -> Self {
        let priced = entry_price.is_finite() && entry_price > 0.0;
        Self {
            stop_loss_pct: policy.stop_loss,
            take_profit_pct: policy.take_profit,
            trailing_stop_pct: policy.trailing_stop,
            stop_price: priced.then(|| entry_price * (1.0 - policy.stop_loss)),
            take_profit_price: priced.then(|| entry_price * (1.0 + policy.take_profit)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub symbol: String,
    pub rank: usize,
    /// Fraction of total capital.
    pub weight: f64,
    /// Pinned at `max_position_pct`.
    pub capped: bool,
    pub position_state: PositionState,
    pub composite_score: f64,
    pub execution: ExecutionNote,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub allocations: Vec<Allocation>,
    /// 1 - cash_buffer.
    pub investable: f64,
    /// Σ weights.
    pub allocated: f64,
    /// 1 - allocated.
    pub cash_weight: f64,
}

// ---------------------------------------------------------------------------
// Water-filling
// ---------------------------------------------------------------------------

/// Distribute `budget` proportionally to `scores`, capping each share at
/// `cap`. Non-positive scores are treated as zero; if no score is positive
/// the budget is split equally. Returns `(weight, capped)` per input.
pub fn water_fill(scores: &[f64], budget: f64, cap: f64) -> Vec<(f64, bool)> {
    let mut out = vec![(0.0, false); scores.len()];
    let mut active: Vec<usize> = (0..scores.len()).collect();
    let mut remaining = budget.max(0.0);

    while !active.is_empty() && remaining > EPS {
        let positive = |i: &usize| scores[*i].max(0.0);
        let total: f64 = active.iter().map(positive).sum();
        let share = |i: usize| {
            if total > EPS {
                remaining * scores[i].max(0.0) / total
            } else {
                remaining / active.len() as f64
            }
        };

        let over: Vec<usize> = active.iter().copied().filter(|i| share(*i) > cap + EPS).collect();
        if over.is_empty() {
            for &i in &active {
                out[i] = (share(i), false);
            }
            break;
        }

        for &i in &over {
            out[i] = (cap, true);
            remaining -= cap;
        }
        active.retain(|i| !over.contains(i));
    }
    out
}

// ---------------------------------------------------------------------------
// Allocator
// ---------------------------------------------------------------------------

/// Turn ranked recommendations into position weights.
pub fn allocate(recs: &[Recommendation], policy: &PolicyConfig) -> Result<AllocationPlan, ScanError> {
    if recs.len() > policy.max_positions {
        return Err(ScanError::Composition(format!(
            "{} recommendations exceed max_positions {}",
            recs.len(),
            policy.max_positions
        )));
    }

    let investable = 1.0 - policy.cash_buffer;
    let scores: Vec<f64> = recs.iter().map(|r| r.composite_score).collect();
    let weights = water_fill(&scores, investable, policy.max_position_pct);

    let allocations: Vec<Allocation> = recs
        .iter()
        .zip(weights)
        .map(|(rec, (weight, capped))| {
            debug!(symbol = %rec.symbol, weight = format!("{:.4}", weight), capped, "allocated");
            Allocation {
                symbol: rec.symbol.clone(),
                rank: rec.rank,
                weight,
                capped,
                position_state: rec.position_state,
                composite_score: rec.composite_score,
                execution: ExecutionNote::new(rec.entry_price, policy),
            }
        })
        .collect();

    let allocated: f64 = allocations.iter().map(|a| a.weight).sum();
    info!(
        positions = allocations.len(),
        allocated = format!("{:.4}", allocated),
        cash = format!("{:.4}", 1.0 - allocated),
        "allocation complete"
    );

    Ok(AllocationPlan {
        allocations,
        investable,
        allocated,
        cash_weight: 1.0 - allocated,
    })
}
