// =============================================================================
// Market Regime Detector
// =============================================================================
//
// Classifies the scanned universe into one of three regimes from two
// cross-sectional statistics over the 20-day return:
//
//   breadth  = fraction of symbols with a positive 20-day return
//   avg_move = mean 20-day return (percent)
//
// Detection (first match wins):
//
//   1. BULLISH: breadth > bullish_breadth AND avg_move > bullish_avg_move
//   2. BEARISH: breadth < bearish_breadth AND avg_move < bearish_avg_move
//   3. RANGE_BOUND: everything else, including an empty universe
//
// Each regime carries a fixed additive adjustment applied uniformly to every
// candidate's composite score for the run.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::RegimeParams;
use crate::types::Snapshot;

// =============================================================================
// Types
// =============================================================================

/// High-level market regime classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    /// Broad participation with a positive average move.
    Bullish,
    /// No clear direction.
    RangeBound,
    /// Broad weakness with a negative average move.
    Bearish,
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "BULLISH"),
            Self::RangeBound => write!(f, "RANGE_BOUND"),
            Self::Bearish => write!(f, "BEARISH"),
        }
    }
}

/// Detected regime plus the metrics behind it. Persisted as the regime
/// diagnostic of each report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeState {
    /// The classified regime.
    pub regime: MarketRegime,

    /// Fraction of the universe with a positive 20-day return [0.0, 1.0].
    pub breadth: f64,

    /// Mean 20-day return across the universe, in percent.
    pub avg_move: f64,

    /// Number of snapshots with a usable 20-day return.
    pub sample_size: usize,

    /// Additive composite-score adjustment for this run.
    pub adjustment: f64,

    /// Confidence in the regime classification [0.0, 1.0].
    pub confidence: f64,
}

impl RegimeState {
    /// Range-bound state used when no snapshots are available.
    pub fn neutral() -> Self {
        Self {
            regime: MarketRegime::RangeBound,
            breadth: 0.0,
            avg_move: 0.0,
            sample_size: 0,
            adjustment: 0.0,
            confidence: 0.0,
        }
    }
}

// =============================================================================
// RegimeDetector
// =============================================================================

/// Stateless per-run detector. Thresholds come from the policy.
#[derive(Debug, Clone, Default)]
pub struct RegimeDetector {
    params: RegimeParams,
}

impl RegimeDetector {
    pub fn new(params: &RegimeParams) -> Self {
        Self {
            params: params.clone(),
        }
    }

    /// Run regime detection over the run's snapshots. Snapshots without a
    /// finite 20-day return are ignored.
    pub fn detect(&self, snapshots: &[Snapshot]) -> RegimeState {
        let returns: Vec<f64> = snapshots
            .iter()
            .filter_map(Snapshot::finite_return_20d)
            .collect();

        if returns.is_empty() {
            debug!("Regime: empty universe, defaulting to RANGE_BOUND");
            return RegimeState::neutral();
        }

        let n = returns.len() as f64;
        let breadth = returns.iter().filter(|r| **r > 0.0).count() as f64 / n;
        let avg_move = returns.iter().sum::<f64>() / n;

        let (regime, confidence) = classify(&self.params, breadth, avg_move);
        let adjustment = self.adjustment(regime);

        debug!(
            regime = %regime,
            breadth = format!("{:.2}", breadth),
            avg_move = format!("{:.2}", avg_move),
            sample_size = returns.len(),
            adjustment,
            confidence = format!("{:.2}", confidence),
            "Regime detected"
        );

        RegimeState {
            regime,
            breadth,
            avg_move,
            sample_size: returns.len(),
            adjustment,
            confidence,
        }
    }

    /// Composite-score adjustment for a regime.
    pub fn adjustment(&self, regime: MarketRegime) -> f64 {
        match regime {
            MarketRegime::Bullish => self.params.bullish_adjustment,
            MarketRegime::RangeBound => 0.0,
            MarketRegime::Bearish => self.params.bearish_adjustment,
        }
    }
}

// =============================================================================
// Classification logic
// =============================================================================

/// Determine the regime and a confidence score from breadth and average move.
fn classify(p: &RegimeParams, breadth: f64, avg_move: f64) -> (MarketRegime, f64) {
    if breadth > p.bullish_breadth && avg_move > p.bullish_avg_move {
        let breadth_conf = remap(breadth, p.bullish_breadth, 1.0, 0.60, 1.0);
        let move_conf = remap(avg_move, p.bullish_avg_move, p.bullish_avg_move * 3.0, 0.60, 1.0);
        return (MarketRegime::Bullish, (breadth_conf + move_conf) / 2.0);
    }

    if breadth < p.bearish_breadth && avg_move < p.bearish_avg_move {
        let breadth_conf = remap(breadth, p.bearish_breadth, 0.0, 0.60, 1.0);
        let move_conf = remap(avg_move, p.bearish_avg_move, p.bearish_avg_move * 3.0, 0.60, 1.0);
        return (MarketRegime::Bearish, (breadth_conf + move_conf) / 2.0);
    }

    trace!(
        breadth = format!("{:.2}", breadth),
        avg_move = format!("{:.2}", avg_move),
        "Regime: no rule matched, defaulting to RANGE_BOUND"
    );
    (MarketRegime::RangeBound, 0.50)
}

/// Linearly remap `value` from `[in_lo, in_hi]` to `[out_lo, out_hi]`, clamped
/// to the output range. Works regardless of whether `in_lo < in_hi` or vice
/// versa.
fn remap(value: f64, in_lo: f64, in_hi: f64, out_lo: f64, out_hi: f64) -> f64 {
    let t = if (in_hi - in_lo).abs() < f64::EPSILON {
        0.5
    } else {
        (value - in_lo) / (in_hi - in_lo)
    };
    let clamped = t.clamp(0.0, 1.0);
    out_lo + clamped * (out_hi - out_lo)
}
