// =============================================================================
// Factor Scorer - valuation, quality and trend sub-scores
// =============================================================================
//
// Pure, total functions over a Snapshot. Every score lands in [0, 100]:
//   - missing or non-positive PE scores the lowest valuation band
//   - malformed (NaN / infinite) inputs score neutral
//   - a deep negative 20-day return drives trend to the floor on its own;
//     it is never offset by cheapness here
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::Snapshot;

/// Score given to unusable numeric inputs.
pub const NEUTRAL_SCORE: f64 = 50.0;
/// Valuation score for loss-making or unpriced earnings.
pub const LOWEST_VALUATION_BAND: f64 = 5.0;
/// 20-day return (percent) beyond which momentum stops earning credit.
const MOMENTUM_SWEET_SPOT: f64 = 15.0;

fn clamp_score(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 100.0)
    } else {
        NEUTRAL_SCORE
    }
}

fn usable(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

/// Lower PE / PB scores higher.
pub fn valuation_score(s: &Snapshot) -> f64 {
    let pe = match s.pe_ttm {
        None => return LOWEST_VALUATION_BAND,
        Some(pe) if !pe.is_finite() => return NEUTRAL_SCORE,
        Some(pe) if pe <= 0.0 => return LOWEST_VALUATION_BAND,
        Some(pe) => pe,
    };
    let pe_part = clamp_score(100.0 - pe);
    let pb_part = match usable(s.pb) {
        Some(pb) if pb > 0.0 => clamp_score(100.0 - pb * 25.0),
        _ => NEUTRAL_SCORE,
    };
    clamp_score(pe_part * 0.6 + pb_part * 0.4)
}

/// Monotonic increasing in ROE and revenue growth.
pub fn quality_score(s: &Snapshot) -> f64 {
    let roe_part = usable(s.roe).map_or(NEUTRAL_SCORE, |roe| clamp_score(roe * 4.0));
    let rev_part = usable(s.revenue_growth).map_or(NEUTRAL_SCORE, |g| clamp_score(50.0 + g * 2.0));
    clamp_score(roe_part * 0.6 + rev_part * 0.4)
}

/// Rewards a positive but not overextended 20-day move with volume behind it.
pub fn trend_score(s: &Snapshot) -> f64 {
    let ret = usable(s.return_20d).unwrap_or(0.0);
    let vol = usable(s.volume_ratio).filter(|v| *v > 0.0).unwrap_or(1.0);

    let momentum = 3.0 * ret.min(MOMENTUM_SWEET_SPOT) - 2.0 * (ret - MOMENTUM_SWEET_SPOT).max(0.0);
    let volume = ((vol - 1.0) * 15.0).clamp(-15.0, 15.0);
    clamp_score(50.0 + momentum + volume)
}

/// The three factor sub-scores for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorScores {
    pub valuation: f64,
    pub quality: f64,
    pub trend: f64,
}

impl FactorScores {
    pub fn from_snapshot(s: &Snapshot) -> Self {
        Self {
            valuation: valuation_score(s),
            quality: quality_score(s),
            trend: trend_score(s),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snap() -> Snapshot {
        Snapshot {
            symbol: "AAA".into(),
            name: "Alpha".into(),
            price: 12.0,
            pe_ttm: Some(10.0),
            pb: Some(1.0),
            roe: Some(20.0),
            revenue_growth: Some(15.0),
            return_20d: Some(5.0),
            volume_ratio: Some(1.2),
            as_of: Utc::now(),
        }
    }

    fn in_range(v: f64) -> bool {
        (0.0..=100.0).contains(&v)
    }

    #[test]
    fn reference_snapshot_scores() {
        let f = FactorScores::from_snapshot(&snap());
        assert!((f.valuation - 84.0).abs() < 1e-9);
        assert!((f.quality - 80.0).abs() < 1e-9);
        assert!((f.trend - 68.0).abs() < 1e-9);
    }

    #[test]
    fn missing_or_negative_pe_is_lowest_band() {
        let mut s = snap();
        s.pe_ttm = None;
        assert!(valuation_score(&s) <= 10.0);
        s.pe_ttm = Some(-12.0);
        assert!(valuation_score(&s) <= 10.0);
        s.pe_ttm = Some(0.0);
        assert!(valuation_score(&s) <= 10.0);
    }

    #[test]
    fn malformed_fields_score_neutral() {
        let mut s = snap();
        s.pe_ttm = Some(f64::NAN);
        assert_eq!(valuation_score(&s), NEUTRAL_SCORE);
        s.roe = Some(f64::INFINITY);
        s.revenue_growth = Some(f64::NAN);
        assert_eq!(quality_score(&s), NEUTRAL_SCORE);
        s.return_20d = Some(f64::NAN);
        s.volume_ratio = None;
        assert_eq!(trend_score(&s), NEUTRAL_SCORE);
    }

    #[test]
    fn quality_is_monotonic() {
        let mut lo = snap();
        let mut hi = snap();
        lo.roe = Some(5.0);
        hi.roe = Some(15.0);
        assert!(quality_score(&hi) > quality_score(&lo));
        lo.revenue_growth = Some(-10.0);
        assert!(quality_score(&hi) > quality_score(&lo));
    }

    #[test]
    fn deep_drawdown_floors_trend_despite_cheapness() {
        let mut s = snap();
        s.pe_ttm = Some(3.0);
        s.pb = Some(0.3);
        s.return_20d = Some(-30.0);
        s.volume_ratio = Some(0.5);
        assert_eq!(trend_score(&s), 0.0);
        assert!(valuation_score(&s) > 90.0);
    }

    #[test]
    fn overextended_move_earns_less_than_sweet_spot() {
        let mut s = snap();
        s.return_20d = Some(15.0);
        let sweet = trend_score(&s);
        s.return_20d = Some(40.0);
        assert!(trend_score(&s) < sweet);
    }

    #[test]
    fn scores_stay_in_range_for_extremes() {
        let values = [
            None,
            Some(f64::NAN),
            Some(f64::NEG_INFINITY),
            Some(-1e9),
            Some(-50.0),
            Some(0.0),
            Some(0.5),
            Some(35.0),
            Some(1e9),
        ];
        for a in values {
            for b in values {
                let s = Snapshot {
                    pe_ttm: a,
                    pb: b,
                    roe: a,
                    revenue_growth: b,
                    return_20d: a,
                    volume_ratio: b,
                    ..snap()
                };
                let f = FactorScores::from_snapshot(&s);
                assert!(in_range(f.valuation), "valuation {:?}", f);
                assert!(in_range(f.quality), "quality {:?}", f);
                assert!(in_range(f.trend), "trend {:?}", f);
            }
        }
    }
}
