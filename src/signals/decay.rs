// =============================================================================
// Half-life Decay - age-based freshness of news signals
// =============================================================================

use chrono::{DateTime, Utc};

const SECS_PER_DAY: f64 = 86_400.0;

/// Exponential decay with a fixed half-life, measured in days.
///
/// `factor(age) = 2^(-age / half_life)`, so an event loses half of its weight
/// every `half_life_days`. Ages below zero (timestamps from the future) are
/// treated as zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfLifeDecay {
    half_life_days: f64,
}

impl HalfLifeDecay {
    /// Create a decay curve with the given half-life in days.
    pub fn new(half_life_days: f64) -> Self {
        Self { half_life_days }
    }

    /// Multiplier in (0, 1] for an event of the given age.
    pub fn factor(&self, age_days: f64) -> f64 {
        let age = if age_days.is_finite() { age_days.max(0.0) } else { 0.0 };
        (-age * (2.0_f64.ln()) / self.half_life_days).exp()
    }

    /// Decayed value of `strength` after `age_days`.
    pub fn decayed(&self, strength: f64, age_days: f64) -> f64 {
        strength * self.factor(age_days)
    }

    /// Age in fractional days between publication and evaluation time.
    pub fn age_days(published_at: DateTime<Utc>, as_of: DateTime<Utc>) -> f64 {
        let secs = (as_of - published_at).num_milliseconds() as f64 / 1000.0;
        (secs / SECS_PER_DAY).max(0.0)
    }
}

impl Default for HalfLifeDecay {
    fn default() -> Self {
        Self::new(1.5) // 36-hour half-life
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn factor_is_one_at_age_zero() {
        let d = HalfLifeDecay::new(2.0);
        assert!((d.factor(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn factor_halves_every_half_life() {
        let d = HalfLifeDecay::new(1.5);
        assert!((d.factor(1.5) - 0.5).abs() < 1e-12);
        assert!((d.factor(3.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn factor_strictly_decreases_with_age() {
        let d = HalfLifeDecay::default();
        let mut prev = d.factor(0.0);
        for i in 1..200 {
            let next = d.factor(i as f64 * 0.1);
            assert!(next < prev, "age {} did not decay", i as f64 * 0.1);
            prev = next;
        }
    }

    #[test]
    fn future_timestamps_do_not_amplify() {
        let d = HalfLifeDecay::default();
        assert!((d.factor(-3.0) - 1.0).abs() < 1e-12);
        let now = Utc::now();
        assert_eq!(HalfLifeDecay::age_days(now + Duration::hours(5), now), 0.0);
    }

    #[test]
    fn age_days_uses_fractional_days() {
        let now = Utc::now();
        let age = HalfLifeDecay::age_days(now - Duration::hours(36), now);
        assert!((age - 1.5).abs() < 1e-9);
    }
}
