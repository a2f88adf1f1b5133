// =============================================================================
// Catalyst Fuser - evidence-weighted blend of keyword and structured news
// =============================================================================
//
//   w        = min(1, base_weight + step * event_count)
//   catalyst = (1 - w) * keyword_score + w * news_score
//
// The structured signal earns more weight the more events back it.

use serde::{Deserialize, Serialize};

use crate::config::FusionParams;

/// The blend actually applied to one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionResult {
    pub keyword_score: f64,
    pub news_score: f64,
    pub event_count: usize,
    /// Weight given to `news_score`.
    pub structured_weight: f64,
    pub catalyst_score: f64,
}

#[derive(Debug, Clone)]
pub struct CatalystFuser {
    base_weight: f64,
    step: f64,
}

impl CatalystFuser {
    pub fn new(params: &FusionParams) -> Self {
        Self {
            base_weight: params.base_weight,
            step: params.step,
        }
    }

    /// Structured-signal weight for the given evidence volume. Non-decreasing
    /// in `event_count` and bounded to [base_weight, 1].
    pub fn structured_weight(&self, event_count: usize) -> f64 {
        (self.base_weight + self.step * event_count as f64)
            .min(1.0)
            .max(self.base_weight)
    }

    pub fn fuse(&self, keyword_score: f64, news_score: f64, event_count: usize) -> FusionResult {
        let w = self.structured_weight(event_count);
        FusionResult {
            keyword_score,
            news_score,
            event_count,
            structured_weight: w,
            catalyst_score: (1.0 - w) * keyword_score + w * news_score,
        }
    }
}

impl Default for CatalystFuser {
    fn default() -> Self {
        Self::new(&FusionParams::default())
    }
}
