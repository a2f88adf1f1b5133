// =============================================================================
// Decision Envelope - Auditable record of every candidate's fate
// =============================================================================
//
// Every symbol on the watchlist flows through validation, the risk gate, the
// score gate and the top-N cut. The Decision Envelope records where each one
// ended up so that no record is dropped silently: a symbol missing from the
// recommendations can always be traced to the layer that blocked it.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final verdict for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Selected,
    Excluded,
    /// Passed every gate but fell outside the top-N.
    Truncated,
}

/// Layer that kept a candidate out of the recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingLayer {
    Validation,
    MissingSnapshot,
    RiskVeto,
    ScoreGate,
    TopN,
}

/// Complete auditable record of one candidate decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateDecision {
    /// Unique identifier for this decision (UUID v4).
    pub id: String,

    /// Symbol the decision pertains to.
    pub symbol: String,

    pub verdict: Verdict,

    /// Which layer blocked the candidate (if blocked).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_layer: Option<BlockingLayer>,

    /// Composite score, when the candidate got far enough to be scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_score: Option<f64>,

    /// Human-readable reason for the decision.
    pub reason: String,

    pub created_at: DateTime<Utc>,
}

impl CandidateDecision {
    fn new(
        symbol: impl Into<String>,
        verdict: Verdict,
        blocking_layer: Option<BlockingLayer>,
        composite_score: Option<f64>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            verdict,
            blocking_layer,
            composite_score,
            reason: reason.into(),
            created_at: Utc::now(),
        }
    }

    /// Candidate made it into the recommendations.
    pub fn selected(symbol: impl Into<String>, composite_score: f64, reason: impl Into<String>) -> Self {
        Self::new(symbol, Verdict::Selected, None, Some(composite_score), reason)
    }

    /// Candidate was blocked by `layer`.
    pub fn excluded(
        symbol: impl Into<String>,
        layer: BlockingLayer,
        composite_score: Option<f64>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(symbol, Verdict::Excluded, Some(layer), composite_score, reason)
    }

    /// Candidate qualified but ranked below the cut.
    pub fn truncated(symbol: impl Into<String>, composite_score: f64, rank: usize, limit: usize) -> Self {
        Self::new(
            symbol,
            Verdict::Truncated,
            Some(BlockingLayer::TopN),
            Some(composite_score),
            format!("ranked {rank}, outside top {limit}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_records_layer_and_serializes_snake_case() {
        let d = CandidateDecision::excluded("AAA", BlockingLayer::RiskVeto, Some(61.0), "fatal_risk");
        assert_eq!(d.verdict, Verdict::Excluded);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["blocking_layer"], "risk_veto");
        assert_eq!(json["verdict"], "excluded");
    }

    #[test]
    fn selected_has_no_blocking_layer() {
        let d = CandidateDecision::selected("AAA", 58.8, "ok");
        let json = serde_json::to_value(&d).unwrap();
        assert!(json.get("blocking_layer").is_none());
        assert_ne!(d.id, CandidateDecision::selected("AAA", 58.8, "ok").id);
    }

    #[test]
    fn truncated_names_the_cut() {
        let d = CandidateDecision::truncated("BBB", 57.0, 6, 5);
        assert_eq!(d.blocking_layer, Some(BlockingLayer::TopN));
        assert_eq!(d.reason, "ranked 6, outside top 5");
    }
}
