// =============================================================================
// Signals Module
// =============================================================================
//
// News-derived signal processing for the scan pipeline:
// - Half-life decay of event weights
// - Rule-based headline -> event extraction and per-symbol aggregation
// - Legacy keyword catalyst scoring
// - Adaptive fusion of keyword and structured news scores

pub mod decay;
pub mod fusion;
pub mod keywords;
pub mod news_events;

pub use fusion::CatalystFuser;
pub use keywords::keyword_scores;
pub use news_events::{EventType, Extraction, NewsEvent, NewsEventExtractor};
