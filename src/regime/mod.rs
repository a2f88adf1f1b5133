// =============================================================================
// Regime Detection Module
// =============================================================================
//
// Market-wide regime inferred from the scanned universe:
// - Breadth (share of symbols with a positive 20-day return)
// - Average 20-day move

pub mod detector;

pub use detector::{RegimeDetector, RegimeState};
