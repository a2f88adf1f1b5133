// =============================================================================
// Scan Pipeline
// =============================================================================
//
// - Per-stage diagnostics (tagged outcomes, timing)
// - The persisted per-run report and its store
// - The orchestrator that drives one run end to end

pub mod diagnostics;
pub mod orchestrator;
pub mod report;

pub use orchestrator::{ScanOrchestrator, ScanRequest, ScanRun};
pub use report::ReportStore;
