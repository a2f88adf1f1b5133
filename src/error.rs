// =============================================================================
// Error taxonomy for the scan pipeline
// =============================================================================
//
// Provider and Timeout errors are absorbed at stage boundaries and turned into
// diagnostics. Validation errors exclude a single record. Composition and
// Persistence errors abort the run.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("provider {provider} timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    #[error("invalid {record}: {message}")]
    Validation { record: String, message: String },

    #[error("composition error: {0}")]
    Composition(String),

    #[error("failed to persist report to {path}: {message}")]
    Persistence { path: String, message: String },
}

impl ScanError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Errors that must abort the run rather than degrade a stage.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::Composition(_) | Self::Persistence { .. })
    }
}
