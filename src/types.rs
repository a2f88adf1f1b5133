// =============================================================================
// Shared types used across the shadow scanner
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Normalized market snapshot for one symbol, as delivered by a
/// `MarketDataProvider`. Every numeric field except `price` is optional:
/// absence is scored downstream, never rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
    /// Trailing twelve-month price/earnings.
    #[serde(default)]
    pub pe_ttm: Option<f64>,
    #[serde(default)]
    pub pb: Option<f64>,
    /// Return on equity, in percent.
    #[serde(default)]
    pub roe: Option<f64>,
    /// Year-over-year revenue growth, in percent.
    #[serde(default)]
    pub revenue_growth: Option<f64>,
    /// 20-trading-day price change, in percent.
    #[serde(default)]
    pub return_20d: Option<f64>,
    #[serde(default)]
    pub volume_ratio: Option<f64>,
    #[serde(default = "Utc::now")]
    pub as_of: DateTime<Utc>,
}

impl Snapshot {
    /// Reject records that cannot be attributed to a symbol.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.symbol.trim().is_empty() {
            return Err(ScanError::Validation {
                record: format!("snapshot '{}'", self.name),
                message: "missing symbol".to_string(),
            });
        }
        Ok(())
    }

    /// 20-day return if it is present and finite.
    pub fn finite_return_20d(&self) -> Option<f64> {
        self.return_20d.filter(|v| v.is_finite())
    }
}

/// A single news headline. One item may mention several symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub symbols: Vec<String>,
    pub title: String,
    #[serde(default)]
    pub source: String,
    pub published_at: DateTime<Utc>,
}

impl NewsItem {
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.symbols.iter().all(|s| s.trim().is_empty()) {
            return Err(ScanError::Validation {
                record: format!("news '{}'", self.title),
                message: "no symbol attached".to_string(),
            });
        }
        if self.title.trim().is_empty() {
            return Err(ScanError::Validation {
                record: format!("news for {}", self.symbols.join(",")),
                message: "empty title".to_string(),
            });
        }
        Ok(())
    }
}

/// Whether the investor already holds a symbol. Existing holdings are exempt
/// from the chase filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    NewEntry,
    Held,
}

impl Default for PositionState {
    fn default() -> Self {
        Self::NewEntry
    }
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewEntry => write!(f, "new_entry"),
            Self::Held => write!(f, "held"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_without_symbol_is_rejected() {
        let json = r#"{ "symbol": "  ", "name": "Nameless", "price": 3.2 }"#;
        let snap: Snapshot = serde_json::from_str(json).unwrap();
        assert!(matches!(snap.validate(), Err(ScanError::Validation { .. })));
    }

    #[test]
    fn snapshot_optional_fields_default_to_none() {
        let snap: Snapshot = serde_json::from_str(r#"{ "symbol": "600000" }"#).unwrap();
        assert!(snap.validate().is_ok());
        assert!(snap.pe_ttm.is_none());
        assert!(snap.finite_return_20d().is_none());
    }

    #[test]
    fn news_without_symbols_is_rejected() {
        let item = NewsItem {
            symbols: vec![],
            title: "Company wins contract".into(),
            source: "mock".into(),
            published_at: Utc::now(),
        };
        assert!(item.validate().is_err());
    }

    #[test]
    fn position_state_defaults_to_new_entry() {
        assert_eq!(PositionState::default(), PositionState::NewEntry);
        assert_eq!(PositionState::Held.to_string(), "held");
    }
}
