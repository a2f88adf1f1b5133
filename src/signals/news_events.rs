// =============================================================================
// News Event Extractor - headlines to typed, decayed per-symbol signals
// =============================================================================
//
// Pipeline:
//   1. Validate items (no symbol / empty title are excluded and counted)
//   2. Fan multi-symbol items out to one item per symbol
//   3. Deduplicate on (symbol, normalized title), first seen wins
//   4. Match each title against the ordered rule list -> 0 or 1 event
//   5. Weight = base_impact * sentiment * confidence * 2^(-age / half_life)
//   6. Aggregate per symbol: clamp(sum, -100, 100), counts, top-K summary
// =============================================================================

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{NewsParams, PolicyConfig};
use crate::error::ScanError;
use crate::signals::decay::HalfLifeDecay;
use crate::types::NewsItem;

// =============================================================================
// Event vocabulary
// =============================================================================

/// Fixed event vocabulary. Identifiers are stable and appear in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    EarningsGrowth,
    NewOrder,
    Buyback,
    Innovation,
    PolicySupport,
    ShareholderReduction,
    EarningsDrop,
    ComplianceRisk,
    DelistOrDefault,
}

impl EventType {
    pub fn is_negative(self) -> bool {
        self.severity() > 0
    }

    /// +1 for positive events, -1 for negative ones.
    pub fn sentiment(self) -> i8 {
        if self.is_negative() {
            -1
        } else {
            1
        }
    }

    /// Magnitude of the event's contribution to a news score at full
    /// confidence and age zero.
    pub fn base_impact(self) -> f64 {
        match self {
            Self::EarningsGrowth => 40.0,
            Self::NewOrder => 35.0,
            Self::Buyback => 35.0,
            Self::Innovation => 30.0,
            Self::PolicySupport => 28.0,
            Self::ShareholderReduction => 35.0,
            Self::EarningsDrop => 45.0,
            Self::ComplianceRisk => 55.0,
            Self::DelistOrDefault => 80.0,
        }
    }

    /// Severity rank among negative events (0 for positive events).
    /// delist_or_default > compliance_risk > earnings_drop > shareholder_reduction.
    pub fn severity(self) -> u8 {
        match self {
            Self::DelistOrDefault => 4,
            Self::ComplianceRisk => 3,
            Self::EarningsDrop => 2,
            Self::ShareholderReduction => 1,
            _ => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EarningsGrowth => "earnings_growth",
            Self::NewOrder => "new_order",
            Self::Buyback => "buyback",
            Self::Innovation => "innovation",
            Self::PolicySupport => "policy_support",
            Self::ShareholderReduction => "shareholder_reduction",
            Self::EarningsDrop => "earnings_drop",
            Self::ComplianceRisk => "compliance_risk",
            Self::DelistOrDefault => "delist_or_default",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Types
// =============================================================================

/// A typed event extracted from one news item for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsEvent {
    pub symbol: String,
    pub title: String,
    pub event_type: EventType,
    pub sentiment: i8,
    pub base_impact: f64,
    /// Rule strength times source weight, in [0.1, 1].
    pub confidence: f64,
    pub age_days: f64,
    pub decayed_weight: f64,
    pub source: String,
    pub published_at: DateTime<Utc>,
}

/// One line of a symbol's news summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_type: EventType,
    pub title: String,
    pub decayed_weight: f64,
}

/// Aggregated news signal for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolNewsSignal {
    pub symbol: String,
    /// Sum of decayed weights, clamped to [-100, 100].
    pub news_score: f64,
    pub event_count: usize,
    pub positive_count: usize,
    pub negative_count: usize,
    /// Top events by |decayed_weight|, largest first.
    pub top_events: Vec<EventSummary>,
}

impl SymbolNewsSignal {
    /// Signal for a symbol with no news: score 0, no events.
    pub fn neutral(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            news_score: 0.0,
            event_count: 0,
            positive_count: 0,
            negative_count: 0,
            top_events: Vec::new(),
        }
    }

    /// Event with the largest absolute contribution.
    pub fn dominant_event(&self) -> Option<EventType> {
        self.top_events.first().map(|e| e.event_type)
    }

    pub fn summary(&self) -> String {
        if self.top_events.is_empty() {
            return "no material news".to_string();
        }
        self.top_events
            .iter()
            .map(|e| {
                let sign = if e.event_type.is_negative() { '-' } else { '+' };
                format!("{sign}{}", e.event_type)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Everything produced by one extraction pass.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub events: Vec<NewsEvent>,
    pub signals: HashMap<String, SymbolNewsSignal>,
    pub items_received: usize,
    /// Validation messages for excluded items.
    pub rejected: Vec<String>,
    pub duplicates_dropped: usize,
}

// =============================================================================
// Deduplication
// =============================================================================

/// Lower-case the title and strip whitespace and punctuation. Letters and
/// digits of any script (including CJK) are kept.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Fan items out to one symbol each and keep the first item per
/// (symbol, normalized title). Idempotent.
pub fn deduplicate(items: &[NewsItem]) -> Vec<NewsItem> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::with_capacity(items.len());

    for item in items {
        let title_key = normalize_title(&item.title);
        for symbol in &item.symbols {
            let symbol = symbol.trim();
            if symbol.is_empty() {
                continue;
            }
            if seen.insert((normalize_symbol(symbol), title_key.clone())) {
                out.push(NewsItem {
                    symbols: vec![symbol.to_string()],
                    title: item.title.clone(),
                    source: item.source.clone(),
                    published_at: item.published_at,
                });
            }
        }
    }
    out
}

// =============================================================================
// Extractor
// =============================================================================

struct CompiledRule {
    regex: Regex,
    event_type: EventType,
    strength: f64,
}

/// Rule-based headline interpreter, built once per run from the policy.
pub struct NewsEventExtractor {
    rules: Vec<CompiledRule>,
    news: NewsParams,
    decay: HalfLifeDecay,
    top_k: usize,
}

impl NewsEventExtractor {
    /// Compile the policy's title rules. A pattern that does not compile is a
    /// policy misconfiguration.
    pub fn from_policy(policy: &PolicyConfig) -> Result<Self, ScanError> {
        let rules = policy
            .news
            .rules
            .iter()
            .map(|r| {
                Regex::new(&r.pattern)
                    .map(|regex| CompiledRule {
                        regex,
                        event_type: r.event_type,
                        strength: r.strength,
                    })
                    .map_err(|e| {
                        ScanError::Composition(format!("title rule '{}': {e}", r.pattern))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules,
            news: policy.news.clone(),
            decay: HalfLifeDecay::new(policy.fusion.half_life_days),
            top_k: policy.fusion.summary_top_k,
        })
    }

    /// Match a title against the rules; the first match wins.
    pub fn classify(&self, title: &str) -> Option<(EventType, f64)> {
        self.rules
            .iter()
            .find(|r| r.regex.is_match(title))
            .map(|r| (r.event_type, r.strength))
    }

    /// Turn one single-symbol item into an event, if any rule matches.
    fn to_event(&self, item: &NewsItem, as_of: DateTime<Utc>) -> Option<NewsEvent> {
        let symbol = item.symbols.first()?;
        let (event_type, strength) = self.classify(&item.title)?;

        let confidence = (strength * self.news.source_weight(&item.source)).clamp(0.1, 1.0);
        let age_days = HalfLifeDecay::age_days(item.published_at, as_of);
        let base_impact = event_type.base_impact();
        let sentiment = event_type.sentiment();
        let decayed_weight =
            self.decay
                .decayed(base_impact * f64::from(sentiment) * confidence, age_days);

        Some(NewsEvent {
            symbol: symbol.clone(),
            title: item.title.clone(),
            event_type,
            sentiment,
            base_impact,
            confidence,
            age_days,
            decayed_weight,
            source: item.source.clone(),
            published_at: item.published_at,
        })
    }

    /// Run the full extraction over raw provider output.
    pub fn extract(&self, items: &[NewsItem], as_of: DateTime<Utc>) -> Extraction {
        let mut rejected = Vec::new();
        let valid: Vec<NewsItem> = items
            .iter()
            .filter(|item| match item.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "news item excluded");
                    rejected.push(e.to_string());
                    false
                }
            })
            .cloned()
            .collect();

        let fanned_out: usize = valid
            .iter()
            .map(|i| i.symbols.iter().filter(|s| !s.trim().is_empty()).count())
            .sum();
        let deduped = deduplicate(&valid);
        let duplicates_dropped = fanned_out - deduped.len();

        let events: Vec<NewsEvent> = deduped
            .iter()
            .filter_map(|item| self.to_event(item, as_of))
            .collect();

        debug!(
            received = items.len(),
            rejected = rejected.len(),
            duplicates_dropped,
            events = events.len(),
            "news events extracted"
        );

        let signals = self.aggregate(&events);
        Extraction {
            events,
            signals,
            items_received: items.len(),
            rejected,
            duplicates_dropped,
        }
    }

    /// Aggregate events into one signal per (normalized) symbol.
    pub fn aggregate(&self, events: &[NewsEvent]) -> HashMap<String, SymbolNewsSignal> {
        let mut by_symbol: HashMap<String, Vec<&NewsEvent>> = HashMap::new();
        for e in events {
            by_symbol.entry(normalize_symbol(&e.symbol)).or_default().push(e);
        }

        by_symbol
            .into_iter()
            .map(|(symbol, mut evs)| {
                let total: f64 = evs.iter().map(|e| e.decayed_weight).sum();
                let negative_count = evs.iter().filter(|e| e.sentiment < 0).count();

                evs.sort_by(|a, b| {
                    b.decayed_weight
                        .abs()
                        .total_cmp(&a.decayed_weight.abs())
                        .then_with(|| a.title.cmp(&b.title))
                });
                let top_events = evs
                    .iter()
                    .take(self.top_k)
                    .map(|e| EventSummary {
                        event_type: e.event_type,
                        title: e.title.clone(),
                        decayed_weight: e.decayed_weight,
                    })
                    .collect();

                let signal = SymbolNewsSignal {
                    symbol: symbol.clone(),
                    news_score: total.clamp(-100.0, 100.0),
                    event_count: evs.len(),
                    positive_count: evs.len() - negative_count,
                    negative_count,
                    top_events,
                };
                (symbol, signal)
            })
            .collect()
    }
}

/// Look up a symbol's signal, falling back to the neutral signal.
pub fn signal_for(signals: &HashMap<String, SymbolNewsSignal>, symbol: &str) -> SymbolNewsSignal {
    signals
        .get(&normalize_symbol(symbol))
        .cloned()
        .unwrap_or_else(|| SymbolNewsSignal::neutral(symbol))
}

/// Events belonging to one symbol.
pub fn events_for<'a>(events: &'a [NewsEvent], symbol: &str) -> Vec<&'a NewsEvent> {
    let key = normalize_symbol(symbol);
    events
        .iter()
        .filter(|e| normalize_symbol(&e.symbol) == key)
        .collect()
}
