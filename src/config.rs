// =============================================================================
// Scan Configuration - versioned policy knobs plus run settings
// =============================================================================
//
// Every tunable constant of the ranking pipeline lives in `PolicyConfig` so
// that a behavior change is visible in the persisted policy snapshot of each
// report. `ScanSettings` carries the operational knobs (provider selection,
// timeouts, report location) that are not part of the audited policy.
//
// All fields carry serde defaults so that an older or partial config file
// still loads. Persistence uses the tmp + rename pattern.
// =============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::ScanError;
use crate::signals::news_events::EventType;

/// Bumped whenever a default below changes meaning.
pub const POLICY_VERSION: u32 = 4;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_policy_version() -> u32 {
    POLICY_VERSION
}

fn default_min_score() -> f64 {
    55.0
}

fn default_chase_filter_pct() -> f64 {
    35.0
}

fn default_cash_buffer() -> f64 {
    0.20
}

fn default_max_positions() -> usize {
    5
}

fn default_max_position_pct() -> f64 {
    0.20
}

fn default_stop_loss() -> f64 {
    0.08
}

fn default_take_profit() -> f64 {
    0.18
}

fn default_trailing_stop() -> f64 {
    0.08
}

fn default_reports_dir() -> String {
    "data/reports".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    20
}

fn default_market_provider() -> String {
    "mock".to_string()
}

fn default_news_provider() -> String {
    "auto".to_string()
}

// =============================================================================
// Policy sub-sections
// =============================================================================

/// Weights of the four scored components in the composite. Must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    pub valuation: f64,
    pub quality: f64,
    pub trend: f64,
    pub catalyst: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            valuation: 0.30,
            quality: 0.25,
            trend: 0.20,
            catalyst: 0.25,
        }
    }
}

impl CompositeWeights {
    pub fn sum(&self) -> f64 {
        self.valuation + self.quality + self.trend + self.catalyst
    }
}

/// Catalyst fusion and news decay parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionParams {
    /// Structured-news weight with zero events.
    pub base_weight: f64,
    /// Weight added per extracted event.
    pub step: f64,
    /// Half-life of a news event's contribution, in days.
    pub half_life_days: f64,
    /// Number of events kept in a symbol's summary.
    pub summary_top_k: usize,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            base_weight: 0.35,
            step: 0.15,
            half_life_days: 1.5,
            summary_top_k: 4,
        }
    }
}

/// Breadth / average-move thresholds for the market regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeParams {
    pub bullish_breadth: f64,
    /// Mean 20-day return (percent) required for a bullish call.
    pub bullish_avg_move: f64,
    pub bearish_breadth: f64,
    pub bearish_avg_move: f64,
    pub bullish_adjustment: f64,
    pub bearish_adjustment: f64,
}

impl Default for RegimeParams {
    fn default() -> Self {
        Self {
            bullish_breadth: 0.60,
            bullish_avg_move: 3.0,
            bearish_breadth: 0.40,
            bearish_avg_move: -3.0,
            bullish_adjustment: 3.0,
            bearish_adjustment: -5.0,
        }
    }
}

/// Risk penalty rules. A total above `max_risk_penalty` vetoes the symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParams {
    pub max_risk_penalty: f64,
    pub low_price: f64,
    pub low_price_penalty: f64,
    pub max_pe: f64,
    pub high_pe_penalty: f64,
    pub min_roe: f64,
    pub weak_roe_penalty: f64,
    pub shareholder_reduction_penalty: f64,
    pub earnings_drop_penalty: f64,
    pub compliance_risk_penalty: f64,
    pub delist_or_default_penalty: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            max_risk_penalty: 30.0,
            low_price: 2.0,
            low_price_penalty: 15.0,
            max_pe: 80.0,
            high_pe_penalty: 15.0,
            min_roe: 3.0,
            weak_roe_penalty: 20.0,
            shareholder_reduction_penalty: 12.0,
            earnings_drop_penalty: 18.0,
            compliance_risk_penalty: 25.0,
            delist_or_default_penalty: 60.0,
        }
    }
}

impl RiskParams {
    /// Penalty contributed by one negative event type (zero for positives).
    pub fn event_penalty(&self, event: EventType) -> f64 {
        match event {
            EventType::ShareholderReduction => self.shareholder_reduction_penalty,
            EventType::EarningsDrop => self.earnings_drop_penalty,
            EventType::ComplianceRisk => self.compliance_risk_penalty,
            EventType::DelistOrDefault => self.delist_or_default_penalty,
            _ => 0.0,
        }
    }
}

/// One title-matching rule. Patterns are regular expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleRule {
    pub pattern: String,
    pub event_type: EventType,
    /// Rule strength, multiplied by the source weight to give confidence.
    pub strength: f64,
}

impl TitleRule {
    fn new(pattern: &str, event_type: EventType, strength: f64) -> Self {
        Self {
            pattern: pattern.to_string(),
            event_type,
            strength,
        }
    }
}

/// Rule-based news interpretation: event rules, legacy keywords and
/// per-source confidence weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsParams {
    /// Checked in order; the first match wins. Negative rules come first,
    /// most severe first.
    pub rules: Vec<TitleRule>,
    pub source_weights: BTreeMap<String, f64>,
    pub unknown_source_weight: f64,
    pub positive_keywords: Vec<String>,
    pub negative_keywords: Vec<String>,
    pub positive_keyword_step: f64,
    pub negative_keyword_step: f64,
}

impl Default for NewsParams {
    fn default() -> Self {
        let rules = vec![
            TitleRule::new(
                r"(?i)退市|违约|暴雷|delist|\b(bond|debt|loan|payment)s?\s+defaults?\b|\bdefault(s|ed)?\s+on\b",
                EventType::DelistOrDefault,
                1.1,
            ),
            TitleRule::new(
                r"(?i)诉讼|处罚|调查|lawsuit|penalt(y|ies)|investigation|fined",
                EventType::ComplianceRisk,
                0.9,
            ),
            TitleRule::new(
                r"(?i)亏损|预亏|下滑|net loss|profit warning|earnings (drop|decline|miss)",
                EventType::EarningsDrop,
                1.0,
            ),
            TitleRule::new(
                r"(?i)减持|清仓|stake (sale|reduction)|sell[- ]?down",
                EventType::ShareholderReduction,
                1.0,
            ),
            TitleRule::new(
                r"(?i)业绩预增|净利增长|利润增长|profit (growth|surge|jump)|earnings (beat|growth)",
                EventType::EarningsGrowth,
                1.0,
            ),
            TitleRule::new(r"(?i)中标|订单|签约|contract|order win", EventType::NewOrder, 0.8),
            TitleRule::new(r"(?i)回购|增持|buyback|repurchase", EventType::Buyback, 0.9),
            TitleRule::new(
                r"(?i)新品|新产品|技术突破|new product|breakthrough",
                EventType::Innovation,
                0.7,
            ),
            TitleRule::new(r"(?i)政策支持|补贴|放开|subsid|policy support", EventType::PolicySupport, 0.7),
        ];

        let mut source_weights = BTreeMap::new();
        source_weights.insert("akshare".to_string(), 0.9);
        source_weights.insert("mock".to_string(), 0.6);

        let words = |w: &[&str]| w.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            rules,
            source_weights,
            unknown_source_weight: 0.5,
            positive_keywords: words(&[
                "中标", "回购", "增长", "业绩预增", "新产品", "政策支持", "contract", "buyback",
                "growth",
            ]),
            negative_keywords: words(&[
                "减持", "诉讼", "亏损", "处罚", "退市", "违约", "lawsuit", "loss", "delist",
            ]),
            positive_keyword_step: 12.0,
            negative_keyword_step: 18.0,
        }
    }
}

impl NewsParams {
    pub fn source_weight(&self, source: &str) -> f64 {
        self.source_weights
            .get(&source.trim().to_lowercase())
            .copied()
            .unwrap_or(self.unknown_source_weight)
    }
}

// =============================================================================
// PolicyConfig
// =============================================================================

/// The audited policy for one scan run. Immutable once loaded and embedded
/// verbatim into the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_policy_version")]
    pub policy_version: u32,

    /// Composite score below which a candidate is dropped.
    #[serde(default = "default_min_score")]
    pub min_score: f64,

    /// 20-day return (percent) above which new entries are vetoed.
    #[serde(default = "default_chase_filter_pct")]
    pub chase_filter_pct: f64,

    /// Fraction of capital kept uninvested.
    #[serde(default = "default_cash_buffer")]
    pub cash_buffer: f64,

    #[serde(default = "default_max_positions")]
    pub max_positions: usize,

    /// Cap on any single position, as a fraction of capital.
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,

    #[serde(default = "default_stop_loss")]
    pub stop_loss: f64,

    #[serde(default = "default_take_profit")]
    pub take_profit: f64,

    #[serde(default = "default_trailing_stop")]
    pub trailing_stop: f64,

    #[serde(default)]
    pub weights: CompositeWeights,

    #[serde(default)]
    pub fusion: FusionParams,

    #[serde(default)]
    pub regime: RegimeParams,

    #[serde(default)]
    pub risk: RiskParams,

    #[serde(default)]
    pub news: NewsParams,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            policy_version: POLICY_VERSION,
            min_score: default_min_score(),
            chase_filter_pct: default_chase_filter_pct(),
            cash_buffer: default_cash_buffer(),
            max_positions: default_max_positions(),
            max_position_pct: default_max_position_pct(),
            stop_loss: default_stop_loss(),
            take_profit: default_take_profit(),
            trailing_stop: default_trailing_stop(),
            weights: CompositeWeights::default(),
            fusion: FusionParams::default(),
            regime: RegimeParams::default(),
            risk: RiskParams::default(),
            news: NewsParams::default(),
        }
    }
}

impl PolicyConfig {
    /// Check the policy for misconfiguration that would break scoring
    /// invariants.
    pub fn validate(&self) -> Result<(), ScanError> {
        let bad = |msg: String| Err(ScanError::Composition(msg));

        let weights = [
            self.weights.valuation,
            self.weights.quality,
            self.weights.trend,
            self.weights.catalyst,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return bad(format!("composite weights must be non-negative: {:?}", self.weights));
        }
        if (self.weights.sum() - 1.0).abs() > 1e-6 {
            return bad(format!(
                "composite weights must sum to 1.0, got {:.4}",
                self.weights.sum()
            ));
        }
        if !(0.0..1.0).contains(&self.cash_buffer) {
            return bad(format!("cash_buffer {} outside [0, 1)", self.cash_buffer));
        }
        if self.max_position_pct.is_nan() || self.max_position_pct <= 0.0 || self.max_position_pct > 1.0 {
            return bad(format!("max_position_pct {} outside (0, 1]", self.max_position_pct));
        }
        if self.max_positions == 0 {
            return bad("max_positions must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.fusion.base_weight) || self.fusion.step < 0.0 {
            return bad(format!(
                "fusion base_weight {} / step {} invalid",
                self.fusion.base_weight, self.fusion.step
            ));
        }
        if self.fusion.half_life_days.is_nan() || self.fusion.half_life_days <= 0.0 {
            return bad(format!("half_life_days {} must be positive", self.fusion.half_life_days));
        }
        if self.regime.bearish_breadth > self.regime.bullish_breadth
            || self.regime.bearish_avg_move > self.regime.bullish_avg_move
        {
            return bad("regime lower thresholds exceed upper thresholds".to_string());
        }
        for rule in &self.news.rules {
            if let Err(e) = Regex::new(&rule.pattern) {
                return bad(format!("title rule '{}' does not compile: {e}", rule.pattern));
            }
        }
        Ok(())
    }

    /// SHA-256 of the canonical JSON form, used to tell policies apart in
    /// persisted reports.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

// =============================================================================
// ScanSettings / ScanConfig
// =============================================================================

/// Operational settings. Not part of the audited policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    #[serde(default = "default_reports_dir")]
    pub reports_dir: String,

    /// Upper bound for a single provider call.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// `mock` or `file:<path>`.
    #[serde(default = "default_market_provider")]
    pub market_provider: String,

    /// `auto`, `mock`, `none` or `file:<path>`.
    #[serde(default = "default_news_provider")]
    pub news_provider: String,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            reports_dir: default_reports_dir(),
            provider_timeout_secs: default_provider_timeout_secs(),
            market_provider: default_market_provider(),
            news_provider: default_news_provider(),
        }
    }
}

/// Top-level config file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub settings: ScanSettings,
}

impl ScanConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scan config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse scan config from {}", path.display()))?;

        info!(
            path = %path.display(),
            policy_version = config.policy.policy_version,
            market_provider = %config.settings.market_provider,
            news_provider = %config.settings.news_provider,
            "scan config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise scan config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "scan config saved (atomic)");
        Ok(())
    }
}
