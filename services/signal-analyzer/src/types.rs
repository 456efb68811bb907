//! Core types for the analysis pipeline
//!
//! Everything here is created per analysis and dropped afterwards. The
//! `AnalysisResult` is the contract with the chat-delivery layer.

use chrono::{DateTime, Utc};
use data_retrieval::{AssetProfile, Bar, MarketSnapshot};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::indicators::IndicatorSet;
use crate::scorer::ConfidenceScore;

/// Trade direction recovered from assessment text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
    #[default]
    Unknown,
}

impl TradeAction {
    pub fn is_directional(&self) -> bool {
        matches!(self, TradeAction::Buy | TradeAction::Sell)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
            TradeAction::Hold => "HOLD",
            TradeAction::Unknown => "UNKNOWN",
        }
    }
}

/// Which extraction strategy produced an explicit rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Tagged,
    Phrase,
    TrailingPercent,
}

/// Positive/negative keyword counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SentimentTally {
    pub positive: u32,
    pub negative: u32,
}

impl SentimentTally {
    /// Largest distance from neutral the tally can express
    const MAX_SHIFT: f64 = 30.0;
    /// Points per keyword of lead
    const STEP: f64 = 6.0;

    /// Keyword-derived score in [20, 80]; a tie is exactly 50
    pub fn score(&self) -> f64 {
        let lead = self.positive as f64 - self.negative as f64;
        let shift = (lead.abs() * Self::STEP).min(Self::MAX_SHIFT);
        if lead > 0.0 {
            50.0 + shift
        } else if lead < 0.0 {
            50.0 - shift
        } else {
            50.0
        }
    }
}

/// Structured fields pulled out of the assessment text
///
/// `explicit_rate` only ever holds a number the text actually stated. The
/// keyword-derived score lives in `sentiment`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractedDecision {
    pub action: TradeAction,
    pub explicit_rate: Option<f64>,
    pub rate_source: Option<RateSource>,
    pub sentiment: SentimentTally,
}

/// Outcome of the external assessment call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "snake_case")]
pub enum ExternalAssessment {
    Text(String),
    /// Reason the assessment could not be obtained
    Unavailable(String),
}

impl ExternalAssessment {
    pub fn is_available(&self) -> bool {
        matches!(self, ExternalAssessment::Text(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ExternalAssessment::Text(text) => Some(text),
            ExternalAssessment::Unavailable(_) => None,
        }
    }
}

/// Kind of alert being scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    Breakout,
    TradingSignal,
    SupportResistance,
    #[default]
    Other,
}

/// Caller-supplied context for one analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    /// Free-form notes forwarded to the assessment prompt
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub signal_category: SignalCategory,
    /// Confidence the upstream alert already carries, 0-100
    #[serde(default)]
    pub base_confidence: Option<f64>,
    /// Preferred reply language for the assessment (e.g. "en", "ru")
    #[serde(default)]
    pub language: Option<String>,
}

/// Input to `SignalAnalyzer::analyze`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub symbol: String,
    /// Oldest-to-newest
    #[serde(default)]
    pub bars: Vec<Bar>,
    #[serde(default)]
    pub context: UserContext,
    /// Evaluation time for session timing; defaults to now
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

impl AnalysisRequest {
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            bars,
            context: UserContext::default(),
            as_of: None,
        }
    }

    pub fn at(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn with_context(mut self, context: UserContext) -> Self {
        self.context = context;
        self
    }
}

/// Inputs that were absent or replaced by a default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedField {
    Snapshot,
    LastPrice,
    Assessment,
    PriceHistory,
    Volume,
    Score,
}

/// Final, immutable outcome of one analysis
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub symbol: String,
    pub profile: AssetProfile,
    pub snapshot: Option<MarketSnapshot>,
    pub indicators: IndicatorSet,
    pub assessment: ExternalAssessment,
    pub decision: ExtractedDecision,
    pub confidence: ConfidenceScore,
    pub degraded: bool,
    pub degraded_fields: Vec<DegradedField>,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn is_degraded_on(&self, field: DegradedField) -> bool {
        self.degraded_fields.contains(&field)
    }
}

/// Setup-time errors (configuration, scoring model, HTTP client)
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Factor weights must sum to 100, got {0}")]
    InvalidWeights(u32),

    #[error("HTTP client error: {0}")]
    Http(String),
}
