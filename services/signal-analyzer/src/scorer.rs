//! Confidence scorer
//!
//! Combines the snapshot, extracted decision and alert context into a single
//! score in [0, 100] through a declarative table of weighted factors. Any
//! internal fault, including a panic, yields a value from `FALLBACK_RANGE`
//! instead of an error.

use chrono::{DateTime, Timelike, Utc};
use data_retrieval::{MarketSnapshot, QuoteSource};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::ops::RangeInclusive;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

use crate::config::{HourWindow, ScoringConfig};
use crate::types::{AnalyzerError, ExtractedDecision, SignalCategory, TradeAction};

/// Upper bound of any single factor score
pub const FACTOR_CEILING: f64 = 80.0;

/// Range the fallback value is drawn from
pub const FALLBACK_RANGE: RangeInclusive<f64> = 45.0..=65.0;

/// Multiplier from a 0-100 rate to the factor scale
const RATE_TO_FACTOR: f64 = FACTOR_CEILING / 100.0;

/// Added for a directional call, subtracted for HOLD
const ACTION_ADJUSTMENT: f64 = 5.0;

/// Penalty when a snapshot arrived without a last price
const MISSING_LAST_PENALTY: f64 = 15.0;

/// Source of uniform values in [0, 1]
pub trait RandomSource: Send + Sync {
    fn next_unit(&self) -> f64;
}

/// Process RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Always returns the same value
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl FixedRandom {
    /// Zero jitter, fallback at the middle of its range
    pub fn neutral() -> Self {
        Self(0.5)
    }
}

impl RandomSource for FixedRandom {
    fn next_unit(&self) -> f64 {
        self.0
    }
}

/// Reproducible RNG for replaying a sequence of analyses
pub struct SeededRandom(Mutex<StdRng>);

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&self) -> f64 {
        use rand::Rng;
        match self.0.lock() {
            Ok(mut rng) => rng.gen::<f64>(),
            Err(poisoned) => poisoned.into_inner().gen::<f64>(),
        }
    }
}

/// How a factor turns the scoring input into a score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorRule {
    AiText,
    DataQuality,
    Consistency,
    SignalType,
    Timing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactorSpec {
    pub name: &'static str,
    pub weight: u32,
    pub rule: FactorRule,
}

/// One evaluated factor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessFactor {
    pub name: &'static str,
    pub score: f64,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceScore {
    pub value: f64,
    /// Empty when `fallback` is set
    pub factors: Vec<SuccessFactor>,
    pub fallback: bool,
}

/// Everything the scorer looks at
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub snapshot: Option<&'a MarketSnapshot>,
    pub assessment_present: bool,
    pub decision: &'a ExtractedDecision,
    pub base_confidence: Option<f64>,
    pub category: SignalCategory,
    pub at: DateTime<Utc>,
}

/// Internal scoring failure; never leaves this module
#[derive(Debug, thiserror::Error)]
pub enum ScoringFault {
    #[error("factor weights sum to {0}, expected 100")]
    InvalidWeights(u32),

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("scoring panicked: {0}")]
    Panicked(String),
}

/// Weighted factor table plus score shaping parameters
#[derive(Debug, Clone)]
pub struct ScoringModel {
    factors: Vec<FactorSpec>,
    base: f64,
    jitter_amplitude: f64,
    primary_session: HourWindow,
    secondary_sessions: Vec<HourWindow>,
}

impl ScoringModel {
    pub fn new(config: &ScoringConfig) -> Result<Self, AnalyzerError> {
        let w = &config.weights;
        let factors = vec![
            FactorSpec { name: "ai_text", weight: w.ai_text, rule: FactorRule::AiText },
            FactorSpec { name: "data_quality", weight: w.data_quality, rule: FactorRule::DataQuality },
            FactorSpec { name: "consistency", weight: w.consistency, rule: FactorRule::Consistency },
            FactorSpec { name: "signal_type", weight: w.signal_type, rule: FactorRule::SignalType },
            FactorSpec { name: "timing", weight: w.timing, rule: FactorRule::Timing },
        ];

        let model = Self {
            factors,
            base: config.base,
            jitter_amplitude: config.jitter_amplitude,
            primary_session: config.primary_session,
            secondary_sessions: config.secondary_sessions.clone(),
        };

        match model.weight_sum() {
            100 => Ok(model),
            sum => Err(AnalyzerError::InvalidWeights(sum)),
        }
    }

    /// Replace the factor table without validation
    pub fn with_factors(mut self, factors: Vec<FactorSpec>) -> Self {
        self.factors = factors;
        self
    }

    pub fn factors(&self) -> &[FactorSpec] {
        &self.factors
    }

    pub fn weight_sum(&self) -> u32 {
        self.factors.iter().map(|f| f.weight).sum()
    }

    fn evaluate(&self, rule: FactorRule, input: &ScoringInput) -> f64 {
        match rule {
            FactorRule::AiText => match input.decision.explicit_rate {
                Some(rate) => rate * RATE_TO_FACTOR,
                None => input.decision.sentiment.score() * RATE_TO_FACTOR,
            },
            FactorRule::DataQuality => data_quality(input.snapshot, input.assessment_present),
            FactorRule::Consistency => match input.base_confidence {
                Some(b) => 20.0 + b.clamp(0.0, 100.0) * 0.6,
                None => match input.decision.action {
                    TradeAction::Buy | TradeAction::Sell => 60.0,
                    TradeAction::Hold => 40.0,
                    TradeAction::Unknown => 25.0,
                },
            },
            FactorRule::SignalType => match input.category {
                SignalCategory::Breakout => 75.0,
                SignalCategory::TradingSignal => 60.0,
                SignalCategory::SupportResistance => 45.0,
                SignalCategory::Other => 30.0,
            },
            FactorRule::Timing => {
                let hour = input.at.hour();
                if self.primary_session.contains(hour) {
                    75.0
                } else if self.secondary_sessions.iter().any(|w| w.contains(hour)) {
                    55.0
                } else {
                    35.0
                }
            }
        }
    }
}

fn data_quality(snapshot: Option<&MarketSnapshot>, assessment_present: bool) -> f64 {
    let score: f64 = match (snapshot.map(|s| s.source), assessment_present) {
        (Some(QuoteSource::Primary), true) => 80.0,
        (Some(QuoteSource::Secondary), true) => 65.0,
        (Some(QuoteSource::Primary), false) => 45.0,
        (Some(QuoteSource::Secondary), false) => 40.0,
        (None, true) => 45.0,
        (None, false) => 20.0,
    };

    match snapshot {
        Some(s) if s.last.is_none() => (score - MISSING_LAST_PENALTY).max(0.0),
        _ => score,
    }
}

/// Uniform value clamped to [0, 1]; garbage becomes the midpoint
fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.5
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub struct ConfidenceScorer {
    model: ScoringModel,
    random: Arc<dyn RandomSource>,
}

impl ConfidenceScorer {
    pub fn new(model: ScoringModel, random: Arc<dyn RandomSource>) -> Self {
        Self { model, random }
    }

    pub fn model(&self) -> &ScoringModel {
        &self.model
    }

    /// Score the input; always returns a value in [0, 100]
    pub fn score(&self, input: &ScoringInput) -> ConfidenceScore {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.compute(input)))
            .unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ScoringFault::Panicked(message))
            });

        match outcome {
            Ok(score) => score,
            Err(fault) => {
                match fault {
                    ScoringFault::Panicked(_) => error!("Confidence scoring failed: {}", fault),
                    _ => warn!("Confidence scoring failed: {}", fault),
                }
                self.fallback()
            }
        }
    }

    fn compute(&self, input: &ScoringInput) -> Result<ConfidenceScore, ScoringFault> {
        let sum = self.model.weight_sum();
        if sum != 100 {
            return Err(ScoringFault::InvalidWeights(sum));
        }

        let mut factors = Vec::with_capacity(self.model.factors.len());
        let mut weighted = 0.0;
        for factor in &self.model.factors {
            let raw = self.model.evaluate(factor.rule, input);
            if !raw.is_finite() {
                return Err(ScoringFault::NonFinite(factor.name));
            }
            let score = raw.clamp(0.0, FACTOR_CEILING);
            weighted += score * factor.weight as f64 / 100.0;
            factors.push(SuccessFactor {
                name: factor.name,
                score,
                weight: factor.weight,
            });
        }

        let adjustment = match input.decision.action {
            TradeAction::Buy | TradeAction::Sell => ACTION_ADJUSTMENT,
            TradeAction::Hold => -ACTION_ADJUSTMENT,
            TradeAction::Unknown => 0.0,
        };
        let jitter = (unit(self.random.next_unit()) * 2.0 - 1.0) * self.model.jitter_amplitude;

        let raw = self.model.base + weighted + adjustment + jitter;
        if !raw.is_finite() {
            return Err(ScoringFault::NonFinite("final score"));
        }
        let value = round1(raw.clamp(0.0, 100.0));

        debug!(
            weighted = weighted,
            adjustment = adjustment,
            jitter = jitter,
            value = value,
            "Confidence computed"
        );

        Ok(ConfidenceScore {
            value,
            factors,
            fallback: false,
        })
    }

    fn fallback(&self) -> ConfidenceScore {
        let (low, high) = (*FALLBACK_RANGE.start(), *FALLBACK_RANGE.end());
        let draw = catch_unwind(AssertUnwindSafe(|| self.random.next_unit())).unwrap_or(0.5);
        let value = round1(low + unit(draw) * (high - low));
        ConfidenceScore {
            value,
            factors: Vec::new(),
            fallback: true,
        }
    }
}
