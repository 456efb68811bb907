//! Signal Analyzer Library
//!
//! Turns a quote, recent bars and an external text assessment into a bounded
//! confidence score for outbound trading alerts.

pub mod assessment;
pub mod config;
pub mod extractor;
pub mod indicators;
pub mod orchestrator;
pub mod rate_limit;
pub mod scorer;
pub mod types;

// Re-export main types for convenience
pub use assessment::{AssessmentClient, AssessmentPrompt, ChatCompletionsClient};
pub use config::{AnalyzerConfig, FactorWeights, HourWindow, IndicatorConfig, ScoringConfig};
pub use extractor::ResponseExtractor;
pub use indicators::{IndicatorEngine, IndicatorReading, IndicatorSet, DEFAULT_VOLUME};
pub use orchestrator::{AnalyzerHealth, SignalAnalyzer};
pub use rate_limit::RequestCounter;
pub use scorer::{
    ConfidenceScore, ConfidenceScorer, FixedRandom, RandomSource, ScoringInput, ScoringModel,
    SeededRandom, SuccessFactor, ThreadRandom, FALLBACK_RANGE,
};
pub use types::{
    AnalysisRequest, AnalysisResult, AnalyzerError, DegradedField, ExternalAssessment,
    ExtractedDecision, RateSource, SentimentTally, SignalCategory, TradeAction, UserContext,
};
