//! Pipeline orchestrator
//!
//! `SignalAnalyzer::analyze` is the only entry point. Stages run strictly in
//! sequence: symbol → snapshot → indicators → prompt → assessment →
//! extraction → score. Upstream failures degrade the result instead of
//! failing it.

use chrono::Utc;
use data_retrieval::{
    asset_profile, AcquirerTimeouts, AlphaVantageClient, MarketDataAcquirer, MarketSnapshot,
    SourceHealth, Symbol, TerminalBridgeClient,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::assessment::{AssessmentClient, AssessmentPrompt, ChatCompletionsClient};
use crate::config::AnalyzerConfig;
use crate::extractor::ResponseExtractor;
use crate::indicators::IndicatorEngine;
use crate::rate_limit::{RequestCounter, ASSESSMENT_KEY, MARKET_DATA_KEY};
use crate::scorer::{ConfidenceScorer, RandomSource, ScoringInput, ScoringModel, ThreadRandom};
use crate::types::{
    AnalysisRequest, AnalysisResult, AnalyzerError, DegradedField, ExternalAssessment,
};

/// Health report for the supervisor
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerHealth {
    /// At least one quote provider has recently succeeded
    pub healthy: bool,
    pub providers: Vec<SourceHealth>,
    pub market_data_requests: u32,
    pub assessment_requests: u32,
    pub max_requests_per_window: u32,
}

pub struct SignalAnalyzer {
    acquirer: MarketDataAcquirer,
    indicators: IndicatorEngine,
    assessor: Arc<dyn AssessmentClient>,
    extractor: ResponseExtractor,
    scorer: ConfidenceScorer,
    counter: RequestCounter,
}

impl SignalAnalyzer {
    /// Assemble an analyzer from its collaborators
    pub fn new(
        acquirer: MarketDataAcquirer,
        assessor: Arc<dyn AssessmentClient>,
        config: &AnalyzerConfig,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self, AnalyzerError> {
        config.validate()?;

        Ok(Self {
            acquirer,
            indicators: IndicatorEngine::new(config.indicators),
            assessor,
            extractor: ResponseExtractor::new(),
            scorer: ConfidenceScorer::new(ScoringModel::new(&config.scoring)?, random),
            counter: RequestCounter::from_config(&config.rate_limit),
        })
    }

    /// Production wiring: terminal bridge first, Alpha Vantage as secondary
    /// when a key is configured, chat-completions assessments
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let providers = &config.providers;
        let mut acquirer = MarketDataAcquirer::new(Arc::new(TerminalBridgeClient::new(
            providers.bridge_url.as_str(),
        )))
        .with_timeouts(AcquirerTimeouts {
            primary: providers.primary_timeout(),
            secondary: providers.secondary_timeout(),
        });

        match &providers.alphavantage_api_key {
            Some(key) => {
                acquirer = acquirer.with_secondary(Arc::new(AlphaVantageClient::with_base_url(
                    key.as_str(),
                    providers.alphavantage_url.as_str(),
                )));
            }
            None => warn!("No Alpha Vantage key configured, running without a secondary provider"),
        }

        let assessor = Arc::new(ChatCompletionsClient::new(&config.assessment)?);
        Self::new(acquirer, assessor, config, Arc::new(ThreadRandom))
    }

    /// Shared request counter handle
    pub fn counter(&self) -> &RequestCounter {
        &self.counter
    }

    /// Run one analysis; never fails
    pub async fn analyze(&self, request: AnalysisRequest) -> AnalysisResult {
        let started = Instant::now();
        let mut degraded = Vec::new();

        let symbol = match Symbol::new(&request.symbol) {
            Ok(symbol) => Some(symbol),
            Err(e) => {
                warn!("Skipping market data: {}", e);
                None
            }
        };
        let symbol_text = symbol
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| request.symbol.trim().to_uppercase());
        let profile = symbol.as_ref().map(asset_profile).unwrap_or_default();

        let snapshot = match &symbol {
            Some(symbol) => self.fetch_snapshot(symbol).await,
            None => None,
        };
        match &snapshot {
            None => degraded.push(DegradedField::Snapshot),
            Some(s) if s.last.is_none() => degraded.push(DegradedField::LastPrice),
            Some(_) => {}
        }

        let indicators = self.indicators.compute(&request.bars);
        if indicators.no_valid_prices {
            degraded.push(DegradedField::PriceHistory);
        }
        if indicators.no_valid_volume {
            degraded.push(DegradedField::Volume);
        }

        let prompt = AssessmentPrompt::build(
            &symbol_text,
            &profile,
            snapshot.as_ref(),
            &indicators,
            &request.context,
        );

        let assessment = if self.counter.check(ASSESSMENT_KEY).await {
            self.assessor.assess(&prompt).await
        } else {
            warn!(symbol = %symbol_text, "Assessment rate limit reached");
            ExternalAssessment::Unavailable("assessment rate limit reached".to_string())
        };
        if !assessment.is_available() {
            degraded.push(DegradedField::Assessment);
        }

        let decision = self.extractor.extract(&assessment);

        let confidence = self.scorer.score(&ScoringInput {
            snapshot: snapshot.as_ref(),
            assessment_present: assessment.is_available(),
            decision: &decision,
            base_confidence: request.context.base_confidence,
            category: request.context.signal_category,
            at: request.as_of.unwrap_or_else(Utc::now),
        });
        if confidence.fallback {
            degraded.push(DegradedField::Score);
        }

        info!(
            symbol = %symbol_text,
            confidence = confidence.value,
            action = decision.action.as_str(),
            degraded = ?degraded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis complete"
        );

        AnalysisResult {
            id: Uuid::new_v4(),
            symbol: symbol_text,
            profile,
            snapshot,
            indicators,
            assessment,
            decision,
            confidence,
            degraded: !degraded.is_empty(),
            degraded_fields: degraded,
            analyzed_at: Utc::now(),
        }
    }

    async fn fetch_snapshot(&self, symbol: &Symbol) -> Option<MarketSnapshot> {
        if !self.counter.check(MARKET_DATA_KEY).await {
            warn!(symbol = %symbol, "Market data rate limit reached");
            return None;
        }

        match self.acquirer.acquire(symbol).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(symbol = %symbol, "Market data unavailable: {}", e);
                None
            }
        }
    }

    pub async fn health(&self) -> AnalyzerHealth {
        let providers = self.acquirer.health_check().await;
        AnalyzerHealth {
            healthy: providers.iter().any(|p| p.is_healthy),
            providers,
            market_data_requests: self.counter.usage(MARKET_DATA_KEY).await,
            assessment_requests: self.counter.usage(ASSESSMENT_KEY).await,
            max_requests_per_window: self.counter.max_requests(),
        }
    }
}
