//! End-to-end analysis pipeline tests
//!
//! Validates the full flow over mocked collaborators:
//! symbol → snapshot (failover) → indicators → assessment → extraction → score


use chrono::{TimeZone, Utc};
use data_retrieval::{Bar, MarketSnapshot, QuoteSource, Symbol};
use mock_services::{analyzer, dec, eurusd_quote, rising_bars, MockAssessor, MockQuoteProvider};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use signal_analyzer::{
    AnalysisRequest, AnalysisResult, AnalyzerConfig, ConfidenceScorer, DegradedField,
    ExtractedDecision, RateSource, ScoringInput, ScoringModel, ScoringConfig, SeededRandom,
    SentimentTally, SignalCategory, TradeAction, UserContext,
};
use std::sync::Arc;

const TAGGED_REPLY: &str = "Momentum is strong and the probability of success is 40%. \
Confidence: 55%.\n[success_rate]=73\n[action]=BUY";

fn request(bars: Vec<Bar>) -> AnalysisRequest {
    AnalysisRequest::new("EUR/USD", bars)
        .at(Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap())
        .with_context(UserContext {
            signal_category: SignalCategory::Breakout,
            ..Default::default()
        })
}

fn factor(result: &AnalysisResult, name: &str) -> f64 {
    result
        .confidence
        .factors
        .iter()
        .find(|f| f.name == name)
        .map(|f| f.score)
        .unwrap()
}

#[tokio::test]
async fn test_healthy_pipeline_is_not_degraded() {
    let primary = MockQuoteProvider::answering("bridge", eurusd_quote());
    let assessor = MockAssessor::replying(TAGGED_REPLY);
    let analyzer = analyzer(primary.clone(), None, assessor.clone(), &AnalyzerConfig::default());

    let result = analyzer.analyze(request(rising_bars(60, Some(1000.0)))).await;

    assert_eq!(result.symbol, "EURUSD");
    assert!(!result.degraded, "unexpected degradation: {:?}", result.degraded_fields);
    let snapshot = result.snapshot.as_ref().unwrap();
    assert_eq!(snapshot.source, QuoteSource::Primary);
    assert_eq!(snapshot.spread, Some(dec("2")));
    assert_eq!(result.decision.action, TradeAction::Buy);
    assert!(!result.confidence.fallback);
    assert_eq!(primary.calls(), 1);

    let prompts = assessor.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].user.contains("Instrument: EURUSD"));
    assert!(prompts[0].user.contains("last=1.0851"));
}

#[tokio::test]
async fn test_tagged_rate_wins_over_phrases() {
    let analyzer = analyzer(
        MockQuoteProvider::answering("bridge", eurusd_quote()),
        None,
        MockAssessor::replying(TAGGED_REPLY),
        &AnalyzerConfig::default(),
    );

    let result = analyzer.analyze(request(rising_bars(30, Some(1000.0)))).await;

    assert_eq!(result.decision.explicit_rate, Some(73.0));
    assert_eq!(result.decision.rate_source, Some(RateSource::Tagged));
    assert!((factor(&result, "ai_text") - 58.4).abs() < 1e-9);
}

#[tokio::test]
async fn test_range_only_reply_has_no_explicit_rate() {
    let analyzer = analyzer(
        MockQuoteProvider::answering("bridge", eurusd_quote()),
        None,
        MockAssessor::replying("Hard to call. Success rate 20–34% depending on the data."),
        &AnalyzerConfig::default(),
    );

    let result = analyzer.analyze(request(rising_bars(30, Some(1000.0)))).await;

    assert_eq!(result.decision.explicit_rate, None);
    assert_eq!(result.decision.rate_source, None);
    assert!(!result.is_degraded_on(DegradedField::Assessment));
    // Falls back to keyword sentiment, which is neutral here
    assert_eq!(factor(&result, "ai_text"), 40.0);
}

#[tokio::test]
async fn test_everything_absent_still_scores() {
    let primary = MockQuoteProvider::disconnected("bridge");
    let analyzer = analyzer(
        primary.clone(),
        None,
        MockAssessor::unavailable(),
        &AnalyzerConfig::default(),
    );

    let result = analyzer.analyze(AnalysisRequest::new("XAUUSD", Vec::new())).await;

    assert!(result.degraded);
    assert!((0.0..=100.0).contains(&result.confidence.value));
    for field in [
        DegradedField::Snapshot,
        DegradedField::Assessment,
        DegradedField::PriceHistory,
        DegradedField::Volume,
    ] {
        assert!(result.is_degraded_on(field), "missing {:?}", field);
    }
    assert!(result.snapshot.is_none());
    assert_eq!(result.decision.action, TradeAction::Unknown);
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn test_secondary_snapshot_lowers_data_quality() {
    let config = AnalyzerConfig::default();
    let via_primary = analyzer(
        MockQuoteProvider::answering("bridge", eurusd_quote()),
        Some(MockQuoteProvider::answering("alphavantage", eurusd_quote())),
        MockAssessor::replying(TAGGED_REPLY),
        &config,
    );
    let secondary = MockQuoteProvider::answering("alphavantage", eurusd_quote());
    let via_secondary = analyzer(
        MockQuoteProvider::disconnected("bridge"),
        Some(secondary.clone()),
        MockAssessor::replying(TAGGED_REPLY),
        &config,
    );

    let bars = rising_bars(30, Some(1000.0));
    let p = via_primary.analyze(request(bars.clone())).await;
    let s = via_secondary.analyze(request(bars)).await;

    let snapshot = s.snapshot.as_ref().unwrap();
    assert_eq!(snapshot.source, QuoteSource::Secondary);
    assert_eq!(snapshot.provider, "alphavantage");
    assert_eq!(secondary.calls(), 1);
    assert!(factor(&s, "data_quality") < factor(&p, "data_quality"));
    assert!(s.confidence.value < p.confidence.value);
}

#[tokio::test]
async fn test_snapshot_without_last_price_is_degraded() {
    let mut quote = eurusd_quote();
    quote.last = None;
    let analyzer = analyzer(
        MockQuoteProvider::answering("bridge", quote),
        None,
        MockAssessor::replying(TAGGED_REPLY),
        &AnalyzerConfig::default(),
    );

    let result = analyzer.analyze(request(rising_bars(30, Some(1000.0)))).await;

    assert!(result.snapshot.is_some());
    assert!(result.is_degraded_on(DegradedField::LastPrice));
    assert_eq!(factor(&result, "data_quality"), 65.0);
}

#[tokio::test]
async fn test_volume_boundary_and_sentinel() {
    let analyzer = analyzer(
        MockQuoteProvider::answering("bridge", eurusd_quote()),
        None,
        MockAssessor::replying(TAGGED_REPLY),
        &AnalyzerConfig::default(),
    );

    let mut bars = rising_bars(10, Some(1000.0));
    bars.push(Bar::at_price(1.09, Some(1500.0)));
    let result = analyzer.analyze(request(bars)).await;
    assert_eq!(result.indicators.volume_ratio.value, 1.5);
    assert_eq!(result.indicators.volume_ratio.label, "high");
    assert!(!result.is_degraded_on(DegradedField::Volume));

    let result = analyzer.analyze(request(rising_bars(10, None))).await;
    assert_eq!(result.indicators.volume_ratio.value, 1.0);
    assert_eq!(result.indicators.volume_ratio.label, "normal");
    assert!(result.is_degraded_on(DegradedField::Volume));
}

#[tokio::test]
async fn test_identical_inputs_give_identical_scores() {
    let analyzer = analyzer(
        MockQuoteProvider::answering("bridge", eurusd_quote()),
        None,
        MockAssessor::replying(TAGGED_REPLY),
        &AnalyzerConfig::default(),
    );

    let bars = rising_bars(40, Some(900.0));
    let first = analyzer.analyze(request(bars.clone())).await;
    let second = analyzer.analyze(request(bars)).await;

    assert_eq!(first.confidence, second.confidence);
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn test_rate_limited_calls_degrade() {
    let mut config = AnalyzerConfig::default();
    config.rate_limit.max_requests = 1;
    let primary = MockQuoteProvider::answering("bridge", eurusd_quote());
    let assessor = MockAssessor::replying(TAGGED_REPLY);
    let analyzer = analyzer(primary.clone(), None, assessor.clone(), &config);

    let first = analyzer.analyze(request(rising_bars(30, Some(1000.0)))).await;
    let second = analyzer.analyze(request(rising_bars(30, Some(1000.0)))).await;

    assert!(!first.degraded);
    assert!(second.is_degraded_on(DegradedField::Snapshot));
    assert!(second.is_degraded_on(DegradedField::Assessment));
    assert_eq!(primary.calls(), 1);
    assert_eq!(assessor.prompts().len(), 1);

    let health = analyzer.health().await;
    assert!(health.healthy);
    assert_eq!(health.market_data_requests, 1);
    assert_eq!(health.assessment_requests, 1);
    assert_eq!(health.max_requests_per_window, 1);
}

#[tokio::test]
async fn test_invalid_symbol_skips_market_data() {
    let primary = MockQuoteProvider::answering("bridge", eurusd_quote());
    let analyzer = analyzer(
        primary.clone(),
        None,
        MockAssessor::replying(TAGGED_REPLY),
        &AnalyzerConfig::default(),
    );

    let result = analyzer.analyze(AnalysisRequest::new(" / - ", rising_bars(5, Some(10.0)))).await;

    assert!(result.is_degraded_on(DegradedField::Snapshot));
    assert_eq!(primary.calls(), 0);
    assert!(!result.confidence.fallback);
}

#[tokio::test]
async fn test_result_serializes_for_delivery() {
    let analyzer = analyzer(
        MockQuoteProvider::answering("bridge", eurusd_quote()),
        None,
        MockAssessor::unavailable(),
        &AnalyzerConfig::default(),
    );

    let result = analyzer.analyze(request(rising_bars(30, Some(1000.0)))).await;
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["symbol"], "EURUSD");
    assert_eq!(json["degraded"], true);
    assert_eq!(json["degraded_fields"][0], "assessment");
    assert_eq!(json["assessment"]["status"], "unavailable");
    assert_eq!(json["profile"]["category"], "currency_pair");
    assert_eq!(json["confidence"]["factors"].as_array().unwrap().len(), 5);
}

#[test]
fn test_default_weights_sum_to_100() {
    let model = ScoringModel::new(&ScoringConfig::default()).unwrap();
    assert_eq!(model.weight_sum(), 100);
    assert_eq!(model.factors().len(), 5);
}

#[test]
fn test_scores_stay_in_bounds_for_random_inputs() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let model = ScoringModel::new(&ScoringConfig::default()).unwrap();
    let scorer = ConfidenceScorer::new(model, Arc::new(SeededRandom::new(7)));

    let actions = [TradeAction::Buy, TradeAction::Sell, TradeAction::Hold, TradeAction::Unknown];
    let categories = [
        SignalCategory::Breakout,
        SignalCategory::TradingSignal,
        SignalCategory::SupportResistance,
        SignalCategory::Other,
    ];

    for _ in 0..500 {
        let snapshot = rng.gen_bool(0.7).then(|| MarketSnapshot {
            symbol: Symbol::new("BTCUSD").unwrap(),
            last: rng.gen_bool(0.8).then(|| dec("64000")),
            bid: None,
            ask: None,
            spread: None,
            source: if rng.gen_bool(0.5) { QuoteSource::Primary } else { QuoteSource::Secondary },
            provider: "mock".to_string(),
            timestamp: Utc::now(),
        });
        let decision = ExtractedDecision {
            action: actions[rng.gen_range(0..actions.len())],
            explicit_rate: rng.gen_bool(0.5).then(|| rng.gen_range(0.0..=100.0)),
            rate_source: None,
            sentiment: SentimentTally {
                positive: rng.gen_range(0..20),
                negative: rng.gen_range(0..20),
            },
        };
        let base_confidence = match rng.gen_range(0..4) {
            0 => None,
            1 => Some(f64::NAN),
            2 => Some(rng.gen_range(-500.0..500.0)),
            _ => Some(rng.gen_range(0.0..=100.0)),
        };

        let score = scorer.score(&ScoringInput {
            snapshot: snapshot.as_ref(),
            assessment_present: rng.gen_bool(0.5),
            decision: &decision,
            base_confidence,
            category: categories[rng.gen_range(0..categories.len())],
            at: Utc.with_ymd_and_hms(2024, 1, 1, rng.gen_range(0..24), 0, 0).unwrap(),
        });

        assert!(
            (0.0..=100.0).contains(&score.value),
            "score {} out of bounds",
            score.value
        );
        if !score.fallback {
            let weights: u32 = score.factors.iter().map(|f| f.weight).sum();
            assert_eq!(weights, 100);
        }
    }
}
