use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

use super::HealthTracker;
use crate::symbol::Symbol;
use crate::types::*;

const SOURCE_NAME: &str = "terminal_bridge";

/// Default bridge URL (local terminal gateway)
const DEFAULT_BRIDGE_URL: &str = "http://localhost:8765";

/// HTTP client for a local trading-terminal bridge
///
/// The bridge exposes `GET /v1/quote/{symbol}` and answers with the
/// terminal's current tick. A terminal that lost its broker connection
/// answers `connected: false`, which is treated as a provider failure.
pub struct TerminalBridgeClient {
    client: Client,
    base_url: String,
    health_tracker: HealthTracker,
}

#[derive(Debug, Deserialize)]
struct BridgeQuoteResponse {
    #[serde(default = "default_connected")]
    connected: bool,
    last: Option<f64>,
    bid: Option<f64>,
    ask: Option<f64>,
    spread: Option<f64>,
    /// Tick time, unix seconds
    time: Option<i64>,
}

fn default_connected() -> bool {
    true
}

impl TerminalBridgeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(2)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            health_tracker: HealthTracker::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the current tick for a symbol
    pub async fn get_quote(&self, symbol: &Symbol) -> Result<ProviderQuote> {
        let url = format!("{}/v1/quote/{}", self.base_url, symbol);
        let started = Instant::now();

        debug!(symbol = %symbol, url = %url, "Requesting bridge quote");

        let response = self.client.get(&url).send().await.map_err(|e| {
            self.health_tracker.record_failure();
            DataRetrievalError::ApiError(e.to_string())
        })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            self.health_tracker.record_failure();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(DataRetrievalError::RateLimit {
                source_name: SOURCE_NAME.to_string(),
                retry_after,
            });
        }

        if status == StatusCode::NOT_FOUND {
            self.health_tracker.record_failure();
            return Err(DataRetrievalError::AssetNotFound(symbol.to_string()));
        }

        if !status.is_success() {
            self.health_tracker.record_failure();
            let text = response.text().await.unwrap_or_default();
            return Err(DataRetrievalError::ApiError(format!(
                "Bridge error ({}): {}",
                status, text
            )));
        }

        let body: BridgeQuoteResponse = response.json().await.map_err(|e| {
            self.health_tracker.record_failure();
            DataRetrievalError::InvalidResponse(e.to_string())
        })?;

        if !body.connected {
            self.health_tracker.record_failure();
            return Err(DataRetrievalError::Disconnected(SOURCE_NAME.to_string()));
        }

        self.health_tracker
            .record_success(started.elapsed().as_millis() as u64);

        Ok(ProviderQuote {
            last: body.last.and_then(to_decimal),
            bid: body.bid.and_then(to_decimal),
            ask: body.ask.and_then(to_decimal),
            spread: body.spread.and_then(to_decimal),
            timestamp: body.time.and_then(|t| DateTime::<Utc>::from_timestamp(t, 0)),
        })
    }
}

impl Default for TerminalBridgeClient {
    fn default() -> Self {
        Self::new(DEFAULT_BRIDGE_URL)
    }
}

/// Prices arrive as JSON numbers; non-finite values are dropped
fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::try_from(value).ok()
}

#[async_trait::async_trait]
impl QuoteProvider for TerminalBridgeClient {
    async fn get_quote(&self, symbol: &Symbol) -> Result<ProviderQuote> {
        TerminalBridgeClient::get_quote(self, symbol).await
    }

    async fn health(&self) -> SourceHealth {
        self.health_tracker.snapshot(SOURCE_NAME)
    }

    fn record_timeout(&self) {
        self.health_tracker.record_failure();
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::ToPrimitive;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_parses_bridge_quote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/quote/EURUSD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "connected": true,
                "last": 1.0851,
                "bid": 1.085,
                "ask": 1.0852,
                "time": 1_700_000_000
            })))
            .mount(&server)
            .await;

        let client = TerminalBridgeClient::new(server.uri());
        let quote = client
            .get_quote(&Symbol::new("EUR/USD").unwrap())
            .await
            .unwrap();

        let last = quote.last.and_then(|d| d.to_f64()).unwrap();
        assert!((last - 1.0851).abs() < 1e-9);
        assert!(quote.bid.is_some() && quote.ask > quote.bid);
        assert!(quote.spread.is_none());
        assert!(quote.timestamp.is_some());
        assert!(client.health().await.is_healthy);
    }

    #[tokio::test]
    async fn test_disconnected_terminal_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "connected": false })),
            )
            .mount(&server)
            .await;

        let client = TerminalBridgeClient::new(server.uri());
        let err = client
            .get_quote(&Symbol::new("XAUUSD").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, DataRetrievalError::Disconnected(_)));
        assert!(!client.health().await.is_healthy);
    }

    #[tokio::test]
    async fn test_rate_limited_bridge() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let client = TerminalBridgeClient::new(server.uri());
        let err = client
            .get_quote(&Symbol::new("BTCUSD").unwrap())
            .await
            .unwrap_err();

        match err {
            DataRetrievalError::RateLimit { retry_after, .. } => assert_eq!(retry_after, Some(7)),
            other => panic!("unexpected error: {other}"),
        }
    }
}
