use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::HealthTracker;
use crate::pip_table::{asset_profile, AssetCategory};
use crate::symbol::Symbol;
use crate::types::*;

const SOURCE_NAME: &str = "alphavantage";
const ALPHAVANTAGE_BASE: &str = "https://www.alphavantage.co";

/// Alpha Vantage API client, used as the last-resort quote provider
/// Free tier: 25 calls/day
/// Docs: https://www.alphavantage.co/documentation/
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
    health_tracker: HealthTracker,
}

/// Exchange rate response (currency pairs, metals, crypto)
#[derive(Debug, Deserialize)]
struct ExchangeRateResponse {
    #[serde(rename = "Realtime Currency Exchange Rate")]
    rate: Option<ExchangeRateData>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExchangeRateData {
    #[serde(rename = "5. Exchange Rate")]
    exchange_rate: String,
    #[serde(rename = "8. Bid Price")]
    bid_price: Option<String>,
    #[serde(rename = "9. Ask Price")]
    ask_price: Option<String>,
}

/// Global quote response (equities, indices)
#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    quote: Option<GlobalQuote>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<String>,
}

impl AlphaVantageClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, ALPHAVANTAGE_BASE)
    }

    /// Create client against a specific host (for testing)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            health_tracker: HealthTracker::new(),
        }
    }

    /// Get the current quote, picking the endpoint by asset category
    pub async fn get_quote(&self, symbol: &Symbol) -> Result<ProviderQuote> {
        let started = Instant::now();
        let result = match asset_profile(symbol).category {
            AssetCategory::Equity | AssetCategory::Index => self.global_quote(symbol).await,
            _ => self.exchange_rate(symbol).await,
        };

        match &result {
            Ok(_) => self
                .health_tracker
                .record_success(started.elapsed().as_millis() as u64),
            Err(_) => self.health_tracker.record_failure(),
        }

        result
    }

    async fn exchange_rate(&self, symbol: &Symbol) -> Result<ProviderQuote> {
        let (from, to) = split_exchange_symbol(symbol)
            .ok_or_else(|| DataRetrievalError::AssetNotFound(symbol.to_string()))?;

        debug!("Fetching exchange rate for {}/{}", from, to);

        let data: ExchangeRateResponse = self
            .request(&[
                ("function", "CURRENCY_EXCHANGE_RATE"),
                ("from_currency", from),
                ("to_currency", to),
            ])
            .await?;

        throttled(data.note.as_deref().or(data.information.as_deref()))?;

        let rate = data.rate.ok_or_else(|| {
            DataRetrievalError::InvalidResponse("Missing exchange rate block".to_string())
        })?;

        let last = parse_price(&rate.exchange_rate)?;
        let bid = rate.bid_price.as_deref().map(parse_price).transpose()?;
        let ask = rate.ask_price.as_deref().map(parse_price).transpose()?;

        info!("Exchange rate {}/{}: {}", from, to, last);

        Ok(ProviderQuote {
            last: Some(last),
            bid,
            ask,
            spread: None,
            timestamp: Some(Utc::now()),
        })
    }

    async fn global_quote(&self, symbol: &Symbol) -> Result<ProviderQuote> {
        debug!("Fetching global quote for {}", symbol);

        let data: GlobalQuoteResponse = self
            .request(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol.as_str())])
            .await?;

        throttled(data.note.as_deref().or(data.information.as_deref()))?;

        // Unknown tickers come back as an empty "Global Quote" object
        let price = data
            .quote
            .and_then(|q| q.price)
            .ok_or_else(|| DataRetrievalError::AssetNotFound(symbol.to_string()))?;

        Ok(ProviderQuote {
            last: Some(parse_price(&price)?),
            bid: None,
            ask: None,
            spread: None,
            timestamp: Some(Utc::now()),
        })
    }

    async fn request<T: serde::de::DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/query", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| DataRetrievalError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DataRetrievalError::ApiError(format!(
                "Alpha Vantage API error: {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| DataRetrievalError::InvalidResponse(e.to_string()))
    }
}

/// Alpha Vantage answers throttled calls with HTTP 200 and a "Note" body
fn throttled(message: Option<&str>) -> Result<()> {
    match message {
        Some(_) => Err(DataRetrievalError::RateLimit {
            source_name: SOURCE_NAME.to_string(),
            retry_after: Some(60),
        }),
        None => Ok(()),
    }
}

fn parse_price(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|e| DataRetrievalError::InvalidResponse(format!("Bad price {:?}: {}", raw, e)))
}

/// Split "XAUUSD" / "BTCUSDT" / "EURUSD" into (from, to) currency codes
fn split_exchange_symbol(symbol: &Symbol) -> Option<(&str, &str)> {
    let s = symbol.as_str();
    for quote in ["USDT", "USD", "EUR", "GBP", "JPY", "CHF", "AUD", "CAD", "NZD", "BTC"] {
        if let Some(base) = s.strip_suffix(quote) {
            if base.len() >= 3 {
                return Some((base, quote));
            }
        }
    }
    None
}

#[async_trait::async_trait]
impl QuoteProvider for AlphaVantageClient {
    async fn get_quote(&self, symbol: &Symbol) -> Result<ProviderQuote> {
        AlphaVantageClient::get_quote(self, symbol).await
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
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_split_exchange_symbol() {
        let sym = |s: &str| Symbol::new(s).unwrap();
        assert_eq!(split_exchange_symbol(&sym("EURUSD")), Some(("EUR", "USD")));
        assert_eq!(split_exchange_symbol(&sym("XAUUSD")), Some(("XAU", "USD")));
        assert_eq!(split_exchange_symbol(&sym("BTCUSDT")), Some(("BTC", "USDT")));
        assert_eq!(split_exchange_symbol(&sym("DOGEUSD")), Some(("DOGE", "USD")));
        assert_eq!(split_exchange_symbol(&sym("US30")), None);
    }

    #[tokio::test]
    async fn test_exchange_rate_with_bid_ask() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("function", "CURRENCY_EXCHANGE_RATE"))
            .and(query_param("from_currency", "GBP"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Realtime Currency Exchange Rate": {
                    "1. From_Currency Code": "GBP",
                    "3. To_Currency Code": "USD",
                    "5. Exchange Rate": "1.27110000",
                    "8. Bid Price": "1.27105000",
                    "9. Ask Price": "1.27115000"
                }
            })))
            .mount(&server)
            .await;

        let client = AlphaVantageClient::with_base_url("demo", server.uri());
        let quote = client
            .get_quote(&Symbol::new("GBPUSD").unwrap())
            .await
            .unwrap();

        assert_eq!(quote.last, Some(Decimal::from_str("1.2711").unwrap()));
        assert_eq!(quote.bid, Some(Decimal::from_str("1.27105").unwrap()));
        assert_eq!(quote.ask, Some(Decimal::from_str("1.27115").unwrap()));
    }

    #[tokio::test]
    async fn test_throttle_note_maps_to_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute"
            })))
            .mount(&server)
            .await;

        let client = AlphaVantageClient::with_base_url("demo", server.uri());
        let err = client
            .get_quote(&Symbol::new("EURUSD").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, DataRetrievalError::RateLimit { .. }));
        assert!(!client.health().await.is_healthy);
    }

    #[tokio::test]
    async fn test_unknown_equity_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("function", "GLOBAL_QUOTE"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "Global Quote": {} })),
            )
            .mount(&server)
            .await;

        let client = AlphaVantageClient::with_base_url("demo", server.uri());
        let err = client
            .get_quote(&Symbol::new("ZZZZ").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, DataRetrievalError::AssetNotFound(_)));
    }
}
