use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::symbol::Symbol;

/// Raw quote as returned by a single provider, before normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderQuote {
    pub last: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    /// Provider-reported spread in price units, if any
    pub spread: Option<Decimal>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Which provider in the failover chain satisfied the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    Primary,
    Secondary,
}

impl QuoteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteSource::Primary => "primary",
            QuoteSource::Secondary => "secondary",
        }
    }
}

/// Point-in-time quote for one instrument, produced once per analysis cycle
///
/// Fields are read-only after construction; there is no mutating API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: Symbol,
    pub last: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    /// Spread expressed in points (price delta / unit size)
    pub spread: Option<Decimal>,
    pub source: QuoteSource,
    /// Name of the provider that answered ("terminal_bridge", "alphavantage")
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Best available reference price: last, else bid/ask midpoint
    pub fn reference_price(&self) -> Option<Decimal> {
        self.last.or_else(|| match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        })
    }
}

/// Historical price/volume sample
///
/// Windows are ordered oldest-to-newest by the caller. Volume is optional
/// because several feeds omit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl Bar {
    /// Flat bar at a single price
    pub fn at_price(price: f64, volume: Option<f64>) -> Self {
        Self {
            timestamp: None,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }
}

/// Data source health/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: String,
    pub is_healthy: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub success_rate: f64,
    pub last_latency_ms: u64,
}

/// Error types for data retrieval
#[derive(Debug, thiserror::Error)]
pub enum DataRetrievalError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded for {source_name}")]
    RateLimit {
        source_name: String,
        retry_after: Option<u64>,
    },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("{source_name} timed out after {timeout_ms}ms")]
    Timeout { source_name: String, timeout_ms: u64 },

    #[error("{0} reported disconnected")]
    Disconnected(String),

    #[error("No provider could quote {symbol} (tried: {})", attempts.join(", "))]
    DataUnavailable {
        symbol: String,
        attempts: Vec<String>,
    },
}

/// Result type for data retrieval operations
pub type Result<T> = std::result::Result<T, DataRetrievalError>;

/// Trait for current-quote providers
#[async_trait::async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Get the current quote for a normalized symbol
    async fn get_quote(&self, symbol: &Symbol) -> Result<ProviderQuote>;

    /// Get source health status (no network call)
    async fn health(&self) -> SourceHealth;

    /// Called when the caller abandoned a request at its deadline
    fn record_timeout(&self) {}

    /// Source name
    fn name(&self) -> &str;
}
