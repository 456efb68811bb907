//! Market data retrieval
//!
//! Symbol normalization, the pip/unit table, quote providers and the
//! primary/secondary failover acquirer that produces one `MarketSnapshot`
//! per analysis cycle.

pub mod normalizers;
pub mod pip_table;
pub mod sources;
pub mod symbol;
pub mod types;

pub use pip_table::{asset_profile, AssetCategory, AssetProfile};
pub use sources::{AlphaVantageClient, HealthTracker, TerminalBridgeClient};
pub use symbol::Symbol;
pub use types::*;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default per-provider timeout
const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 5_000;

/// Timeouts applied around each provider call
#[derive(Debug, Clone, Copy)]
pub struct AcquirerTimeouts {
    pub primary: Duration,
    pub secondary: Duration,
}

impl Default for AcquirerTimeouts {
    fn default() -> Self {
        Self {
            primary: Duration::from_millis(DEFAULT_PROVIDER_TIMEOUT_MS),
            secondary: Duration::from_millis(DEFAULT_PROVIDER_TIMEOUT_MS),
        }
    }
}

/// Current-quote acquirer with strict primary → secondary failover
///
/// Providers are never raced: the secondary is last-resort only and is called
/// once, after the primary has definitively failed.
pub struct MarketDataAcquirer {
    primary: Arc<dyn QuoteProvider>,
    secondary: Option<Arc<dyn QuoteProvider>>,
    timeouts: AcquirerTimeouts,
}

impl MarketDataAcquirer {
    pub fn new(primary: Arc<dyn QuoteProvider>) -> Self {
        Self {
            primary,
            secondary: None,
            timeouts: AcquirerTimeouts::default(),
        }
    }

    pub fn with_secondary(mut self, secondary: Arc<dyn QuoteProvider>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_timeouts(mut self, timeouts: AcquirerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Acquire a snapshot for `symbol`, or `DataUnavailable`
    pub async fn acquire(&self, symbol: &Symbol) -> Result<MarketSnapshot> {
        let mut attempts = Vec::with_capacity(2);

        match self
            .try_provider(&self.primary, symbol, QuoteSource::Primary, self.timeouts.primary)
            .await
        {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) => {
                warn!(symbol = %symbol, provider = self.primary.name(), "Primary quote failed: {}", e);
                attempts.push(format!("{}: {}", self.primary.name(), e));
            }
        }

        if let Some(secondary) = &self.secondary {
            match self
                .try_provider(secondary, symbol, QuoteSource::Secondary, self.timeouts.secondary)
                .await
            {
                Ok(snapshot) => {
                    info!(symbol = %symbol, provider = secondary.name(), "Quote served by secondary provider");
                    return Ok(snapshot);
                }
                Err(e) => {
                    warn!(symbol = %symbol, provider = secondary.name(), "Secondary quote failed: {}", e);
                    attempts.push(format!("{}: {}", secondary.name(), e));
                }
            }
        }

        Err(DataRetrievalError::DataUnavailable {
            symbol: symbol.to_string(),
            attempts,
        })
    }

    async fn try_provider(
        &self,
        provider: &Arc<dyn QuoteProvider>,
        symbol: &Symbol,
        source: QuoteSource,
        timeout: Duration,
    ) -> Result<MarketSnapshot> {
        debug!(symbol = %symbol, provider = provider.name(), "Requesting quote");

        let quote = match tokio::time::timeout(timeout, provider.get_quote(symbol)).await {
            Ok(result) => result?,
            Err(_) => {
                provider.record_timeout();
                return Err(DataRetrievalError::Timeout {
                    source_name: provider.name().to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };

        normalizers::normalize_quote(symbol, quote, source, provider.name())
    }

    /// Health of the configured providers (no network calls)
    pub async fn health_check(&self) -> Vec<SourceHealth> {
        let mut healths = vec![self.primary.health().await];
        if let Some(secondary) = &self.secondary {
            healths.push(secondary.health().await);
        }
        healths
    }
}
