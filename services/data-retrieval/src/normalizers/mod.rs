// Normalization of provider quotes into the snapshot shape
use chrono::Utc;
use rust_decimal::Decimal;

use crate::pip_table::asset_profile;
use crate::symbol::Symbol;
use crate::types::*;

/// Turn a raw provider quote into a `MarketSnapshot`
///
/// Non-positive prices are treated as absent. A quote with no usable price at
/// all is malformed so the caller can fail over. `last` is never synthesized
/// from bid/ask; an absent last price is itself a data-quality signal.
pub fn normalize_quote(
    symbol: &Symbol,
    quote: ProviderQuote,
    source: QuoteSource,
    provider: &str,
) -> Result<MarketSnapshot> {
    let last = positive(quote.last);
    let bid = positive(quote.bid);
    let ask = positive(quote.ask);

    if last.is_none() && bid.is_none() && ask.is_none() {
        return Err(DataRetrievalError::InvalidResponse(format!(
            "{} returned no usable price for {}",
            provider, symbol
        )));
    }

    let profile = asset_profile(symbol);
    let raw_spread = match quote.spread.filter(|s| *s >= Decimal::ZERO) {
        Some(spread) => Some(spread),
        None => match (bid, ask) {
            (Some(bid), Some(ask)) if ask >= bid => Some(ask - bid),
            _ => None,
        },
    };

    Ok(MarketSnapshot {
        symbol: symbol.clone(),
        last,
        bid,
        ask,
        spread: raw_spread.map(|s| profile.to_points(s).round_dp(1)),
        source,
        provider: provider.to_string(),
        timestamp: quote.timestamp.unwrap_or_else(Utc::now),
    })
}

fn positive(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| *v > Decimal::ZERO)
}
