//! Pip/unit table
//!
//! Static lookup from a normalized symbol to its asset category and the
//! minimum meaningful price increment. Pure functions, nothing is cached.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::symbol::Symbol;

/// Asset category of an instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    CurrencyPair,
    Metal,
    Crypto,
    Equity,
    Index,
}

impl AssetCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::CurrencyPair => "currency_pair",
            AssetCategory::Metal => "metal",
            AssetCategory::Crypto => "crypto",
            AssetCategory::Equity => "equity",
            AssetCategory::Index => "index",
        }
    }
}

/// Category and unit size for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetProfile {
    pub category: AssetCategory,
    /// Minimum price increment ("pip"/"point"), never zero
    pub unit_size: Decimal,
}

impl AssetProfile {
    const fn new(category: AssetCategory, mantissa: i64, scale: u32) -> Self {
        Self {
            category,
            unit_size: Decimal::from_parts(mantissa as u32, 0, 0, false, scale),
        }
    }

    /// Convert a price delta into a count of points
    pub fn points_between(&self, from: Decimal, to: Decimal) -> Decimal {
        (to - from) / self.unit_size
    }

    /// Express an absolute price distance in points
    pub fn to_points(&self, distance: Decimal) -> Decimal {
        distance.abs() / self.unit_size
    }
}

const FX_MAJOR: AssetProfile = AssetProfile::new(AssetCategory::CurrencyPair, 1, 4); // 0.0001
const FX_JPY: AssetProfile = AssetProfile::new(AssetCategory::CurrencyPair, 1, 2); // 0.01
const GOLD: AssetProfile = AssetProfile::new(AssetCategory::Metal, 1, 1); // 0.1
const SILVER: AssetProfile = AssetProfile::new(AssetCategory::Metal, 1, 2); // 0.01
const PLATINUM: AssetProfile = AssetProfile::new(AssetCategory::Metal, 1, 1);
const CRYPTO_MAJOR: AssetProfile = AssetProfile::new(AssetCategory::Crypto, 1, 0); // 1.0
const CRYPTO_MID: AssetProfile = AssetProfile::new(AssetCategory::Crypto, 1, 1); // 0.1
const CRYPTO_SMALL: AssetProfile = AssetProfile::new(AssetCategory::Crypto, 1, 4);
const INDEX: AssetProfile = AssetProfile::new(AssetCategory::Index, 1, 0);
const INDEX_FINE: AssetProfile = AssetProfile::new(AssetCategory::Index, 1, 1);
const EQUITY: AssetProfile = AssetProfile::new(AssetCategory::Equity, 1, 2);

/// Unclassified instruments are priced like equities
impl Default for AssetProfile {
    fn default() -> Self {
        EQUITY
    }
}

/// Exact entries, checked before any prefix rule
static KNOWN_PROFILES: phf::Map<&'static str, AssetProfile> = phf::phf_map! {
    // Metals
    "XAUUSD" => GOLD,
    "XAUEUR" => GOLD,
    "GOLD" => GOLD,
    "XAGUSD" => SILVER,
    "SILVER" => SILVER,
    "XPTUSD" => PLATINUM,
    "XPDUSD" => PLATINUM,

    // Crypto
    "BTCUSD" => CRYPTO_MAJOR,
    "BTCUSDT" => CRYPTO_MAJOR,
    "ETHUSD" => CRYPTO_MID,
    "ETHUSDT" => CRYPTO_MID,
    "SOLUSD" => CRYPTO_SMALL,
    "XRPUSD" => CRYPTO_SMALL,
    "ADAUSD" => CRYPTO_SMALL,
    "DOGEUSD" => CRYPTO_SMALL,

    // Indices
    "US30" => INDEX,
    "DJI" => INDEX,
    "NAS100" => INDEX,
    "US100" => INDEX,
    "SPX500" => INDEX_FINE,
    "US500" => INDEX_FINE,
    "GER40" => INDEX,
    "DE40" => INDEX,
    "UK100" => INDEX,
    "JP225" => INDEX,

    // Equities
    "AAPL" => EQUITY,
    "TSLA" => EQUITY,
    "MSFT" => EQUITY,
    "NVDA" => EQUITY,
    "AMZN" => EQUITY,
};

const METAL_PREFIXES: &[(&str, AssetProfile)] = &[
    ("XAU", GOLD),
    ("XAG", SILVER),
    ("XPT", PLATINUM),
    ("XPD", PLATINUM),
];

const CRYPTO_PREFIXES: &[(&str, AssetProfile)] = &[
    ("BTC", CRYPTO_MAJOR),
    ("ETH", CRYPTO_MID),
    ("BNB", CRYPTO_MID),
    ("SOL", CRYPTO_SMALL),
    ("XRP", CRYPTO_SMALL),
    ("ADA", CRYPTO_SMALL),
    ("DOGE", CRYPTO_SMALL),
    ("LTC", CRYPTO_MID),
];

const CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CHF", "AUD", "NZD", "CAD", "SEK", "NOK", "DKK", "SGD", "HKD",
    "ZAR", "MXN", "TRY", "PLN", "CNH",
];

/// Look up the asset profile of a normalized symbol
pub fn asset_profile(symbol: &Symbol) -> AssetProfile {
    let sym = symbol.as_str();

    if let Some(profile) = KNOWN_PROFILES.get(sym) {
        return *profile;
    }

    if let Some((_, profile)) = METAL_PREFIXES.iter().find(|(p, _)| sym.starts_with(p)) {
        return *profile;
    }

    if let Some((_, profile)) = CRYPTO_PREFIXES.iter().find(|(p, _)| sym.starts_with(p)) {
        return *profile;
    }

    if let Some((base, quote)) = symbol.split_pair() {
        if CURRENCY_CODES.contains(&base) && CURRENCY_CODES.contains(&quote) {
            return if base == "JPY" || quote == "JPY" {
                FX_JPY
            } else {
                FX_MAJOR
            };
        }
    }

    EQUITY
}
