//! Instrument symbol normalization

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{DataRetrievalError, Result};

/// Characters stripped from raw symbols ("EUR/USD", "btc-usd", "XAU_USD")
const SEPARATORS: &[char] = &['/', '-', '_', '.', ':'];

/// Normalized instrument identifier
///
/// Always uppercase with separators and whitespace removed. There is no way
/// to build a `Symbol` that skips normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: &str) -> Result<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && !SEPARATORS.contains(c))
            .flat_map(char::to_uppercase)
            .collect();

        if normalized.is_empty() {
            return Err(DataRetrievalError::InvalidSymbol(raw.to_string()));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split a six-letter pair symbol into (base, quote)
    pub fn split_pair(&self) -> Option<(&str, &str)> {
        if self.0.len() == 6 && self.0.chars().all(|c| c.is_ascii_alphabetic()) {
            Some((&self.0[..3], &self.0[3..]))
        } else {
            None
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = DataRetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = DataRetrievalError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
