//! Market pair identifiers.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error produced when a market pair string does not match the
/// `QUOTE-BASE` notation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid market pair: {0}")]
pub struct PairParseError(pub String);

/// Market pair in Bittrex quote-base notation, e.g. `USDT-BTC`.
///
/// The quote currency comes first, separated from the base currency by a
/// single dash. Stored inline for cheap cloning in hot subscription paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MarketPair(CompactString);

impl MarketPair {
    /// Parse and validate a pair symbol.
    pub fn new(symbol: &str) -> Result<Self, PairParseError> {
        let mut parts = symbol.split('-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(quote), Some(base), None)
                if !quote.is_empty()
                    && !base.is_empty()
                    && symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') =>
            {
                Ok(Self(CompactString::from(symbol)))
            }
            _ => Err(PairParseError(symbol.to_string())),
        }
    }

    /// The full symbol, e.g. `USDT-BTC`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quote currency, e.g. `USDT`.
    pub fn quote(&self) -> &str {
        self.0.split('-').next().unwrap_or_default()
    }

    /// Base currency, e.g. `BTC`.
    pub fn base(&self) -> &str {
        self.0.split('-').nth(1).unwrap_or_default()
    }
}

impl fmt::Display for MarketPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MarketPair {
    type Err = PairParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for MarketPair {
    type Error = PairParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl TryFrom<&str> for MarketPair {
    type Error = PairParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MarketPair> for String {
    fn from(pair: MarketPair) -> Self {
        pair.0.into()
    }
}
