//! Order book payload shapes pushed by the exchange hub.

use crate::MarketPair;
use serde::{Deserialize, Serialize};

/// One resting level of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderBookEntry {
    pub quantity: f64,
    pub rate: f64,
}

/// Kind of change a delta entry applies to its price level.
///
/// The hub encodes these as small integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DeltaKind {
    Add,
    Remove,
    Update,
}

impl TryFrom<u8> for DeltaKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeltaKind::Add),
            1 => Ok(DeltaKind::Remove),
            2 => Ok(DeltaKind::Update),
            other => Err(format!("unknown delta kind: {other}")),
        }
    }
}

impl From<DeltaKind> for u8 {
    fn from(kind: DeltaKind) -> Self {
        match kind {
            DeltaKind::Add => 0,
            DeltaKind::Remove => 1,
            DeltaKind::Update => 2,
        }
    }
}

/// One incremental change to a book level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderBookDeltaEntry {
    #[serde(rename = "Type")]
    pub kind: DeltaKind,
    pub quantity: f64,
    pub rate: f64,
}

/// Side of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// An executed trade carried inside a book delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Fill {
    pub order_type: OrderSide,
    pub rate: f64,
    pub quantity: f64,
    /// Naive ISO-8601 timestamp as sent by the hub, no zone attached.
    #[serde(default)]
    pub time_stamp: String,
}

/// Full book state returned by a state query.
///
/// The hub leaves `MarketName` null in query replies; the caller knows
/// which pair it asked about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExchangeState {
    #[serde(default)]
    pub market_name: Option<MarketPair>,
    pub nounce: u64,
    pub buys: Vec<OrderBookEntry>,
    pub sells: Vec<OrderBookEntry>,
}

/// Incremental book update pushed by the hub, with any fills that
/// happened in the same tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExchangeDelta {
    pub market_name: MarketPair,
    pub nounce: u64,
    pub buys: Vec<OrderBookDeltaEntry>,
    pub sells: Vec<OrderBookDeltaEntry>,
    #[serde(default)]
    pub fills: Vec<Fill>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_delta_kind_from_wire() {
        assert_eq!(DeltaKind::try_from(0).unwrap(), DeltaKind::Add);
        assert_eq!(DeltaKind::try_from(1).unwrap(), DeltaKind::Remove);
        assert_eq!(DeltaKind::try_from(2).unwrap(), DeltaKind::Update);
        assert!(DeltaKind::try_from(3).is_err());
    }

    #[test]
    fn test_parse_exchange_delta() {
        let json = r#"{
            "MarketName": "USDT-BTC",
            "Nounce": 42,
            "Buys": [{"Type": 0, "Rate": 9000.5, "Quantity": 1.25}],
            "Sells": [{"Type": 1, "Rate": 9100.0, "Quantity": 0.0}],
            "Fills": [{"OrderType": "BUY", "Rate": 9050.0, "Quantity": 0.5, "TimeStamp": "2019-07-02T12:00:00.297"}]
        }"#;

        let delta: ExchangeDelta = serde_json::from_str(json).unwrap();
        assert_eq!(delta.market_name.as_str(), "USDT-BTC");
        assert_eq!(delta.nounce, 42);
        assert_eq!(delta.buys[0].kind, DeltaKind::Add);
        assert_eq!(delta.sells[0].kind, DeltaKind::Remove);
        assert_eq!(delta.fills[0].order_type, OrderSide::Buy);
        assert_eq!(delta.fills[0].rate, 9050.0);
    }

    #[test]
    fn test_parse_exchange_state_with_null_market() {
        let json = r#"{
            "MarketName": null,
            "Nounce": 7,
            "Buys": [{"Quantity": 2.0, "Rate": 8999.0}],
            "Sells": [{"Quantity": 1.0, "Rate": 9001.0}]
        }"#;

        let state: ExchangeState = serde_json::from_str(json).unwrap();
        assert!(state.market_name.is_none());
        assert_eq!(state.nounce, 7);
        assert_eq!(state.buys.len(), 1);
        assert_eq!(state.sells[0].rate, 9001.0);
    }

    #[test]
    fn test_delta_without_fills_defaults_empty() {
        let json = r#"{
            "MarketName": "BTC-ETH",
            "Nounce": 1,
            "Buys": [],
            "Sells": []
        }"#;

        let delta: ExchangeDelta = serde_json::from_str(json).unwrap();
        assert!(delta.fills.is_empty());
    }
}
