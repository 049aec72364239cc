//! Market summary payload shapes.

use crate::MarketPair;
use serde::{Deserialize, Serialize};

/// 24-hour rollup for one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MarketSummary {
    pub market_name: MarketPair,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub last: Option<f64>,
    #[serde(default)]
    pub base_volume: Option<f64>,
    #[serde(default)]
    pub bid: Option<f64>,
    #[serde(default)]
    pub ask: Option<f64>,
    #[serde(default)]
    pub open_buy_orders: Option<u64>,
    #[serde(default)]
    pub open_sell_orders: Option<u64>,
    #[serde(default)]
    pub prev_day: Option<f64>,
    #[serde(default)]
    pub time_stamp: String,
    #[serde(default)]
    pub created: String,
}

/// Summary delta batch pushed by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SummaryState {
    #[serde(default)]
    pub nounce: u64,
    pub deltas: Vec<MarketSummary>,
}

/// Compact per-market tick from the lite summary stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SummaryLite {
    pub market_name: MarketPair,
    #[serde(default)]
    pub last: Option<f64>,
    #[serde(default)]
    pub base_volume: Option<f64>,
}

/// Lite summary delta batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SummaryLiteState {
    pub deltas: Vec<SummaryLite>,
}
