//! Desired-subscription registry.
//!
//! Tracks what the caller wants to be subscribed to, independently of any
//! live connection. The client facade diffs snapshots of this registry to
//! decide which hub methods to invoke, and replays the full snapshot after
//! every reconnect.

use bittrex_core::MarketPair;
use std::collections::BTreeSet;

/// The three streaming feed categories the hub offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Markets,
    Tickers,
    Summary,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Markets => "markets",
            FeedKind::Tickers => "tickers",
            FeedKind::Summary => "summary",
        }
    }
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    pub markets: BTreeSet<MarketPair>,
    pub tickers: BTreeSet<MarketPair>,
    pub summary: bool,
}

/// What has to change to move a connection from `previous` to `self`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDiff {
    pub subscribe_markets: Vec<MarketPair>,
    pub unsubscribe_markets: Vec<MarketPair>,
    pub subscribe_tickers: Vec<MarketPair>,
    pub unsubscribe_tickers: Vec<MarketPair>,
    pub subscribe_summary: bool,
    pub unsubscribe_summary: bool,
}

impl SubscriptionDiff {
    pub fn is_empty(&self) -> bool {
        self.subscribe_markets.is_empty()
            && self.unsubscribe_markets.is_empty()
            && self.subscribe_tickers.is_empty()
            && self.unsubscribe_tickers.is_empty()
            && !self.subscribe_summary
            && !self.unsubscribe_summary
    }
}

impl SubscriptionSnapshot {
    /// Changes needed to get from `previous` to this snapshot.
    /// Additions come out in symbol order.
    pub fn diff(&self, previous: &SubscriptionSnapshot) -> SubscriptionDiff {
        SubscriptionDiff {
            subscribe_markets: self.markets.difference(&previous.markets).cloned().collect(),
            unsubscribe_markets: previous.markets.difference(&self.markets).cloned().collect(),
            subscribe_tickers: self.tickers.difference(&previous.tickers).cloned().collect(),
            unsubscribe_tickers: previous.tickers.difference(&self.tickers).cloned().collect(),
            subscribe_summary: self.summary && !previous.summary,
            unsubscribe_summary: !self.summary && previous.summary,
        }
    }
}

/// Set of currently desired subscriptions across feed categories.
///
/// All operations are idempotent; `replace` swaps a whole category
/// atomically from the caller's perspective.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    markets: BTreeSet<MarketPair>,
    tickers: BTreeSet<MarketPair>,
    summary: bool,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_markets(&mut self, pairs: &[MarketPair]) {
        self.markets.extend(pairs.iter().cloned());
    }

    pub fn remove_markets(&mut self, pairs: &[MarketPair]) {
        for pair in pairs {
            self.markets.remove(pair);
        }
    }

    pub fn replace_markets(&mut self, pairs: &[MarketPair]) {
        self.markets = pairs.iter().cloned().collect();
    }

    pub fn add_tickers(&mut self, pairs: &[MarketPair]) {
        self.tickers.extend(pairs.iter().cloned());
    }

    pub fn remove_tickers(&mut self, pairs: &[MarketPair]) {
        for pair in pairs {
            self.tickers.remove(pair);
        }
    }

    pub fn replace_tickers(&mut self, pairs: &[MarketPair]) {
        self.tickers = pairs.iter().cloned().collect();
    }

    pub fn set_summary(&mut self, enabled: bool) {
        self.summary = enabled;
    }

    pub fn contains_market(&self, pair: &MarketPair) -> bool {
        self.markets.contains(pair)
    }

    pub fn contains_ticker(&self, pair: &MarketPair) -> bool {
        self.tickers.contains(pair)
    }

    pub fn summary_enabled(&self) -> bool {
        self.summary
    }

    pub fn snapshot(&self) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            markets: self.markets.clone(),
            tickers: self.tickers.clone(),
            summary: self.summary,
        }
    }
}
