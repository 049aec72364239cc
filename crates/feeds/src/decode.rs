//! Decoding of hub push payloads into typed domain records.
//!
//! The hub's push envelope carries heterogeneous records keyed by the
//! inner method name. Known shapes decode into typed variants; unknown
//! methods pass through raw so consumers can evolve without a crate
//! release.

use crate::protocol::HubMessage;
use crate::FeedError;
use bittrex_core::{ExchangeDelta, ExchangeState, MarketPair, SummaryLiteState, SummaryState};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

const METHOD_EXCHANGE_STATE: &str = "updateexchangestate";
const METHOD_SUMMARY_STATE: &str = "updatesummarystate";
const METHOD_SUMMARY_LITE: &str = "updatesummarylitestate";

/// One decoded hub push.
#[derive(Debug, Clone, PartialEq)]
pub enum HubPush {
    /// Incremental order book change, possibly with fills.
    Exchange(ExchangeDelta),
    /// Market summary delta batch.
    Summary(SummaryState),
    /// Lite summary batch backing the ticker feed.
    SummaryLite(SummaryLiteState),
    /// Method this crate does not model. Forwarded, never dropped.
    Unknown { method: String, args: Vec<Value> },
}

/// Decode one hub message into domain records, one per payload argument.
/// Undecodable arguments of known methods are dropped (live-frame parse
/// failures never tear the connection down).
pub fn decode_push(message: HubMessage) -> Vec<HubPush> {
    match message.method.to_ascii_lowercase().as_str() {
        METHOD_EXCHANGE_STATE => decode_each(&message.method, message.args, HubPush::Exchange),
        METHOD_SUMMARY_STATE => decode_each(&message.method, message.args, HubPush::Summary),
        METHOD_SUMMARY_LITE => decode_each(&message.method, message.args, HubPush::SummaryLite),
        _ => vec![HubPush::Unknown {
            method: message.method,
            args: message.args,
        }],
    }
}

fn decode_each<T: DeserializeOwned>(
    method: &str,
    args: Vec<Value>,
    wrap: fn(T) -> HubPush,
) -> Vec<HubPush> {
    args.into_iter()
        .filter_map(|arg| match serde_json::from_value(arg) {
            Ok(payload) => Some(wrap(payload)),
            Err(e) => {
                debug!("discarding undecodable {method} payload: {e}");
                None
            }
        })
        .collect()
}

/// Decode the reply of a full book state query.
pub fn decode_query_state(value: Value) -> Result<ExchangeState, FeedError> {
    Ok(serde_json::from_value(value)?)
}

/// Outcome of checking a book delta against the per-pair sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// First payload seen for this pair since the last reset.
    Fresh,
    /// Exactly the next expected sequence number.
    InOrder,
    /// At or behind what we already delivered; drop it.
    Stale,
    /// Sequence numbers were skipped; the book needs a re-query.
    Gap { expected: u64, got: u64 },
}

/// Tracks the last delivered `Nounce` per pair within one session.
///
/// Reset on reconnect so the first payload per pair reads as a fresh
/// snapshot.
#[derive(Debug, Default)]
pub struct BookSequencer {
    last: HashMap<MarketPair, u64>,
}

impl BookSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything; the next payload per pair is fresh.
    pub fn reset(&mut self) {
        self.last.clear();
    }

    /// Record the sequence a full snapshot established.
    pub fn observe_snapshot(&mut self, pair: &MarketPair, cseq: u64) {
        self.last.insert(pair.clone(), cseq);
    }

    /// Check a delta's sequence number and advance the tracker.
    pub fn observe_delta(&mut self, pair: &MarketPair, cseq: u64) -> SequenceCheck {
        match self.last.get_mut(pair) {
            None => {
                self.last.insert(pair.clone(), cseq);
                SequenceCheck::Fresh
            }
            Some(last) if cseq <= *last => SequenceCheck::Stale,
            Some(last) if cseq == *last + 1 => {
                *last = cseq;
                SequenceCheck::InOrder
            }
            Some(last) => {
                let expected = *last + 1;
                // Advance anyway so one gap does not fire repeatedly while
                // the re-queried snapshot is in flight.
                *last = cseq;
                SequenceCheck::Gap {
                    expected,
                    got: cseq,
                }
            }
        }
    }
}
