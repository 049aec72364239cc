//! Real-time market-data client for the Bittrex SignalR hub.
//!
//! This crate keeps a long-lived channel to the exchange hub alive:
//! a multi-phase handshake behind the anti-bot front door, heartbeats,
//! per-feed staleness watchdogs, and automatic resubscription after any
//! reconnect, delivering typed domain events to the consumer.

pub mod challenge;
pub mod client;
pub mod config;
pub mod connection;
pub mod decode;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod retry;
pub mod watchdog;

pub use challenge::{ChallengeSolver, Credentials, StaticChallengeSolver};
pub use client::{BittrexClient, ClientEvent};
pub use config::{ClientConfig, HubMethods, RetryCounts, WatchdogPolicy, WatchdogSettings};
pub use connection::{ConnectionEvent, ConnectionState, ReplySender, SignalrConnection};
pub use decode::{BookSequencer, HubPush, SequenceCheck};
pub use error::{ErrorDetail, ErrorOrigin, FeedError, HandshakeStep};
pub use protocol::{ConnectionDescriptor, HubInvocation, HubMessage};
pub use registry::{FeedKind, SubscriptionDiff, SubscriptionRegistry, SubscriptionSnapshot};
pub use retry::{RetryBudget, RetryOutcome, RetryPolicy};
pub use watchdog::Watchdog;
