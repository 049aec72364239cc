//! Client facade: reconnection, subscription replay, event dispatch.
//!
//! The facade owns the subscription registry, the current connection and
//! all watchdogs. Callers hold a cheap command handle; domain events flow
//! back over a bounded channel. From the caller's perspective the client
//! stays logically connected across transport drops: mutations made while
//! the link is down take effect when the next session comes up.

use crate::challenge::ChallengeSolver;
use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, SignalrConnection};
use crate::decode::{self, BookSequencer, HubPush, SequenceCheck};
use crate::error::{ErrorDetail, FeedError, HandshakeStep};
use crate::protocol::HubMessage;
use crate::registry::{FeedKind, SubscriptionDiff, SubscriptionRegistry, SubscriptionSnapshot};
use crate::watchdog::Watchdog;
use bittrex_core::{
    ExchangeDelta, Fill, MarketPair, MarketSummary, OrderBookDeltaEntry, OrderBookEntry, SummaryLite,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Typed events on the client's outbound boundary.
#[derive(Debug)]
pub enum ClientEvent {
    Connected {
        connection_id: String,
    },
    Disconnected {
        connection_id: String,
        code: Option<u16>,
        reason: String,
    },
    ConnectionError {
        step: HandshakeStep,
        attempts: u32,
        retry: bool,
        error: ErrorDetail,
    },
    /// Full book snapshot from a state query.
    OrderBook {
        pair: MarketPair,
        cseq: u64,
        bids: Vec<OrderBookEntry>,
        asks: Vec<OrderBookEntry>,
    },
    /// Incremental book change.
    OrderBookUpdate {
        pair: MarketPair,
        cseq: u64,
        bids: Vec<OrderBookDeltaEntry>,
        asks: Vec<OrderBookDeltaEntry>,
    },
    Trades {
        pair: MarketPair,
        data: Vec<Fill>,
    },
    Ticker {
        pair: MarketPair,
        data: SummaryLite,
    },
    Summary {
        data: Vec<MarketSummary>,
    },
    /// Hub method this crate does not model, forwarded raw.
    Raw {
        method: String,
        args: Vec<Value>,
    },
}

#[derive(Debug)]
enum Command {
    SubscribeMarkets { pairs: Vec<MarketPair>, replace: bool },
    UnsubscribeMarkets { pairs: Vec<MarketPair> },
    SubscribeTickers { pairs: Vec<MarketPair>, replace: bool },
    UnsubscribeTickers { pairs: Vec<MarketPair> },
    SubscribeSummary,
    UnsubscribeSummary,
    Disconnect,
}

/// Handle to a running feed client.
///
/// Mutators never fail to the caller; problems surface exclusively as
/// [`ClientEvent`]s on the receiver returned by [`BittrexClient::spawn`].
#[derive(Debug, Clone)]
pub struct BittrexClient {
    commands: mpsc::UnboundedSender<Command>,
}

impl BittrexClient {
    /// Spawn the facade task and return the command handle plus the
    /// event stream.
    pub fn spawn(
        config: ClientConfig,
        solver: Arc<dyn ChallengeSolver>,
    ) -> (Self, mpsc::Receiver<ClientEvent>) {
        let config = Arc::new(config);
        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = FacadeTask::new(Arc::clone(&config), cmd_rx, event_tx);
        tokio::spawn(task.run(solver));
        (Self { commands: cmd_tx }, event_rx)
    }

    pub fn subscribe_to_markets(&self, pairs: Vec<MarketPair>, replace: bool) {
        let _ = self.commands.send(Command::SubscribeMarkets { pairs, replace });
    }

    pub fn unsubscribe_from_markets(&self, pairs: Vec<MarketPair>) {
        let _ = self.commands.send(Command::UnsubscribeMarkets { pairs });
    }

    pub fn subscribe_to_tickers(&self, pairs: Vec<MarketPair>, replace: bool) {
        let _ = self.commands.send(Command::SubscribeTickers { pairs, replace });
    }

    pub fn unsubscribe_from_tickers(&self, pairs: Vec<MarketPair>) {
        let _ = self.commands.send(Command::UnsubscribeTickers { pairs });
    }

    pub fn subscribe_to_summary(&self) {
        let _ = self.commands.send(Command::SubscribeSummary);
    }

    pub fn unsubscribe_from_summary(&self) {
        let _ = self.commands.send(Command::UnsubscribeSummary);
    }

    /// Terminal: tears the connection down, stops all watchdogs and ends
    /// the facade task.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }
}

enum SessionWake {
    Connection(Option<ConnectionEvent>),
    Command(Option<Command>),
    SnapshotReply(Option<(MarketPair, Result<Value, FeedError>)>),
    WatchdogTick,
}

struct FacadeTask {
    config: Arc<ClientConfig>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<ClientEvent>,
    registry: SubscriptionRegistry,
    /// Snapshot last applied to the live connection.
    applied: SubscriptionSnapshot,
    sequencer: BookSequencer,
    watchdogs: Vec<Watchdog>,
    snapshot_replies_tx: mpsc::UnboundedSender<(MarketPair, Result<Value, FeedError>)>,
    snapshot_replies: mpsc::UnboundedReceiver<(MarketPair, Result<Value, FeedError>)>,
    /// The lite summary stream is subscribed at most once per session.
    lite_active: bool,
    shutting_down: bool,
    consumer_gone: bool,
}

impl FacadeTask {
    fn new(
        config: Arc<ClientConfig>,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::Sender<ClientEvent>,
    ) -> Self {
        let watchdogs = [FeedKind::Markets, FeedKind::Tickers, FeedKind::Summary]
            .iter()
            .filter_map(|kind| {
                config
                    .watchdog
                    .get(*kind)
                    .map(|policy| Watchdog::new(*kind, policy))
            })
            .collect();
        let (snapshot_replies_tx, snapshot_replies) = mpsc::unbounded_channel();
        Self {
            config,
            commands,
            events,
            registry: SubscriptionRegistry::new(),
            applied: SubscriptionSnapshot::default(),
            sequencer: BookSequencer::new(),
            watchdogs,
            snapshot_replies_tx,
            snapshot_replies,
            lite_active: false,
            shutting_down: false,
            consumer_gone: false,
        }
    }

    async fn run(mut self, solver: Arc<dyn ChallengeSolver>) {
        let credentials = match solver.solve().await {
            Ok(credentials) => credentials,
            Err(e) => {
                error!("challenge solver failed: {e}");
                let _ = self
                    .events
                    .send(ClientEvent::ConnectionError {
                        step: HandshakeStep::Negotiate,
                        attempts: 0,
                        retry: false,
                        error: e.detail(),
                    })
                    .await;
                return;
            }
        };
        info!("credentials obtained, starting connection loop");

        let mut failed_attempts: u32 = 0;
        let mut first_session = true;
        while !self.shutting_down && !self.consumer_gone {
            if !first_session {
                self.wait_reconnect_delay().await;
                if self.shutting_down {
                    break;
                }
            }
            first_session = false;

            let (conn_tx, mut conn_rx) = mpsc::channel(self.config.channel_capacity);
            let connection = match SignalrConnection::new(
                Arc::clone(&self.config),
                credentials.clone(),
                conn_tx,
            ) {
                Ok(connection) => connection,
                Err(e) => {
                    error!("failed to build connection: {e}");
                    failed_attempts = failed_attempts.saturating_add(1);
                    if !self.config.reconnect_retry.allows_retry_after(failed_attempts) {
                        break;
                    }
                    continue;
                }
            };

            let established = self.drive_connect(&connection, &mut conn_rx).await;
            if self.shutting_down {
                connection.disconnect().await;
                drop(connection);
                self.drain(&mut conn_rx).await;
                break;
            }
            if !established {
                drop(connection);
                self.drain(&mut conn_rx).await;
                failed_attempts = failed_attempts.saturating_add(1);
                if !self.config.reconnect_retry.allows_retry_after(failed_attempts) {
                    error!("reconnect budget exhausted after {failed_attempts} attempt(s)");
                    break;
                }
                continue;
            }

            failed_attempts = 0;
            // Fresh session: the first book payload per pair reads as a
            // snapshot, and the lite summary stream needs resubscribing.
            self.sequencer.reset();
            self.applied = SubscriptionSnapshot::default();
            self.lite_active = false;
            self.apply_registry(&connection).await;

            self.run_session(&connection, &mut conn_rx).await;

            for watchdog in &mut self.watchdogs {
                watchdog.disarm();
            }
            connection.disconnect().await;
            drop(connection);
            self.drain(&mut conn_rx).await;
        }
        info!("feed client stopped");
    }

    /// Drive `connect()` while staying responsive to commands and
    /// forwarding handshake events.
    async fn drive_connect(
        &mut self,
        connection: &SignalrConnection,
        conn_rx: &mut mpsc::Receiver<ConnectionEvent>,
    ) -> bool {
        let connect_fut = connection.connect();
        tokio::pin!(connect_fut);
        loop {
            enum ConnectWake {
                Done(bool),
                Event(Option<ConnectionEvent>),
                Command(Option<Command>),
            }
            let wake = tokio::select! {
                established = &mut connect_fut => ConnectWake::Done(established),
                event = conn_rx.recv() => ConnectWake::Event(event),
                command = self.commands.recv() => ConnectWake::Command(command),
            };
            match wake {
                ConnectWake::Done(established) => return established,
                ConnectWake::Event(Some(event)) => self.forward_lifecycle_event(event).await,
                ConnectWake::Event(None) => {}
                ConnectWake::Command(None) | ConnectWake::Command(Some(Command::Disconnect)) => {
                    self.shutting_down = true;
                    connection.disconnect().await;
                }
                ConnectWake::Command(Some(mutation)) => self.apply_mutation(mutation),
            }
        }
    }

    /// Live loop for one established session. Returns when the session is
    /// over for any reason.
    async fn run_session(
        &mut self,
        connection: &SignalrConnection,
        conn_rx: &mut mpsc::Receiver<ConnectionEvent>,
    ) {
        let mut watchdog_timer = interval(Duration::from_secs(1));
        watchdog_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = tokio::select! {
                event = conn_rx.recv() => SessionWake::Connection(event),
                command = self.commands.recv() => SessionWake::Command(command),
                reply = self.snapshot_replies.recv() => SessionWake::SnapshotReply(reply),
                _ = watchdog_timer.tick() => SessionWake::WatchdogTick,
            };
            match wake {
                SessionWake::Connection(Some(ConnectionEvent::Data(message))) => {
                    self.dispatch(connection, message).await;
                }
                SessionWake::Connection(Some(ConnectionEvent::Disconnected {
                    connection_id,
                    code,
                    reason,
                })) => {
                    warn!("connection {connection_id} lost: {reason}");
                    self.emit(ClientEvent::Disconnected {
                        connection_id,
                        code,
                        reason,
                    })
                    .await;
                    return;
                }
                SessionWake::Connection(Some(other)) => {
                    self.forward_lifecycle_event(other).await;
                }
                SessionWake::Connection(None) => return,
                SessionWake::Command(None) | SessionWake::Command(Some(Command::Disconnect)) => {
                    self.shutting_down = true;
                    return;
                }
                SessionWake::Command(Some(mutation)) => {
                    self.apply_mutation(mutation);
                    self.apply_registry(connection).await;
                }
                SessionWake::SnapshotReply(Some((pair, result))) => {
                    self.handle_snapshot_reply(pair, result).await;
                }
                SessionWake::SnapshotReply(None) => {}
                SessionWake::WatchdogTick => {
                    if self.check_watchdogs(connection).await {
                        return;
                    }
                }
            }
            if self.consumer_gone || self.shutting_down {
                return;
            }
        }
    }

    /// Registry mutation; takes effect on the wire only through
    /// `apply_registry`.
    fn apply_mutation(&mut self, command: Command) {
        match command {
            Command::SubscribeMarkets { pairs, replace } => {
                if replace {
                    self.registry.replace_markets(&pairs);
                } else {
                    self.registry.add_markets(&pairs);
                }
            }
            Command::UnsubscribeMarkets { pairs } => self.registry.remove_markets(&pairs),
            Command::SubscribeTickers { pairs, replace } => {
                if replace {
                    self.registry.replace_tickers(&pairs);
                } else {
                    self.registry.add_tickers(&pairs);
                }
            }
            Command::UnsubscribeTickers { pairs } => self.registry.remove_tickers(&pairs),
            Command::SubscribeSummary => self.registry.set_summary(true),
            Command::UnsubscribeSummary => self.registry.set_summary(false),
            Command::Disconnect => self.shutting_down = true,
        }
    }

    /// Bring the live connection in line with the registry.
    async fn apply_registry(&mut self, connection: &SignalrConnection) {
        let target = self.registry.snapshot();
        let diff = target.diff(&self.applied);
        self.apply_diff(connection, diff).await;
        self.applied = target;
    }

    async fn apply_diff(&mut self, connection: &SignalrConnection, diff: SubscriptionDiff) {
        if diff.is_empty() {
            return;
        }
        let methods = self.config.methods.clone();

        for pair in &diff.subscribe_markets {
            let subscribed = connection
                .invoke(&methods.subscribe_markets, vec![json!(pair.as_str())])
                .await;
            if !subscribed {
                debug!("subscribe {pair} dropped; connection not live");
                continue;
            }
            self.arm(FeedKind::Markets);
            self.query_book_snapshot(connection, pair.clone()).await;
        }
        if !diff.unsubscribe_markets.is_empty() {
            // The hub has no per-pair unsubscribe; removals take effect
            // client-side and fall off the replay set.
            debug!(
                "{} market unsubscription(s) applied locally",
                diff.unsubscribe_markets.len()
            );
        }

        if !diff.subscribe_tickers.is_empty() && !self.lite_active {
            if connection
                .invoke(&methods.subscribe_lite_summary, Vec::new())
                .await
            {
                self.lite_active = true;
                self.arm(FeedKind::Tickers);
            }
        }

        if diff.subscribe_summary
            && connection.invoke(&methods.subscribe_summary, Vec::new()).await
        {
            self.arm(FeedKind::Summary);
        }
    }

    /// Ask for a full book and route the reply back into the event loop.
    async fn query_book_snapshot(&mut self, connection: &SignalrConnection, pair: MarketPair) {
        let (tx, rx) = oneshot::channel();
        let method = self.config.methods.query_market_state.clone();
        if connection
            .invoke_with_reply(&method, vec![json!(pair.as_str())], tx)
            .await
        {
            let replies = self.snapshot_replies_tx.clone();
            tokio::spawn(async move {
                // A dropped sender means the session went away; the query
                // outcome is indeterminate by contract.
                if let Ok(result) = rx.await {
                    let _ = replies.send((pair, result));
                }
            });
        }
    }

    async fn handle_snapshot_reply(&mut self, pair: MarketPair, result: Result<Value, FeedError>) {
        if !self.registry.contains_market(&pair) {
            return;
        }
        match result.and_then(decode::decode_query_state) {
            Ok(state) => {
                self.sequencer.observe_snapshot(&pair, state.nounce);
                self.touch(FeedKind::Markets);
                self.emit(ClientEvent::OrderBook {
                    pair,
                    cseq: state.nounce,
                    bids: state.buys,
                    asks: state.sells,
                })
                .await;
            }
            Err(e) => warn!("book snapshot query for {pair} failed: {e}"),
        }
    }

    /// Decode one hub message and fan the records out to the consumer.
    async fn dispatch(&mut self, connection: &SignalrConnection, message: HubMessage) {
        for push in decode::decode_push(message) {
            if self.consumer_gone {
                return;
            }
            match push {
                HubPush::Exchange(delta) => self.dispatch_book_delta(connection, delta).await,
                HubPush::Summary(state) => {
                    if !self.registry.summary_enabled() {
                        continue;
                    }
                    self.touch(FeedKind::Summary);
                    self.emit(ClientEvent::Summary { data: state.deltas }).await;
                }
                HubPush::SummaryLite(state) => {
                    for lite in state.deltas {
                        if !self.registry.contains_ticker(&lite.market_name) {
                            continue;
                        }
                        self.touch(FeedKind::Tickers);
                        self.emit(ClientEvent::Ticker {
                            pair: lite.market_name.clone(),
                            data: lite,
                        })
                        .await;
                    }
                }
                HubPush::Unknown { method, args } => {
                    self.emit(ClientEvent::Raw { method, args }).await;
                }
            }
        }
    }

    async fn dispatch_book_delta(&mut self, connection: &SignalrConnection, delta: ExchangeDelta) {
        let pair = delta.market_name.clone();
        if !self.registry.contains_market(&pair) {
            return;
        }
        self.touch(FeedKind::Markets);
        match self.sequencer.observe_delta(&pair, delta.nounce) {
            SequenceCheck::Stale => {
                debug!("dropping stale book delta for {pair}");
                return;
            }
            SequenceCheck::Gap { expected, got } => {
                warn!("book sequence gap for {pair}: expected {expected}, got {got}; re-querying");
                self.query_book_snapshot(connection, pair.clone()).await;
            }
            SequenceCheck::Fresh | SequenceCheck::InOrder => {}
        }
        let fills = delta.fills;
        self.emit(ClientEvent::OrderBookUpdate {
            pair: pair.clone(),
            cseq: delta.nounce,
            bids: delta.buys,
            asks: delta.sells,
        })
        .await;
        if !fills.is_empty() {
            self.emit(ClientEvent::Trades { pair, data: fills }).await;
        }
    }

    async fn forward_lifecycle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected { connection_id } => {
                self.emit(ClientEvent::Connected { connection_id }).await;
            }
            ConnectionEvent::ConnectionError {
                step,
                attempts,
                retry,
                error,
            } => {
                self.emit(ClientEvent::ConnectionError {
                    step,
                    attempts,
                    retry,
                    error,
                })
                .await;
            }
            ConnectionEvent::Disconnected {
                connection_id,
                code,
                reason,
            } => {
                self.emit(ClientEvent::Disconnected {
                    connection_id,
                    code,
                    reason,
                })
                .await;
            }
            ConnectionEvent::Data(message) => {
                debug!("dropping data outside a session: {}", message.method);
            }
        }
    }

    /// True when a watchdog asked for a reconnect; the connection is
    /// already torn down silently in that case.
    async fn check_watchdogs(&mut self, connection: &SignalrConnection) -> bool {
        let now = Instant::now();
        let mut reconnect = false;
        for watchdog in &mut self.watchdogs {
            if watchdog.check(now) && watchdog.reconnects() {
                info!("{} watchdog requested reconnect", watchdog.kind().as_str());
                reconnect = true;
            }
        }
        if reconnect {
            // Programmatic teardown: no Disconnected reaches the consumer.
            connection.disconnect().await;
        }
        reconnect
    }

    fn arm(&mut self, kind: FeedKind) {
        let now = Instant::now();
        for watchdog in &mut self.watchdogs {
            if watchdog.kind() == kind {
                watchdog.arm(now);
            }
        }
    }

    fn touch(&mut self, kind: FeedKind) {
        let now = Instant::now();
        for watchdog in &mut self.watchdogs {
            if watchdog.kind() == kind {
                watchdog.touch(now);
            }
        }
    }

    async fn emit(&mut self, event: ClientEvent) {
        if self.events.send(event).await.is_err() {
            self.consumer_gone = true;
        }
    }

    /// Sleep out the reconnect delay without going deaf to commands.
    async fn wait_reconnect_delay(&mut self) {
        let delay = self.config.effective_reconnect_delay();
        info!("reconnecting in {delay:?}");
        let sleep_fut = sleep(delay);
        tokio::pin!(sleep_fut);
        loop {
            let command = tokio::select! {
                _ = &mut sleep_fut => return,
                command = self.commands.recv() => command,
            };
            match command {
                None | Some(Command::Disconnect) => {
                    self.shutting_down = true;
                    return;
                }
                Some(mutation) => self.apply_mutation(mutation),
            }
        }
    }

    /// Consume whatever the finished session still had queued so no event
    /// of connection N can surface after one from connection N+1.
    async fn drain(&mut self, conn_rx: &mut mpsc::Receiver<ConnectionEvent>) {
        while let Some(event) = conn_rx.recv().await {
            match event {
                ConnectionEvent::Data(message) => {
                    debug!("dropping {} queued behind a teardown", message.method);
                }
                other => self.forward_lifecycle_event(other).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::{Credentials, StaticChallengeSolver};
    use crate::config::WatchdogPolicy;
    use crate::retry::RetryBudget;
    use pretty_assertions::assert_eq;

    fn pair(symbol: &str) -> MarketPair {
        MarketPair::new(symbol).unwrap()
    }

    fn task(config: ClientConfig) -> (FacadeTask, mpsc::Receiver<ClientEvent>) {
        let config = Arc::new(config);
        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
        let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        (FacadeTask::new(config, cmd_rx, event_tx), event_rx)
    }

    /// Config that fails fast against a dead local endpoint.
    fn offline_config() -> ClientConfig {
        let mut config = ClientConfig::default()
            .with_endpoints("https://127.0.0.1:9/signalr", "wss://127.0.0.1:9/signalr")
            .with_retry_delay(Duration::from_millis(1));
        config.retry_count.negotiate = RetryBudget::Limited(0);
        config.retry_count.connect = RetryBudget::Limited(0);
        config.retry_count.start = RetryBudget::Limited(0);
        config.reconnect_retry = RetryBudget::Limited(0);
        config.reconnect_delay = Some(Duration::from_millis(1));
        config.channel_capacity = 64;
        config.http_timeout = Duration::from_secs(2);
        config
    }

    fn solver() -> Arc<dyn ChallengeSolver> {
        Arc::new(StaticChallengeSolver::new(Credentials::new("cf=test", "ua")))
    }

    #[test]
    fn test_mutations_update_registry() {
        let (mut task, _rx) = task(ClientConfig::default());

        task.apply_mutation(Command::SubscribeMarkets {
            pairs: vec![pair("USDT-ETH"), pair("BTC-ETH")],
            replace: false,
        });
        task.apply_mutation(Command::SubscribeMarkets {
            pairs: vec![pair("BTC-NEO")],
            replace: true,
        });

        let snapshot = task.registry.snapshot();
        assert_eq!(
            snapshot.markets.iter().cloned().collect::<Vec<_>>(),
            vec![pair("BTC-NEO")]
        );
    }

    #[test]
    fn test_summary_mutations_toggle_flag() {
        let (mut task, _rx) = task(ClientConfig::default());

        task.apply_mutation(Command::SubscribeSummary);
        assert!(task.registry.summary_enabled());
        task.apply_mutation(Command::UnsubscribeSummary);
        assert!(!task.registry.summary_enabled());
    }

    #[test]
    fn test_watchdogs_built_from_config() {
        let config = ClientConfig::default()
            .with_watchdog(
                FeedKind::Markets,
                WatchdogPolicy {
                    timeout: Duration::from_secs(1800),
                    reconnect: true,
                },
            )
            .with_watchdog(
                FeedKind::Summary,
                WatchdogPolicy {
                    timeout: Duration::from_secs(600),
                    reconnect: false,
                },
            );
        let (task, _rx) = task(config);

        assert_eq!(task.watchdogs.len(), 2);
        assert!(task
            .watchdogs
            .iter()
            .any(|w| w.kind() == FeedKind::Markets && w.reconnects()));
        assert!(task
            .watchdogs
            .iter()
            .any(|w| w.kind() == FeedKind::Summary && !w.reconnects()));
    }

    #[tokio::test]
    async fn test_offline_endpoint_surfaces_terminal_error() {
        let (_client, mut events) = BittrexClient::spawn(offline_config(), solver());

        let deadline = Duration::from_secs(10);
        let event = tokio::time::timeout(deadline, async {
            loop {
                match events.recv().await {
                    Some(ClientEvent::ConnectionError { retry: false, .. }) => {
                        break true;
                    }
                    Some(_) => continue,
                    None => break false,
                }
            }
        })
        .await
        .expect("no terminal connection error within deadline");
        assert!(event);
    }

    #[tokio::test]
    async fn test_disconnect_stops_facade() {
        let (client, mut events) = BittrexClient::spawn(offline_config(), solver());
        client.subscribe_to_markets(vec![pair("USDT-BTC")], false);
        client.disconnect();

        // The facade task ends and the event channel closes.
        let closed = tokio::time::timeout(Duration::from_secs(10), async {
            while events.recv().await.is_some() {}
            true
        })
        .await
        .expect("facade did not stop");
        assert!(closed);
    }

    #[test]
    fn test_mutators_never_fail_after_task_end() {
        // No runtime: the task never spawns, the channel closes when the
        // receiver side drops, and mutators still return without error.
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        drop(cmd_rx);
        let client = BittrexClient { commands: cmd_tx };
        client.subscribe_to_markets(vec![pair("USDT-BTC")], false);
        client.subscribe_to_summary();
        client.disconnect();
    }
}
