//! One SignalR transport session.
//!
//! A connection owns exactly one socket and drives the lifecycle
//! NEW → CONNECTING → CONNECTED → DISCONNECTING → DISCONNECTED, where
//! CONNECTING may fall straight to DISCONNECTED on handshake failure.
//! DISCONNECTED is terminal; reconnecting means constructing a fresh
//! connection, which also resets the invocation id space.

use crate::challenge::Credentials;
use crate::config::ClientConfig;
use crate::error::{ErrorDetail, FeedError, HandshakeStep};
use crate::protocol::{self, classify_frame, ConnectionDescriptor, FrameKind, HubInvocation, HubMessage};
use crate::retry::{self, RetryOutcome, RetryPolicy};
use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use reqwest::header::{COOKIE, USER_AGENT};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Single-shot continuation for one invocation. Resolves with the hub's
/// `R` payload or its `E` error; abandoned (dropped) at disconnect.
pub type ReplySender = oneshot::Sender<Result<Value, FeedError>>;

/// Lifecycle of one transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// Events emitted by a connection, in socket order. `Connected` precedes
/// any `Data`; `Disconnected` is terminal.
#[derive(Debug)]
pub enum ConnectionEvent {
    Connected {
        connection_id: String,
    },
    Data(HubMessage),
    ConnectionError {
        step: HandshakeStep,
        attempts: u32,
        retry: bool,
        error: ErrorDetail,
    },
    Disconnected {
        connection_id: String,
        code: Option<u16>,
        reason: String,
    },
}

/// Why the socket went away. Decides the code/reason on the terminal
/// event; the close disposition itself depends only on lifecycle state.
#[derive(Debug)]
enum CloseCause {
    Remote(Option<CloseFrame<'static>>),
    StreamEnded,
    Transport(String),
    HeartbeatTimeout,
    Backpressure,
    ConsumerGone,
    LocalShutdown,
}

impl CloseCause {
    fn code(&self) -> Option<u16> {
        match self {
            CloseCause::Remote(Some(frame)) => Some(frame.code.into()),
            _ => None,
        }
    }

    fn reason(&self) -> String {
        match self {
            CloseCause::Remote(Some(frame)) => frame.reason.to_string(),
            CloseCause::Remote(None) => "closed by peer".to_string(),
            CloseCause::StreamEnded => "stream ended".to_string(),
            CloseCause::Transport(message) => message.clone(),
            CloseCause::HeartbeatTimeout => "missed pong".to_string(),
            CloseCause::Backpressure => "consumer too slow".to_string(),
            CloseCause::ConsumerGone => "consumer dropped".to_string(),
            CloseCause::LocalShutdown => "client disconnect".to_string(),
        }
    }
}

/// Whether a teardown from `previous` announces a `Disconnected` event.
/// Programmatic shutdown (Disconnecting) stays silent.
fn announce_close(previous: ConnectionState) -> bool {
    matches!(previous, ConnectionState::Connecting | ConnectionState::Connected)
}

struct SessionInfo {
    connection_id: String,
    connection_token: String,
    started: bool,
}

struct Shared {
    config: Arc<ClientConfig>,
    credentials: Credentials,
    http: reqwest::Client,
    events: mpsc::Sender<ConnectionEvent>,
    state: Mutex<ConnectionState>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    pending: DashMap<u32, ReplySender>,
    next_id: AtomicU32,
    session: Mutex<Option<SessionInfo>>,
    /// Flipped exactly once by finalize so the reader cannot outlive the
    /// session on a socket that never delivers its close.
    closed: watch::Sender<bool>,
}

/// Client side of one hub session.
pub struct SignalrConnection {
    shared: Arc<Shared>,
}

impl SignalrConnection {
    pub fn new(
        config: Arc<ClientConfig>,
        credentials: Credentials,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                credentials,
                http,
                events,
                state: Mutex::new(ConnectionState::New),
                sink: tokio::sync::Mutex::new(None),
                pending: DashMap::new(),
                next_id: AtomicU32::new(0),
                session: Mutex::new(None),
                closed: watch::channel(false).0,
            }),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.current_state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Drive negotiate → connect → start. Valid only on a fresh
    /// connection; returns whether CONNECTED was reached. Failure details
    /// arrive as `ConnectionError` events.
    pub async fn connect(&self) -> bool {
        if !self
            .shared
            .try_transition(&[ConnectionState::New], ConnectionState::Connecting)
        {
            warn!("connect() called on a used connection");
            return false;
        }
        self.shared.handshake().await
    }

    /// Tear the session down without emitting `Disconnected`. Pending
    /// invocations are abandoned. Safe to call from any state.
    pub async fn disconnect(&self) {
        if !self.shared.try_transition(
            &[
                ConnectionState::New,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ],
            ConnectionState::Disconnecting,
        ) {
            return;
        }
        info!("disconnecting");
        if let Some(sink) = self.shared.sink.lock().await.as_mut() {
            let _ = sink.send(Message::Close(None)).await;
        }
        self.shared.finalize(CloseCause::LocalShutdown).await;
    }

    /// Fire-and-forget hub invocation. Returns false when the session is
    /// not CONNECTED or the frame could not be sent.
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> bool {
        self.invoke_inner(method, args, None).await
    }

    /// Hub invocation with a single-shot reply continuation.
    pub async fn invoke_with_reply(&self, method: &str, args: Vec<Value>, reply: ReplySender) -> bool {
        self.invoke_inner(method, args, Some(reply)).await
    }

    async fn invoke_inner(&self, method: &str, args: Vec<Value>, reply: Option<ReplySender>) -> bool {
        let shared = &self.shared;
        if shared.current_state() != ConnectionState::Connected {
            return false;
        }
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        let invocation = HubInvocation::new(&shared.config.hub, method, args, id);
        let text = match serde_json::to_string(&invocation) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to serialize invocation {method}: {e}");
                return false;
            }
        };
        if let Some(reply) = reply {
            shared.pending.insert(id, reply);
        }
        let mut guard = shared.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            shared.pending.remove(&id);
            return false;
        };
        match sink.send(Message::Text(text)).await {
            Ok(()) => true,
            Err(e) => {
                // The imminent disconnect path propagates the failure.
                warn!("invocation send failed: {e}");
                shared.pending.remove(&id);
                false
            }
        }
    }
}

impl Shared {
    fn current_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn try_transition(&self, from: &[ConnectionState], to: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if from.contains(&*state) {
            *state = to;
            true
        } else {
            false
        }
    }

    /// Handshake phases left CONNECTING behind; resolve as the `ignore`
    /// sentinel.
    fn cancelled(&self) -> bool {
        self.current_state() != ConnectionState::Connecting
    }

    fn emit_retry_error(&self, step: HandshakeStep, attempts: u32, retry: bool, error: &FeedError) {
        let event = ConnectionEvent::ConnectionError {
            step,
            attempts,
            retry,
            error: error.detail(),
        };
        if self.events.try_send(event).is_err() {
            debug!("dropping {step} error event, channel unavailable");
        }
    }

    async fn fail_handshake(&self, step: HandshakeStep, attempts: u32, error: FeedError) -> bool {
        warn!("{step} exhausted after {attempts} attempt(s): {error}");
        let event = ConnectionEvent::ConnectionError {
            step,
            attempts,
            retry: false,
            error: error.detail(),
        };
        let _ = self.events.send(event).await;
        self.try_transition(&[ConnectionState::Connecting], ConnectionState::Disconnected);
        false
    }

    async fn handshake(self: &Arc<Self>) -> bool {
        let delay = self.config.retry_delay;

        let outcome = retry::run_with_retry(
            RetryPolicy {
                budget: self.config.retry_count.negotiate,
                delay,
            },
            |attempt| {
                debug!("negotiate attempt {attempt}");
                self.negotiate()
            },
            || self.cancelled(),
            |attempt, has_more, error| {
                warn!("negotiate failed (attempt {attempt}): {error}");
                if has_more {
                    self.emit_retry_error(HandshakeStep::Negotiate, attempt, true, error);
                }
            },
        )
        .await;
        let descriptor = match outcome {
            RetryOutcome::Done(descriptor) => descriptor,
            RetryOutcome::Cancelled => return false,
            RetryOutcome::Exhausted { attempts, error } => {
                return self.fail_handshake(HandshakeStep::Negotiate, attempts, error).await;
            }
        };

        let outcome = retry::run_with_retry(
            RetryPolicy {
                budget: self.config.retry_count.connect,
                delay,
            },
            |attempt| {
                debug!("socket connect attempt {attempt}");
                self.open_socket(&descriptor)
            },
            || self.cancelled(),
            |attempt, has_more, error| {
                warn!("socket connect failed (attempt {attempt}): {error}");
                if has_more {
                    self.emit_retry_error(HandshakeStep::Connect, attempt, true, error);
                }
            },
        )
        .await;
        let stream = match outcome {
            RetryOutcome::Done(stream) => stream,
            RetryOutcome::Cancelled => return false,
            RetryOutcome::Exhausted { attempts, error } => {
                return self.fail_handshake(HandshakeStep::Connect, attempts, error).await;
            }
        };

        if !self.config.ignore_start_step {
            let outcome = retry::run_with_retry(
                RetryPolicy {
                    budget: self.config.retry_count.start,
                    delay,
                },
                |attempt| {
                    debug!("start attempt {attempt}");
                    self.start(&descriptor.connection_token)
                },
                || self.cancelled(),
                |attempt, has_more, error| {
                    warn!("start failed (attempt {attempt}): {error}");
                    if has_more {
                        self.emit_retry_error(HandshakeStep::Start, attempt, true, error);
                    }
                },
            )
            .await;
            match outcome {
                RetryOutcome::Done(()) => {}
                RetryOutcome::Cancelled => return false,
                RetryOutcome::Exhausted { attempts, error } => {
                    return self.fail_handshake(HandshakeStep::Start, attempts, error).await;
                }
            }
        }

        *self.session.lock() = Some(SessionInfo {
            connection_id: descriptor.connection_id.clone(),
            connection_token: descriptor.connection_token.clone(),
            started: !self.config.ignore_start_step,
        });
        let (sink, source) = stream.split();
        *self.sink.lock().await = Some(sink);

        if !self.try_transition(&[ConnectionState::Connecting], ConnectionState::Connected) {
            // Torn down mid-handshake; close quietly.
            self.sink.lock().await.take();
            return false;
        }
        info!("connection {} established", descriptor.connection_id);
        let _ = self
            .events
            .send(ConnectionEvent::Connected {
                connection_id: descriptor.connection_id.clone(),
            })
            .await;

        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.run_reader(source).await });
        true
    }

    async fn negotiate(&self) -> Result<ConnectionDescriptor, FeedError> {
        let url = protocol::negotiate_url(&self.config.base_https, &self.config.hub)?;
        let response = self
            .http
            .get(url.as_str())
            .header(USER_AGENT, self.credentials.effective_user_agent(&self.config))
            .header(COOKIE, self.credentials.cookie.as_str())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::HttpStatus {
                status: status.as_u16(),
                message: "negotiate rejected".to_string(),
            });
        }
        Ok(response.json::<ConnectionDescriptor>().await?)
    }

    async fn open_socket(&self, descriptor: &ConnectionDescriptor) -> Result<WsStream, FeedError> {
        let url = protocol::connect_url(
            &self.config.base_wss,
            &self.config.hub,
            &descriptor.protocol_version,
            &descriptor.connection_token,
            protocol::current_millis(),
        )?;
        let mut request = url.as_str().into_client_request()?;
        let user_agent = HeaderValue::from_str(self.credentials.effective_user_agent(&self.config))
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;
        let cookie = HeaderValue::from_str(&self.credentials.cookie)
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;
        request.headers_mut().insert("User-Agent", user_agent);
        request.headers_mut().insert("Cookie", cookie);

        let budget = descriptor.ws_handshake_timeout();
        let (stream, response) = tokio::time::timeout(budget, connect_async(request))
            .await
            .map_err(|_| FeedError::Timeout(format!("WebSocket handshake exceeded {budget:?}")))??;
        debug!("socket open (HTTP {})", response.status());
        Ok(stream)
    }

    async fn start(&self, token: &str) -> Result<(), FeedError> {
        let url = protocol::start_url(&self.config.base_https, &self.config.hub, token)?;
        let response = self
            .http
            .get(url.as_str())
            .header(USER_AGENT, self.credentials.effective_user_agent(&self.config))
            .header(COOKIE, self.credentials.cookie.as_str())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::HttpStatus {
                status: status.as_u16(),
                message: "start rejected".to_string(),
            });
        }
        Ok(())
    }

    /// Best-effort teardown notification; failures are logged and
    /// swallowed.
    async fn abort(&self) {
        let token = self
            .session
            .lock()
            .as_ref()
            .map(|session| session.connection_token.clone());
        let Some(token) = token else { return };
        let url = match protocol::abort_url(&self.config.base_https, &self.config.hub, &token) {
            Ok(url) => url,
            Err(e) => {
                warn!("abort url invalid: {e}");
                return;
            }
        };
        match self
            .http
            .get(url.as_str())
            .header(USER_AGENT, self.credentials.effective_user_agent(&self.config))
            .header(COOKIE, self.credentials.cookie.as_str())
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => debug!("abort acknowledged"),
            Ok(response) => warn!("abort rejected with HTTP {}", response.status()),
            Err(e) => warn!("abort request failed: {e}"),
        }
    }

    async fn run_reader(self: Arc<Self>, mut source: WsSource) {
        let ping_enabled = self.config.ping_enabled();
        let ping_interval = if ping_enabled {
            self.config.ping_timeout
        } else {
            Duration::from_secs(3600)
        };
        if ping_enabled {
            if let Err(e) = self.send_ping().await {
                warn!("initial ping failed: {e}");
            }
        }
        let mut is_alive = false;
        let mut timer = interval_at(Instant::now() + ping_interval, ping_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut closed = self.closed.subscribe();

        let cause = loop {
            tokio::select! {
                _ = closed.changed() => break CloseCause::LocalShutdown,
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(cause) = self.ingest_text(&text) {
                            break cause;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = self.send_message(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        is_alive = true;
                    }
                    Some(Ok(Message::Close(frame))) => break CloseCause::Remote(frame),
                    // Binary and raw frames are not part of this hub's protocol.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break CloseCause::Transport(e.to_string()),
                    None => break CloseCause::StreamEnded,
                },
                _ = timer.tick(), if ping_enabled => {
                    if !is_alive {
                        warn!("no pong within {ping_interval:?}, terminating socket");
                        break CloseCause::HeartbeatTimeout;
                    }
                    is_alive = false;
                    if let Err(e) = self.send_ping().await {
                        break CloseCause::Transport(e.to_string());
                    }
                }
            }
        };
        self.finalize(cause).await;
    }

    async fn send_ping(&self) -> Result<(), FeedError> {
        self.send_message(Message::Ping(Vec::new())).await
    }

    async fn send_message(&self, message: Message) -> Result<(), FeedError> {
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(sink) => Ok(sink.send(message).await?),
            None => Err(FeedError::Disconnected("socket already closed".to_string())),
        }
    }

    /// Apply one inbound text frame. Returns a close cause when the
    /// session has to come down (consumer overflow or loss).
    fn ingest_text(&self, text: &str) -> Option<CloseCause> {
        if self.current_state() != ConnectionState::Connected {
            // Frames outside CONNECTED are dropped.
            return None;
        }
        match classify_frame(text) {
            FrameKind::KeepAlive | FrameKind::Empty => None,
            FrameKind::Invalid => {
                debug!("discarding unparseable frame");
                None
            }
            FrameKind::Reply {
                id,
                result,
                error,
                progress,
            } => {
                if progress {
                    return None;
                }
                if let Some((_, reply)) = self.pending.remove(&id) {
                    let outcome = match result {
                        Some(value) => Ok(value),
                        None => Err(FeedError::Hub(
                            error.unwrap_or_else(|| "invocation failed".to_string()),
                        )),
                    };
                    let _ = reply.send(outcome);
                } else {
                    debug!("reply for unknown invocation {id}");
                }
                None
            }
            FrameKind::Push(messages) => {
                for message in messages {
                    match self.events.try_send(ConnectionEvent::Data(message)) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            // Dropping messages would break delta-based
                            // book sync; force a reconnect to resync.
                            warn!("event channel full, forcing reconnect");
                            return Some(CloseCause::Backpressure);
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            return Some(CloseCause::ConsumerGone);
                        }
                    }
                }
                None
            }
        }
    }

    /// Runs at most once per connection: cancels the session, abandons
    /// pending replies, fires abort when start had completed, and emits
    /// `Disconnected` unless the teardown was programmatic.
    async fn finalize(&self, cause: CloseCause) {
        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            if previous == ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Disconnected;
            previous
        };
        debug!("finalizing from {previous:?}: {cause:?}");
        let _ = self.closed.send(true);
        self.sink.lock().await.take();
        // Outstanding invocations are indeterminate after teardown; their
        // senders drop and receivers observe cancellation.
        self.pending.clear();
        let started = self
            .session
            .lock()
            .as_ref()
            .map(|session| session.started)
            .unwrap_or(false);
        if started {
            self.abort().await;
        }
        if announce_close(previous) {
            let connection_id = self
                .session
                .lock()
                .as_ref()
                .map(|session| session.connection_id.clone())
                .unwrap_or_default();
            let event = ConnectionEvent::Disconnected {
                connection_id,
                code: cause.code(),
                reason: cause.reason(),
            };
            let _ = self.events.send(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn connection(capacity: usize) -> (SignalrConnection, mpsc::Receiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let connection = SignalrConnection::new(
            Arc::new(ClientConfig::default()),
            Credentials::new("cf=test", "test-agent"),
            tx,
        )
        .unwrap();
        (connection, rx)
    }

    fn force_state(connection: &SignalrConnection, state: ConnectionState) {
        *connection.shared.state.lock() = state;
    }

    #[test]
    fn test_new_connection_state() {
        let (connection, _rx) = connection(8);
        assert_eq!(connection.state(), ConnectionState::New);
        assert!(!connection.is_connected());
    }

    #[test]
    fn test_frames_dropped_while_not_connected() {
        let (connection, mut rx) = connection(8);
        let result = connection
            .shared
            .ingest_text(r#"{"M":[{"H":"corehub","M":"updateExchangeState","A":[]}]}"#);
        assert!(result.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_push_frames_emit_data_in_order() {
        let (connection, mut rx) = connection(8);
        force_state(&connection, ConnectionState::Connected);

        let result = connection.shared.ingest_text(
            r#"{"C":"cur","M":[
                {"H":"corehub","M":"first","A":[]},
                {"H":"corehub","M":"second","A":[]}
            ]}"#,
        );
        assert!(result.is_none());

        match rx.try_recv().unwrap() {
            ConnectionEvent::Data(message) => assert_eq!(message.method, "first"),
            other => panic!("expected data, got {other:?}"),
        }
        match rx.try_recv().unwrap() {
            ConnectionEvent::Data(message) => assert_eq!(message.method, "second"),
            other => panic!("expected data, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_garbage_frame_keeps_session_alive() {
        let (connection, mut rx) = connection(8);
        force_state(&connection, ConnectionState::Connected);

        assert!(connection.shared.ingest_text("not-json").is_none());
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_keep_alive_is_silent() {
        let (connection, mut rx) = connection(8);
        force_state(&connection, ConnectionState::Connected);

        assert!(connection.shared.ingest_text("{}").is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reply_resolves_pending_callback_once() {
        let (connection, _rx) = connection(8);
        force_state(&connection, ConnectionState::Connected);

        let (tx, rx) = oneshot::channel();
        connection.shared.pending.insert(0, tx);

        connection
            .shared
            .ingest_text(r#"{"I":"0","R":{"ok":true}}"#);
        assert_eq!(rx.await.unwrap().unwrap(), json!({"ok": true}));
        assert!(connection.shared.pending.is_empty());

        // The same reply again hits an unknown id and is discarded.
        assert!(connection
            .shared
            .ingest_text(r#"{"I":"0","R":{"ok":true}}"#)
            .is_none());
    }

    #[tokio::test]
    async fn test_error_reply_resolves_with_hub_error() {
        let (connection, _rx) = connection(8);
        force_state(&connection, ConnectionState::Connected);

        let (tx, rx) = oneshot::channel();
        connection.shared.pending.insert(3, tx);

        connection
            .shared
            .ingest_text(r#"{"I":3,"E":"no such method"}"#);
        match rx.await.unwrap() {
            Err(FeedError::Hub(message)) => assert_eq!(message, "no such method"),
            other => panic!("expected hub error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_progress_reply_keeps_callback_pending() {
        let (connection, _rx) = connection(8);
        force_state(&connection, ConnectionState::Connected);

        let (tx, mut rx) = oneshot::channel();
        connection.shared.pending.insert(1, tx);

        connection.shared.ingest_text(r#"{"I":"1","D":{"pct":50}}"#);
        assert_eq!(connection.shared.pending.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_backpressure_forces_teardown() {
        let (connection, _rx) = connection(1);
        force_state(&connection, ConnectionState::Connected);

        let text = r#"{"M":[
            {"H":"corehub","M":"first","A":[]},
            {"H":"corehub","M":"second","A":[]}
        ]}"#;
        let cause = connection.shared.ingest_text(text);
        assert!(matches!(cause, Some(CloseCause::Backpressure)));
    }

    #[tokio::test]
    async fn test_connect_rejected_outside_new() {
        let (connection, _rx) = connection(8);
        force_state(&connection, ConnectionState::Connected);
        assert!(!connection.connect().await);

        force_state(&connection, ConnectionState::Disconnected);
        assert!(!connection.connect().await);
    }

    #[tokio::test]
    async fn test_invoke_rejected_outside_connected() {
        let (connection, _rx) = connection(8);
        assert!(!connection.invoke("SubscribeToExchangeDeltas", vec![json!("USDT-BTC")]).await);
    }

    #[tokio::test]
    async fn test_invoke_without_socket_rejects_and_abandons_reply() {
        let (connection, _rx) = connection(8);
        force_state(&connection, ConnectionState::Connected);

        let (tx, mut rx) = oneshot::channel();
        assert!(!connection.invoke_with_reply("QueryExchangeState", vec![json!("USDT-BTC")], tx).await);
        assert!(connection.shared.pending.is_empty());
        // Sender dropped without resolution.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_is_silent_and_terminal() {
        let (connection, mut rx) = connection(8);
        connection.disconnect().await;
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(rx.try_recv().is_err());

        // Terminal: a second disconnect and a connect are both no-ops.
        connection.disconnect().await;
        assert!(!connection.connect().await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_finalize_announces_unexpected_close() {
        let (connection, mut rx) = connection(8);
        force_state(&connection, ConnectionState::Connected);
        *connection.shared.session.lock() = Some(SessionInfo {
            connection_id: "abc".to_string(),
            connection_token: "t".to_string(),
            started: false,
        });

        connection.shared.finalize(CloseCause::StreamEnded).await;
        match rx.try_recv().unwrap() {
            ConnectionEvent::Disconnected {
                connection_id,
                code,
                reason,
            } => {
                assert_eq!(connection_id, "abc");
                assert_eq!(code, None);
                assert_eq!(reason, "stream ended");
            }
            other => panic!("expected disconnected, got {other:?}"),
        }

        // Finalize runs at most once.
        connection.shared.finalize(CloseCause::StreamEnded).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_finalize_abandons_pending_callbacks() {
        let (connection, _rx) = connection(8);
        force_state(&connection, ConnectionState::Connected);

        let (tx, mut rx) = oneshot::channel();
        connection.shared.pending.insert(7, tx);
        connection.shared.finalize(CloseCause::StreamEnded).await;

        assert!(connection.shared.pending.is_empty());
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn test_close_disposition_is_pure_in_state() {
        assert!(announce_close(ConnectionState::Connected));
        assert!(announce_close(ConnectionState::Connecting));
        assert!(!announce_close(ConnectionState::Disconnecting));
        assert!(!announce_close(ConnectionState::New));
    }

    #[test]
    fn test_close_cause_codes() {
        let frame = CloseFrame {
            code: tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::Away,
            reason: "going away".into(),
        };
        let cause = CloseCause::Remote(Some(frame));
        assert_eq!(cause.code(), Some(1001));
        assert_eq!(cause.reason(), "going away");

        assert_eq!(CloseCause::HeartbeatTimeout.code(), None);
    }
}
