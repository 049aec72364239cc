//! SignalR wire layer: control URLs, frame shapes, hub invocations.
//!
//! Only the subset of the protocol the exchange hub actually speaks is
//! modeled here: the four control endpoints, the `{H,M,A,I}` invocation
//! envelope, reply frames keyed by `I`, push frames carrying an `M` array,
//! and the literal `{}` keep-alive.

use crate::FeedError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

/// Protocol version spoken against the control endpoints.
pub const CLIENT_PROTOCOL: &str = "1.5";

/// Keep-alive placeholder pushed by the hub. Never acknowledged.
pub const KEEP_ALIVE_FRAME: &str = "{}";

#[derive(Debug, Serialize)]
struct HubRef<'a> {
    name: &'a str,
}

/// Connection data query parameter: a one-element hub list.
pub fn connection_data(hub: &str) -> String {
    serde_json::to_string(&[HubRef { name: hub }]).unwrap_or_else(|_| "[]".to_string())
}

/// Milliseconds since the epoch, used for the `tid` cache-buster.
pub fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Handshake result from the negotiate endpoint.
///
/// Timeout fields are advertised in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectionDescriptor {
    pub connection_id: String,
    pub connection_token: String,
    pub protocol_version: String,
    pub transport_connect_timeout: f64,
    pub disconnect_timeout: f64,
    #[serde(default)]
    pub keep_alive_timeout: Option<f64>,
}

impl ConnectionDescriptor {
    /// Budget for the WebSocket upgrade: twice the advertised transport
    /// connect timeout. The doubling matches observed server tolerance.
    pub fn ws_handshake_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.transport_connect_timeout.max(0.0) * 2.0)
    }
}

pub fn negotiate_url(base_https: &str, hub: &str) -> Result<Url, FeedError> {
    let url = Url::parse_with_params(
        &format!("{base_https}/negotiate"),
        &[
            ("clientProtocol", CLIENT_PROTOCOL),
            ("transport", "serverSentEvents"),
            ("connectionData", &connection_data(hub)),
        ],
    )?;
    Ok(url)
}

pub fn start_url(base_https: &str, hub: &str, token: &str) -> Result<Url, FeedError> {
    control_url(base_https, "start", hub, token)
}

pub fn abort_url(base_https: &str, hub: &str, token: &str) -> Result<Url, FeedError> {
    control_url(base_https, "abort", hub, token)
}

fn control_url(base_https: &str, endpoint: &str, hub: &str, token: &str) -> Result<Url, FeedError> {
    let url = Url::parse_with_params(
        &format!("{base_https}/{endpoint}"),
        &[
            ("clientProtocol", CLIENT_PROTOCOL),
            ("transport", "webSockets"),
            ("connectionToken", token),
            ("connectionData", &connection_data(hub)),
        ],
    )?;
    Ok(url)
}

pub fn connect_url(
    base_wss: &str,
    hub: &str,
    protocol_version: &str,
    token: &str,
    tid: u64,
) -> Result<Url, FeedError> {
    let url = Url::parse_with_params(
        &format!("{base_wss}/connect"),
        &[
            ("clientProtocol", protocol_version),
            ("transport", "webSockets"),
            ("connectionToken", token),
            ("connectionData", &connection_data(hub)),
            ("tid", &tid.to_string()),
        ],
    )?;
    Ok(url)
}

/// Outbound hub invocation envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubInvocation {
    #[serde(rename = "H")]
    pub hub: String,
    #[serde(rename = "M")]
    pub method: String,
    #[serde(rename = "A")]
    pub args: Vec<Value>,
    #[serde(rename = "I")]
    pub id: u32,
}

impl HubInvocation {
    /// The hub expects lowercase method names on the wire.
    pub fn new(hub: &str, method: &str, args: Vec<Value>, id: u32) -> Self {
        Self {
            hub: hub.to_string(),
            method: method.to_lowercase(),
            args,
            id,
        }
    }
}

/// One hub message from an inbound push frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubMessage {
    #[serde(rename = "H", default)]
    pub hub: String,
    #[serde(rename = "M")]
    pub method: String,
    #[serde(rename = "A", default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "I")]
    invocation_id: Option<Value>,
    #[serde(rename = "R")]
    result: Option<Value>,
    #[serde(rename = "E")]
    error: Option<String>,
    #[serde(rename = "D")]
    progress: Option<Value>,
    #[serde(rename = "M")]
    messages: Option<Vec<HubMessage>>,
}

/// Classification of one inbound text frame.
#[derive(Debug, PartialEq)]
pub enum FrameKind {
    /// `{}` placeholder.
    KeepAlive,
    /// Not JSON, or not a shape we recognize. Dropped without teardown.
    Invalid,
    /// Reply to an invocation. `progress` replies are discarded upstream.
    Reply {
        id: u32,
        result: Option<Value>,
        error: Option<String>,
        progress: bool,
    },
    /// Hub push carrying zero or more messages, in socket order.
    Push(Vec<HubMessage>),
    /// Parsed fine but carries nothing we act on (e.g. a bare cursor).
    Empty,
}

/// Classify an inbound text frame. Pure; ingestion applies the side
/// effects.
pub fn classify_frame(text: &str) -> FrameKind {
    if text.trim() == KEEP_ALIVE_FRAME {
        return FrameKind::KeepAlive;
    }
    let frame: RawFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => return FrameKind::Invalid,
    };
    if let Some(raw_id) = frame.invocation_id {
        let Some(id) = parse_invocation_id(&raw_id) else {
            return FrameKind::Invalid;
        };
        return FrameKind::Reply {
            id,
            result: frame.result,
            error: frame.error,
            progress: frame.progress.is_some(),
        };
    }
    match frame.messages {
        Some(messages) => FrameKind::Push(messages),
        None => FrameKind::Empty,
    }
}

/// The hub echoes invocation ids back as strings.
fn parse_invocation_id(raw: &Value) -> Option<u32> {
    match raw {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.parse::<u32>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_connection_data_encodes_hub_list() {
        assert_eq!(connection_data("corehub"), r#"[{"name":"corehub"}]"#);
    }

    #[test]
    fn test_negotiate_url_shape() {
        let url = negotiate_url("https://host/signalr", "corehub").unwrap();
        assert_eq!(url.path(), "/signalr/negotiate");
        let query = url.query().unwrap();
        assert!(query.contains("clientProtocol=1.5"));
        assert!(query.contains("transport=serverSentEvents"));
        // connectionData is percent-encoded
        assert!(query.contains("connectionData=%5B%7B%22name%22%3A%22corehub%22%7D%5D"));
    }

    #[test]
    fn test_connect_url_carries_token_and_tid() {
        let url = connect_url("wss://host/signalr", "corehub", "1.5", "tok en", 1234).unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/signalr/connect");
        let query = url.query().unwrap();
        assert!(query.contains("transport=webSockets"));
        assert!(query.contains("connectionToken=tok+en") || query.contains("connectionToken=tok%20en"));
        assert!(query.contains("tid=1234"));
    }

    #[test]
    fn test_abort_and_start_urls_differ_only_in_path() {
        let start = start_url("https://host/signalr", "corehub", "t").unwrap();
        let abort = abort_url("https://host/signalr", "corehub", "t").unwrap();
        assert_eq!(start.path(), "/signalr/start");
        assert_eq!(abort.path(), "/signalr/abort");
        assert_eq!(start.query(), abort.query());
    }

    #[test]
    fn test_negotiate_body_parses() {
        let body = r#"{
            "ConnectionId": "abc",
            "ConnectionToken": "t",
            "ProtocolVersion": "1.5",
            "TransportConnectTimeout": 5,
            "DisconnectTimeout": 30,
            "KeepAliveTimeout": 20
        }"#;
        let descriptor: ConnectionDescriptor = serde_json::from_str(body).unwrap();
        assert_eq!(descriptor.connection_id, "abc");
        assert_eq!(descriptor.keep_alive_timeout, Some(20.0));
        assert_eq!(descriptor.ws_handshake_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_negotiate_body_without_keepalive() {
        let body = r#"{
            "ConnectionId": "abc",
            "ConnectionToken": "t",
            "ProtocolVersion": "1.5",
            "TransportConnectTimeout": 5,
            "DisconnectTimeout": 30
        }"#;
        let descriptor: ConnectionDescriptor = serde_json::from_str(body).unwrap();
        assert_eq!(descriptor.keep_alive_timeout, None);
    }

    #[test]
    fn test_invocation_serializes_lowercased() {
        let invocation = HubInvocation::new(
            "corehub",
            "SubscribeToExchangeDeltas",
            vec![json!("USDT-BTC")],
            0,
        );
        let text = serde_json::to_string(&invocation).unwrap();
        assert_eq!(
            text,
            r#"{"H":"corehub","M":"subscribetoexchangedeltas","A":["USDT-BTC"],"I":0}"#
        );
    }

    #[test]
    fn test_invocation_round_trip() {
        let invocation = HubInvocation::new("corehub", "QueryExchangeState", vec![json!("BTC-ETH")], 7);
        let text = serde_json::to_string(&invocation).unwrap();
        let back: HubInvocation = serde_json::from_str(&text).unwrap();
        assert_eq!(back, invocation);
    }

    #[test]
    fn test_classify_keep_alive() {
        assert_eq!(classify_frame("{}"), FrameKind::KeepAlive);
        assert_eq!(classify_frame(" {} "), FrameKind::KeepAlive);
    }

    #[test]
    fn test_classify_garbage() {
        assert_eq!(classify_frame("not-json"), FrameKind::Invalid);
        assert_eq!(classify_frame(""), FrameKind::Invalid);
    }

    #[test]
    fn test_classify_success_reply() {
        let kind = classify_frame(r#"{"I":"0","R":{"ok":true}}"#);
        match kind {
            FrameKind::Reply {
                id,
                result,
                error,
                progress,
            } => {
                assert_eq!(id, 0);
                assert_eq!(result, Some(json!({"ok": true})));
                assert_eq!(error, None);
                assert!(!progress);
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_error_reply() {
        let kind = classify_frame(r#"{"I":3,"E":"no such method"}"#);
        match kind {
            FrameKind::Reply { id, error, .. } => {
                assert_eq!(id, 3);
                assert_eq!(error.as_deref(), Some("no such method"));
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_progress_reply() {
        let kind = classify_frame(r#"{"I":"1","D":{"pct":50}}"#);
        assert!(matches!(kind, FrameKind::Reply { progress: true, .. }));
    }

    #[test]
    fn test_classify_push_preserves_order() {
        let text = r#"{
            "C": "cursor-ignored",
            "M": [
                {"H":"corehub","M":"updateExchangeState","A":[1]},
                {"H":"corehub","M":"updateSummaryState","A":[2]}
            ]
        }"#;
        match classify_frame(text) {
            FrameKind::Push(messages) => {
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[0].method, "updateExchangeState");
                assert_eq!(messages[1].method, "updateSummaryState");
            }
            other => panic!("expected push, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_bare_cursor_is_empty() {
        assert_eq!(classify_frame(r#"{"C":"d-ABC"}"#), FrameKind::Empty);
    }

    #[test]
    fn test_unparsable_invocation_id_is_invalid() {
        assert_eq!(classify_frame(r#"{"I":"abc","R":1}"#), FrameKind::Invalid);
        assert_eq!(classify_frame(r#"{"I":[1],"R":1}"#), FrameKind::Invalid);
    }
}
