//! Error types for feed operations.

use thiserror::Error;

/// Where a failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// Local failure: connection refused, DNS, timeout, parse.
    Client,
    /// The server answered with a non-2xx status or an error frame.
    Remote,
}

/// Handshake phase a connection error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    Negotiate,
    Connect,
    Start,
}

impl HandshakeStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakeStep::Negotiate => "negotiate",
            HandshakeStep::Connect => "connect",
            HandshakeStep::Start => "start",
        }
    }
}

impl std::fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flattened error payload carried on observable events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub origin: ErrorOrigin,
    pub code: Option<u16>,
    pub message: String,
}

/// Errors that can occur during feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    #[error("WebSocket upgrade rejected with HTTP {status}")]
    UpgradeRejected { status: u16 },

    #[error("WebSocket disconnected: {0}")]
    Disconnected(String),

    #[error("failed to parse message: {0}")]
    Parse(String),

    #[error("hub rejected invocation: {0}")]
    Hub(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("challenge solver failed: {0}")]
    Challenge(String),

    #[error("invalid endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("channel closed")]
    ChannelClosed,
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Http(response) => FeedError::UpgradeRejected {
                status: response.status().as_u16(),
            },
            other => FeedError::ConnectionFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Parse(err.to_string())
    }
}

impl FeedError {
    /// Which side of the wire produced this error.
    pub fn origin(&self) -> ErrorOrigin {
        match self {
            FeedError::HttpStatus { .. } | FeedError::UpgradeRejected { .. } | FeedError::Hub(_) => {
                ErrorOrigin::Remote
            }
            _ => ErrorOrigin::Client,
        }
    }

    /// HTTP status attached to this error, when the server sent one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FeedError::HttpStatus { status, .. } | FeedError::UpgradeRejected { status } => {
                Some(*status)
            }
            FeedError::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true if this error is transient and worth retrying.
    ///
    /// Auth rejections on the upgrade are permanent: retrying through the
    /// same challenge credentials cannot succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::Http(_)
            | FeedError::HttpStatus { .. }
            | FeedError::ConnectionFailed(_)
            | FeedError::Disconnected(_)
            | FeedError::Timeout(_) => true,
            FeedError::UpgradeRejected { status } => !matches!(status, 401 | 403),
            FeedError::Parse(_)
            | FeedError::Hub(_)
            | FeedError::Challenge(_)
            | FeedError::InvalidUrl(_)
            | FeedError::ChannelClosed => false,
        }
    }

    /// Flatten into the payload shape carried on events.
    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            origin: self.origin(),
            code: self.status_code(),
            message: self.to_string(),
        }
    }
}
