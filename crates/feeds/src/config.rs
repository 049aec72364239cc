//! Client configuration.

use crate::registry::FeedKind;
use crate::retry::RetryBudget;
use std::time::Duration;

/// Default SignalR endpoint over HTTPS.
pub const DEFAULT_BASE_HTTPS: &str = "https://socket.bittrex.com/signalr";
/// Default SignalR endpoint over WSS.
pub const DEFAULT_BASE_WSS: &str = "wss://socket.bittrex.com/signalr";
/// Hub every market-data method lives on.
pub const DEFAULT_HUB: &str = "corehub";

/// Hub method names used for subscriptions. Overridable because the hub
/// has renamed methods across deployments.
#[derive(Debug, Clone)]
pub struct HubMethods {
    /// Per-pair order book delta subscription.
    pub subscribe_markets: String,
    /// Per-pair full book snapshot query.
    pub query_market_state: String,
    /// Global summary delta subscription.
    pub subscribe_summary: String,
    /// Global lite summary subscription backing the ticker feed.
    pub subscribe_lite_summary: String,
}

impl Default for HubMethods {
    fn default() -> Self {
        Self {
            subscribe_markets: "SubscribeToExchangeDeltas".to_string(),
            query_market_state: "QueryExchangeState".to_string(),
            subscribe_summary: "SubscribeToSummaryDeltas".to_string(),
            subscribe_lite_summary: "SubscribeToSummaryLiteDeltas".to_string(),
        }
    }
}

/// Per-phase retry budgets for the connection handshake.
#[derive(Debug, Clone, Copy)]
pub struct RetryCounts {
    pub negotiate: RetryBudget,
    pub connect: RetryBudget,
    pub start: RetryBudget,
}

impl Default for RetryCounts {
    fn default() -> Self {
        Self {
            negotiate: RetryBudget::Limited(11),
            connect: RetryBudget::Limited(1),
            start: RetryBudget::Limited(1),
        }
    }
}

/// Staleness policy for one feed category.
#[derive(Debug, Clone, Copy)]
pub struct WatchdogPolicy {
    /// How long the feed may stay silent before the watchdog fires.
    pub timeout: Duration,
    /// Fire action: tear the connection down and reconnect, or log only.
    pub reconnect: bool,
}

/// Watchdog policies per feed category, all off by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchdogSettings {
    pub markets: Option<WatchdogPolicy>,
    pub tickers: Option<WatchdogPolicy>,
    pub summary: Option<WatchdogPolicy>,
}

impl WatchdogSettings {
    pub fn get(&self, kind: FeedKind) -> Option<WatchdogPolicy> {
        match kind {
            FeedKind::Markets => self.markets,
            FeedKind::Tickers => self.tickers,
            FeedKind::Summary => self.summary,
        }
    }
}

/// Configuration for the feed client and its connections.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base HTTPS endpoint for negotiate/start/abort.
    pub base_https: String,
    /// Base WSS endpoint for the transport socket.
    pub base_wss: String,
    /// Hub name carried in connection data and invocations.
    pub hub: String,
    /// Heartbeat interval; zero disables the supervisor.
    pub ping_timeout: Duration,
    /// Overrides the challenge-solver user agent when non-empty.
    pub user_agent: String,
    /// Per-phase handshake retry budgets.
    pub retry_count: RetryCounts,
    /// Fixed delay between handshake retries.
    pub retry_delay: Duration,
    /// Skip the start phase entirely.
    pub ignore_start_step: bool,
    /// Delay before rebuilding a connection; defaults to `retry_delay`.
    pub reconnect_delay: Option<Duration>,
    /// Outer reconnect budget for the client facade.
    pub reconnect_retry: RetryBudget,
    /// Staleness watchdogs per feed category.
    pub watchdog: WatchdogSettings,
    /// Hub method names.
    pub methods: HubMethods,
    /// Capacity of the event channels handed to consumers.
    pub channel_capacity: usize,
    /// Socket timeout for the control HTTP requests.
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_https: DEFAULT_BASE_HTTPS.to_string(),
            base_wss: DEFAULT_BASE_WSS.to_string(),
            hub: DEFAULT_HUB.to_string(),
            ping_timeout: Duration::from_secs(30),
            user_agent: "MPE".to_string(),
            retry_count: RetryCounts::default(),
            retry_delay: Duration::from_secs(10),
            ignore_start_step: false,
            reconnect_delay: None,
            reconnect_retry: RetryBudget::Infinite,
            watchdog: WatchdogSettings::default(),
            methods: HubMethods::default(),
            channel_capacity: 1000,
            http_timeout: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set both control and transport endpoints from one host base.
    pub fn with_endpoints(mut self, base_https: impl Into<String>, base_wss: impl Into<String>) -> Self {
        self.base_https = base_https.into();
        self.base_wss = base_wss.into();
        self
    }

    /// Set the heartbeat interval. Zero disables the supervisor.
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Skip the start phase; the connection counts as live right after
    /// the socket opens.
    pub fn without_start_step(mut self) -> Self {
        self.ignore_start_step = true;
        self
    }

    pub fn with_watchdog(mut self, kind: FeedKind, policy: WatchdogPolicy) -> Self {
        match kind {
            FeedKind::Markets => self.watchdog.markets = Some(policy),
            FeedKind::Tickers => self.watchdog.tickers = Some(policy),
            FeedKind::Summary => self.watchdog.summary = Some(policy),
        }
        self
    }

    /// Delay applied between a teardown and the next connection attempt.
    pub fn effective_reconnect_delay(&self) -> Duration {
        self.reconnect_delay.unwrap_or(self.retry_delay)
    }

    /// Whether the heartbeat supervisor runs at all.
    pub fn ping_enabled(&self) -> bool {
        !self.ping_timeout.is_zero()
    }
}
