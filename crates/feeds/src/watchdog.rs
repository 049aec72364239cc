//! Per-feed staleness detection.

use crate::config::WatchdogPolicy;
use crate::registry::FeedKind;
use tokio::time::Instant;
use tracing::warn;

/// Monitors the time since the last message of one feed category.
///
/// Armed at the first successful subscription of its category, touched on
/// every matching message, disarmed on disconnect. Firing rearms the
/// timer, so one staleness episode fires exactly once.
#[derive(Debug)]
pub struct Watchdog {
    kind: FeedKind,
    policy: WatchdogPolicy,
    last_message: Instant,
    armed: bool,
}

impl Watchdog {
    pub fn new(kind: FeedKind, policy: WatchdogPolicy) -> Self {
        Self {
            kind,
            policy,
            last_message: Instant::now(),
            armed: false,
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Whether a fire should tear the connection down.
    pub fn reconnects(&self) -> bool {
        self.policy.reconnect
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Arm at subscription time. Re-arming an armed watchdog is a no-op so
    /// repeated subscribes do not mask staleness.
    pub fn arm(&mut self, now: Instant) {
        if !self.armed {
            self.armed = true;
            self.last_message = now;
        }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Record a message of this category.
    pub fn touch(&mut self, now: Instant) {
        self.last_message = now;
    }

    /// Returns true when the feed has gone stale. Rearms for the next
    /// episode.
    pub fn check(&mut self, now: Instant) -> bool {
        if !self.armed {
            return false;
        }
        let elapsed = now.duration_since(self.last_message);
        if elapsed >= self.policy.timeout {
            warn!(
                "{} feed stale for {:?} (limit {:?})",
                self.kind.as_str(),
                elapsed,
                self.policy.timeout
            );
            self.last_message = now;
            true
        } else {
            false
        }
    }
}
