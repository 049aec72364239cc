//! Credentials obtained from the anti-bot interstitial.

use crate::{ClientConfig, FeedError};
use async_trait::async_trait;

/// Cookie and user-agent pair that satisfies the exchange's front door.
/// Immutable once handed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub cookie: String,
    pub user_agent: String,
}

impl Credentials {
    pub fn new(cookie: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            cookie: cookie.into(),
            user_agent: user_agent.into(),
        }
    }

    /// User agent actually sent on the wire: the configured override wins
    /// when non-empty.
    pub fn effective_user_agent<'a>(&'a self, config: &'a ClientConfig) -> &'a str {
        if config.user_agent.is_empty() {
            &self.user_agent
        } else {
            &config.user_agent
        }
    }
}

/// One-shot solver for the interstitial challenge.
///
/// Implementations typically drive a headless JS evaluator against the
/// front door; that machinery lives outside this crate.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    async fn solve(&self) -> Result<Credentials, FeedError>;
}

/// Solver backed by credentials obtained out of band.
#[derive(Debug, Clone)]
pub struct StaticChallengeSolver {
    credentials: Credentials,
}

impl StaticChallengeSolver {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl ChallengeSolver for StaticChallengeSolver {
    async fn solve(&self) -> Result<Credentials, FeedError> {
        Ok(self.credentials.clone())
    }
}
