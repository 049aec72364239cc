//! Fixed-delay retry harness for handshake phases.

use crate::FeedError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// How many retries a unit of work is granted after its first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    Limited(u32),
    Infinite,
}

impl RetryBudget {
    /// Build from the signed configuration form, where -1 means infinite.
    pub fn from_count(count: i32) -> Self {
        if count < 0 {
            RetryBudget::Infinite
        } else {
            RetryBudget::Limited(count as u32)
        }
    }

    /// Whether another attempt is allowed after `attempts` completed tries.
    pub fn allows_retry_after(&self, attempts: u32) -> bool {
        match self {
            RetryBudget::Infinite => true,
            RetryBudget::Limited(retries) => attempts <= *retries,
        }
    }
}

/// Retry settings for one unit of work: budget plus a fixed delay between
/// attempts. No jitter, no exponential growth.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub budget: RetryBudget,
    pub delay: Duration,
}

/// Result of running a unit of work under a [`RetryPolicy`].
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// The work succeeded.
    Done(T),
    /// The surrounding state was torn down; nothing was emitted for the
    /// abandoned attempt and nothing more will be.
    Cancelled,
    /// The budget ran out, or the work failed fatally.
    Exhausted { attempts: u32, error: FeedError },
}

impl<T> RetryOutcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, RetryOutcome::Done(_))
    }
}

/// Run `work` up to budget+1 times with a fixed delay between attempts.
///
/// `cancelled` is probed before every attempt and again after every delay;
/// once it reports true the harness resolves [`RetryOutcome::Cancelled`]
/// without calling `on_failure` again. `on_failure` observes
/// `(attempt, has_more_retries, error)` after each failed attempt. Fatal
/// errors (`!is_transient`) end the run immediately.
pub async fn run_with_retry<T, W, Fut, C, O>(
    policy: RetryPolicy,
    mut work: W,
    cancelled: C,
    mut on_failure: O,
) -> RetryOutcome<T>
where
    W: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FeedError>>,
    C: Fn() -> bool,
    O: FnMut(u32, bool, &FeedError),
{
    let mut attempts: u32 = 0;
    loop {
        if cancelled() {
            return RetryOutcome::Cancelled;
        }
        attempts += 1;
        match work(attempts).await {
            Ok(value) => return RetryOutcome::Done(value),
            Err(error) => {
                let has_more = error.is_transient() && policy.budget.allows_retry_after(attempts);
                on_failure(attempts, has_more, &error);
                if !has_more {
                    return RetryOutcome::Exhausted { attempts, error };
                }
                sleep(policy.delay).await;
            }
        }
    }
}
