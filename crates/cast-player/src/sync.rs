//! Bounded waits on state owned by someone else: polling a condition with an
//! interval until a deadline, instead of blocking indefinitely on an external
//! process that may never answer.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::PlayerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl SyncPolicy {
    pub fn from_millis(timeout_ms: u64, interval_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(interval_ms.max(1)),
        }
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self::from_millis(5000, 500)
    }
}

/// Check `condition` every `policy.interval` until it holds or
/// `policy.timeout` has elapsed.  The condition is always checked at least
/// once, and once more at the deadline.
pub async fn poll_until<F, Fut>(policy: SyncPolicy, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + policy.timeout;
    loop {
        if condition().await {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(policy.interval.min(deadline - now)).await;
    }
}

#[derive(Debug)]
pub enum ProbeOutcome {
    Ready,
    TimedOut,
    /// The probe reported a fault that retrying cannot fix.
    Abandoned(PlayerError),
}

/// Like [`poll_until`] for a fallible probe: non-fatal errors are retried,
/// a fatal one ends the wait early.
pub async fn probe_until<F, Fut>(policy: SyncPolicy, mut probe: F) -> ProbeOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), PlayerError>>,
{
    let deadline = Instant::now() + policy.timeout;
    loop {
        match probe().await {
            Ok(()) => return ProbeOutcome::Ready,
            Err(e) if e.is_fatal() => return ProbeOutcome::Abandoned(e),
            Err(_) => {}
        }
        let now = Instant::now();
        if now >= deadline {
            return ProbeOutcome::TimedOut;
        }
        tokio::time::sleep(policy.interval.min(deadline - now)).await;
    }
}
