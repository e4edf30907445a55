use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a permit was not granted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GovernorError {
    #[error("rate permit not available before deadline")]
    Timeout,
    #[error("rate governor is shut down")]
    Closed,
    #[error("run cancelled while waiting for a rate permit")]
    Cancelled,
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket shared by every outbound request of a run.
///
/// Backed by a GCRA limiter, which behaves like a bucket of `limit` permits refilled
/// one at a time every `window / limit`. No background task is involved, so
/// [`RateGovernor::shutdown`] takes effect immediately and deterministically.
#[derive(Clone)]
pub struct RateGovernor {
    limiter: Arc<DirectRateLimiter>,
    closed: CancellationToken,
    permits_per_second: f64,
}

impl RateGovernor {
    pub fn per_second(limit: u32) -> Self {
        Self::new(Duration::from_secs(1), limit)
    }

    pub fn new(quota_window: Duration, quota_limit: u32) -> Self {
        let quota = quota_from_window(quota_window, quota_limit);
        let permits_per_second =
            f64::from(quota_limit.max(1)) / quota_window.as_secs_f64().max(0.001);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            closed: CancellationToken::new(),
            permits_per_second,
        }
    }

    /// Waits for a permit until `deadline`, the run's `cancel` token, or shutdown.
    pub async fn acquire(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), GovernorError> {
        if self.closed.is_cancelled() {
            return Err(GovernorError::Closed);
        }
        if cancel.is_cancelled() {
            return Err(GovernorError::Cancelled);
        }
        if self.limiter.check().is_ok() {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(GovernorError::Closed),
            _ = cancel.cancelled() => Err(GovernorError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => Err(GovernorError::Timeout),
            _ = self.limiter.until_ready() => Ok(()),
        }
    }

    /// Rejects every pending and future acquisition.
    pub fn shutdown(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn permits_per_second(&self) -> f64 {
        self.permits_per_second
    }
}

impl std::fmt::Debug for RateGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGovernor")
            .field("permits_per_second", &self.permits_per_second)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let safe_limit = quota_limit.max(1);
    let burst = NonZeroU32::new(safe_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
