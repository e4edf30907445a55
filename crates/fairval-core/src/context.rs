//! Run-scoped state shared by every task of one batch.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::PeCache;
use crate::http_client::random_user_agent;
use crate::retry::RetryConfig;
use crate::throttling::RateGovernor;

/// Stand-in deadline for budgets too large to represent (about thirty years).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Everything a ticker task needs that outlives the task itself.
///
/// Nothing here is global: two batches built from separate contexts share no
/// governor, cache or cancellation state.
#[derive(Debug, Clone)]
pub struct RunContext {
    governor: RateGovernor,
    pe_cache: PeCache,
    cancel: CancellationToken,
    deadline: Instant,
    retry: RetryConfig,
    request_timeout: Duration,
    user_agent: Option<String>,
}

impl RunContext {
    pub fn new(governor: RateGovernor, deadline: Instant) -> Self {
        Self {
            governor,
            pe_cache: PeCache::new(),
            cancel: CancellationToken::new(),
            deadline,
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(10),
            user_agent: None,
        }
    }

    /// Context with a deadline `budget` from now, saturating at a far-future instant.
    pub fn with_budget(governor: RateGovernor, budget: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(budget)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self::new(governor, deadline)
    }

    pub fn with_pe_cache(mut self, pe_cache: PeCache) -> Self {
        self.pe_cache = pe_cache;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Fixed user agent. Without one, each request picks a random browser agent.
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent.filter(|agent| !agent.trim().is_empty());
        self
    }

    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    pub fn pe_cache(&self) -> &PeCache {
        &self.pe_cache
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Per-request timeout, never longer than the time left in the run.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout.min(self.remaining())
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or_else(|| random_user_agent())
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// True once the run was cancelled or its deadline passed.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
