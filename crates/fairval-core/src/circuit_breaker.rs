use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Runtime circuit state for one upstream source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    retry_at: Option<Instant>,
}

/// Skips a source that keeps failing so it stops consuming rate permits.
///
/// One breaker is owned by each provider and shared by every ticker of the run.
/// A half-open breaker lets one trial request through; its outcome closes or
/// reopens it. A trial that ends without an outcome (cancelled or dropped)
/// returns the breaker to `Open` with the timer already elapsed.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                retry_at: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        // every write stores whole fields, so a poisoned guard is still consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admits one request, returning a permit that must report its outcome.
    ///
    /// Dropping the permit unsettled is safe: a half-open trial is handed back
    /// so the next caller can try again.
    pub fn acquire(&self) -> Option<CircuitPermit<'_>> {
        self.admit().map(|trial| CircuitPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    /// `Some(true)` for a half-open trial, `Some(false)` for a closed circuit.
    fn admit(&self) -> Option<bool> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(false),
            CircuitState::HalfOpen => None,
            CircuitState::Open => {
                let can_retry = inner
                    .retry_at
                    .is_some_and(|retry_at| Instant::now() >= retry_at);

                if can_retry {
                    inner.state = CircuitState::HalfOpen;
                    inner.retry_at = None;
                    Some(true)
                } else {
                    None
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.retry_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        if inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold
        {
            let now = Instant::now();
            inner.state = CircuitState::Open;
            inner.retry_at = Some(now.checked_add(self.config.open_timeout).unwrap_or(now));
        }
    }

    fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            inner.retry_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }
}

/// Admission to one upstream call through a [`CircuitBreaker`].
#[must_use = "an unsettled permit releases its trial when dropped"]
#[derive(Debug)]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CircuitPermit<'_> {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.release_trial();
        }
    }
}
