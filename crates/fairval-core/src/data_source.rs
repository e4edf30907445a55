//! Source contracts and the governed fetch shared by every adapter.
//!
//! | Trait | Implemented by | Produces |
//! |-------|----------------|----------|
//! | [`GrowthProvider`] | one adapter per [`ProviderId`] | [`GrowthEstimate`] |
//! | [`FinancialDataProvider`] | the quote and fundamentals source | [`Quote`], raw pages |
//!
//! Every outbound call goes through [`governed_get`]: it takes a rate permit,
//! bounds the request by the run deadline, and retries transient failures.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::RunContext;
use crate::http_client::{HttpClient, HttpRequest};
use crate::throttling::GovernorError;
use crate::{GrowthEstimate, ProviderId, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    Unavailable,
    RateLimited,
    InvalidRequest,
    Parse,
    Cancelled,
    Internal,
}

/// Error raised inside a source adapter. Adapters turn it into fallback data;
/// it never crosses the ticker boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Parse,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Cancelled,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    /// Error for a non-2xx response.
    pub fn http_status(status: u16) -> Self {
        let message = format!("upstream returned status {status}");
        match status {
            429 => Self::rate_limited(message),
            400..=499 => Self {
                retryable: false,
                ..Self::unavailable(message)
            },
            _ => Self::unavailable(message),
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Parse => "source.parse",
            SourceErrorKind::Cancelled => "source.cancelled",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<GovernorError> for SourceError {
    fn from(error: GovernorError) -> Self {
        match error {
            GovernorError::Timeout => Self::unavailable(error.to_string()),
            GovernorError::Closed => Self {
                retryable: false,
                ..Self::unavailable(error.to_string())
            },
            GovernorError::Cancelled => Self::cancelled(error.to_string()),
        }
    }
}

/// Live quote from the primary price source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub price: f64,
    /// Display name reported with the quote, if any.
    pub symbol_name: Option<String>,
}

/// One external growth-estimate source.
///
/// `fetch` never fails: every failure is reported as a [`GrowthEstimate`] with an
/// error marker, so the consensus treats all sources uniformly.
pub trait GrowthProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn fetch<'a>(
        &'a self,
        symbol: &'a Symbol,
        context: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = GrowthEstimate> + Send + 'a>>;
}

/// Source of the live quote and the raw fundamentals documents.
pub trait FinancialDataProvider: Send + Sync {
    fn fetch_quote<'a>(
        &'a self,
        symbol: &'a Symbol,
        context: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, SourceError>> + Send + 'a>>;

    /// Key-statistics document (P/E, EPS, market cap, book value).
    fn fetch_fundamentals_page<'a>(
        &'a self,
        symbol: &'a Symbol,
        context: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, SourceError>> + Send + 'a>>;

    /// Cash-flow statement document.
    fn fetch_financials_page<'a>(
        &'a self,
        symbol: &'a Symbol,
        context: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, SourceError>> + Send + 'a>>;

    /// Company profile document (sector, name).
    fn fetch_profile_page<'a>(
        &'a self,
        symbol: &'a Symbol,
        context: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, SourceError>> + Send + 'a>>;
}

/// GET `request` under the run's governor, deadline and retry policy; returns the body.
///
/// Each attempt takes its own rate permit. Retries stop when the policy is
/// exhausted or the next backoff would overrun the deadline.
pub async fn governed_get(
    client: &dyn HttpClient,
    context: &RunContext,
    request: HttpRequest,
) -> Result<String, SourceError> {
    let mut attempt = 0_u32;

    loop {
        context
            .governor()
            .acquire(context.deadline(), context.cancel_token())
            .await?;

        let timeout = context.request_timeout();
        if timeout.is_zero() {
            return Err(SourceError::cancelled("run deadline elapsed"));
        }

        let outcome = tokio::select! {
            biased;
            _ = context.cancel_token().cancelled() => {
                return Err(SourceError::cancelled("run cancelled during request"));
            }
            _ = tokio::time::sleep_until(context.deadline()) => {
                return Err(SourceError::cancelled("run deadline elapsed during request"));
            }
            outcome = client.execute(request.clone().with_timeout(timeout)) => outcome,
        };

        let error = match outcome {
            Ok(response) if response.is_success() => return Ok(response.body),
            Ok(response) => {
                let error = SourceError::http_status(response.status);
                if !context.retry().should_retry_status(response.status) {
                    return Err(error);
                }
                error
            }
            Err(transport) => {
                let error = if transport.retryable() {
                    SourceError::unavailable(format!("transport error: {}", transport.message()))
                } else {
                    SourceError::internal(format!("transport error: {}", transport.message()))
                };
                if !context.retry().should_retry_error(&transport) {
                    return Err(error);
                }
                error
            }
        };

        let Some(delay) = context.retry().next_delay(attempt, context.remaining()) else {
            return Err(error);
        };
        attempt += 1;
        debug!(url = %request.url, attempt, delay_ms = delay.as_millis() as u64, %error, "retrying request");

        tokio::select! {
            biased;
            _ = context.cancel_token().cancelled() => {
                return Err(SourceError::cancelled("run cancelled during backoff"));
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::http_client::{HttpError, HttpResponse};
    use crate::retry::RetryConfig;
    use crate::throttling::RateGovernor;

    /// Replays scripted outcomes in order, repeating the last one.
    struct ScriptedHttpClient {
        outcomes: Vec<Result<HttpResponse, HttpError>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedHttpClient {
        fn new(outcomes: Vec<Result<HttpResponse, HttpError>>) -> Self {
            Self {
                outcomes,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().expect("request store").len()
        }
    }

    impl HttpClient for ScriptedHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            let mut requests = self.requests.lock().expect("request store");
            let index = requests.len().min(self.outcomes.len() - 1);
            requests.push(request);
            let outcome = self.outcomes[index].clone();
            Box::pin(async move { outcome })
        }
    }

    fn context() -> RunContext {
        RunContext::with_budget(RateGovernor::per_second(100), Duration::from_secs(5))
            .with_retry(RetryConfig::fixed(Duration::from_millis(5), 3))
    }

    #[tokio::test]
    async fn retries_transient_status_then_succeeds() {
        let client = ScriptedHttpClient::new(vec![
            Ok(HttpResponse::with_status(503, "busy")),
            Ok(HttpResponse::with_status(429, "slow down")),
            Ok(HttpResponse::ok("<html>ok</html>")),
        ]);

        let body = governed_get(&client, &context(), HttpRequest::get("https://x.test"))
            .await
            .expect("third attempt succeeds");

        assert_eq!(body, "<html>ok</html>");
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::with_status(404, "missing"))]);

        let error = governed_get(&client, &context(), HttpRequest::get("https://x.test"))
            .await
            .expect_err("404 fails");

        assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        assert!(!error.retryable());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let client = ScriptedHttpClient::new(vec![Err(HttpError::new("connection reset"))]);

        let error = governed_get(&client, &context(), HttpRequest::get("https://x.test"))
            .await
            .expect_err("always fails");

        assert_eq!(error.code(), "source.unavailable");
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test]
    async fn cancelled_run_fails_before_network() {
        let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::ok("never"))]);
        let context = context();
        context.cancel();

        let error = governed_get(&client, &context, HttpRequest::get("https://x.test"))
            .await
            .expect_err("cancelled");

        assert_eq!(error.kind(), SourceErrorKind::Cancelled);
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn maps_governor_errors() {
        assert_eq!(
            SourceError::from(GovernorError::Timeout).kind(),
            SourceErrorKind::Unavailable
        );
        assert_eq!(
            SourceError::from(GovernorError::Cancelled).kind(),
            SourceErrorKind::Cancelled
        );
        assert!(!SourceError::from(GovernorError::Closed).retryable());
    }

    #[test]
    fn display_includes_code() {
        let error = SourceError::http_status(429);
        assert_eq!(error.kind(), SourceErrorKind::RateLimited);
        assert_eq!(
            error.to_string(),
            "upstream returned status 429 (source.rate_limited)"
        );
    }
}
