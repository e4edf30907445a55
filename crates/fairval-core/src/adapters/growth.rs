use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::context::RunContext;
use crate::data_source::{governed_get, GrowthProvider, SourceErrorKind};
use crate::extract::extract_growth;
use crate::http_client::{HttpClient, HttpRequest};
use crate::{GrowthEstimate, ProviderId, Symbol};

/// Growth source backed by one public analyst-estimates page.
///
/// The page layout is described by the provider's extraction rules; this type only
/// handles the governed fetch and the breaker bookkeeping.
pub struct PageGrowthProvider {
    id: ProviderId,
    http_client: Arc<dyn HttpClient>,
    circuit_breaker: CircuitBreaker,
}

impl PageGrowthProvider {
    pub fn new(id: ProviderId, http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_breaker_config(id, http_client, CircuitBreakerConfig::default())
    }

    pub fn with_breaker_config(
        id: ProviderId,
        http_client: Arc<dyn HttpClient>,
        config: CircuitBreakerConfig,
    ) -> Self {
        Self {
            id,
            http_client,
            circuit_breaker: CircuitBreaker::new(config),
        }
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    async fn fetch_estimate(&self, symbol: &Symbol, context: &RunContext) -> GrowthEstimate {
        let url = self.id.url_for(symbol);

        if context.is_cancelled() {
            return GrowthEstimate::failure(self.id, url, "run cancelled");
        }
        let Some(permit) = self.circuit_breaker.acquire() else {
            return GrowthEstimate::failure(self.id, url, "circuit breaker is open");
        };

        let request =
            HttpRequest::browser(url.clone(), context.user_agent()).with_referer(self.id.referer());

        match governed_get(self.http_client.as_ref(), context, request).await {
            Ok(body) => {
                permit.record_success();
                match extract_growth(self.id, &body) {
                    Some(rate) => GrowthEstimate::success(self.id, url, rate),
                    None => {
                        debug!(source = %self.id, ticker = %symbol, "no growth value on page");
                        GrowthEstimate::failure(self.id, url, "no growth value found")
                    }
                }
            }
            Err(error) => {
                if error.kind() != SourceErrorKind::Cancelled {
                    permit.record_failure();
                }
                debug!(source = %self.id, ticker = %symbol, %error, "growth fetch failed");
                GrowthEstimate::failure(self.id, url, error.to_string())
            }
        }
    }
}

impl GrowthProvider for PageGrowthProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn fetch<'a>(
        &'a self,
        symbol: &'a Symbol,
        context: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = GrowthEstimate> + Send + 'a>> {
        Box::pin(self.fetch_estimate(symbol, context))
    }
}

/// One page provider per known source, all sharing `http_client`.
pub fn page_growth_providers(http_client: Arc<dyn HttpClient>) -> Vec<Arc<dyn GrowthProvider>> {
    ProviderId::ALL
        .into_iter()
        .map(|id| {
            Arc::new(PageGrowthProvider::new(id, Arc::clone(&http_client))) as Arc<dyn GrowthProvider>
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::http_client::{HttpError, HttpResponse};
    use crate::retry::RetryConfig;
    use crate::throttling::RateGovernor;

    #[derive(Debug)]
    struct RecordingHttpClient {
        response: Result<HttpResponse, HttpError>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingHttpClient {
        fn new(response: Result<HttpResponse, HttpError>) -> Self {
            Self {
                response,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for RecordingHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn context() -> RunContext {
        RunContext::with_budget(RateGovernor::per_second(100), Duration::from_secs(5))
            .with_retry(RetryConfig::no_retry())
    }

    fn aapl() -> Symbol {
        Symbol::parse("AAPL").expect("valid symbol")
    }

    #[tokio::test]
    async fn parses_growth_from_page_and_sends_browser_headers() {
        let client = Arc::new(RecordingHttpClient::new(Ok(HttpResponse::ok(
            "<table><tr><td>EPS next 5Y</td><td>12.00%</td></tr></table>",
        ))));
        let provider = PageGrowthProvider::new(ProviderId::Finviz, client.clone());

        let estimate = provider.fetch(&aapl(), &context()).await;

        assert!(estimate.is_usable());
        assert!((estimate.growth_rate - 0.12).abs() < 1e-9);
        assert_eq!(estimate.confidence, 0.95);

        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://finviz.com/quote.ashx?t=AAPL");
        assert!(requests[0].headers.contains_key("user-agent"));
    }

    #[tokio::test]
    async fn page_without_value_is_a_failed_estimate() {
        let client = Arc::new(RecordingHttpClient::new(Ok(HttpResponse::ok("<p>login</p>"))));
        let provider = PageGrowthProvider::new(ProviderId::Zacks, client);

        let estimate = provider.fetch(&aapl(), &context()).await;

        assert!(!estimate.is_usable());
        assert_eq!(estimate.growth_rate, 0.0);
        assert_eq!(estimate.error.as_deref(), Some("no growth value found"));
    }

    #[tokio::test]
    async fn repeated_failures_open_breaker_and_skip_network() {
        let client = Arc::new(RecordingHttpClient::new(Err(HttpError::new("timeout"))));
        let provider = PageGrowthProvider::with_breaker_config(
            ProviderId::Bloomberg,
            client.clone(),
            CircuitBreakerConfig {
                failure_threshold: 2,
                open_timeout: Duration::from_secs(60),
            },
        );
        let context = context();

        provider.fetch(&aapl(), &context).await;
        provider.fetch(&aapl(), &context).await;
        let skipped = provider.fetch(&aapl(), &context).await;

        assert_eq!(provider.circuit_breaker().state(), CircuitState::Open);
        assert_eq!(skipped.error.as_deref(), Some("circuit breaker is open"));
        assert_eq!(client.recorded_requests().len(), 2);
    }

    fn page_with_growth() -> Arc<RecordingHttpClient> {
        Arc::new(RecordingHttpClient::new(Ok(HttpResponse::ok(
            "<table><tr><td>EPS next 5Y</td><td>12.00%</td></tr></table>",
        ))))
    }

    fn tripped_provider(client: Arc<RecordingHttpClient>) -> PageGrowthProvider {
        let provider = PageGrowthProvider::with_breaker_config(
            ProviderId::Finviz,
            client,
            CircuitBreakerConfig {
                failure_threshold: 1,
                open_timeout: Duration::from_millis(1),
            },
        );
        provider.circuit_breaker().record_failure();
        std::thread::sleep(Duration::from_millis(5));
        provider
    }

    /// A run whose only rate permit is already spent, so fetches wait on the governor.
    async fn starved_context() -> RunContext {
        let context = RunContext::with_budget(
            RateGovernor::new(Duration::from_secs(60), 1),
            Duration::from_secs(30),
        )
        .with_retry(RetryConfig::no_retry());
        context
            .governor()
            .acquire(context.deadline(), context.cancel_token())
            .await
            .expect("first permit is immediate");
        context
    }

    #[tokio::test]
    async fn trial_cancelled_mid_run_lets_a_later_run_retry() {
        let client = page_with_growth();
        let provider = tripped_provider(client.clone());

        let cancelled_run = starved_context().await;
        let cancel = cancelled_run.cancel_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        let abandoned = provider.fetch(&aapl(), &cancelled_run).await;

        assert!(!abandoned.is_usable());
        assert_eq!(provider.circuit_breaker().state(), CircuitState::Open);

        let later = provider.fetch(&aapl(), &context()).await;
        assert!(later.is_usable(), "later run error: {:?}", later.error);
        assert_eq!(provider.circuit_breaker().state(), CircuitState::Closed);
        assert_eq!(client.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn trial_dropped_before_finishing_lets_a_later_run_retry() {
        let client = page_with_growth();
        let provider = tripped_provider(client.clone());

        let stalled_run = starved_context().await;
        let dropped =
            tokio::time::timeout(Duration::from_millis(20), provider.fetch(&aapl(), &stalled_run))
                .await;

        assert!(dropped.is_err(), "fetch should still be waiting for a permit");
        assert_eq!(provider.circuit_breaker().state(), CircuitState::Open);

        let later = provider.fetch(&aapl(), &context()).await;
        assert!(later.is_usable());
        assert_eq!(provider.circuit_breaker().state(), CircuitState::Closed);
    }

    #[test]
    fn builds_one_provider_per_source() {
        let providers = page_growth_providers(Arc::new(crate::http_client::NoopHttpClient));
        let ids: Vec<_> = providers.iter().map(|provider| provider.id()).collect();
        assert_eq!(ids, ProviderId::ALL.to_vec());
    }
}
