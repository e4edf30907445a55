//! Behavior-driven tests for the growth consensus
//!
//! These tests verify the growth rate a ticker ends up with when sources agree,
//! disagree, fail, or run past the deadline.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use fairval_core::consensus::{reduce, MAX_CONSENSUS_GROWTH, MIN_CONSENSUS_GROWTH};
use fairval_core::{
    page_growth_providers, ConsensusEngine, ConsensusOrigin, GrowthEstimate, GrowthProvider,
    HttpClient, HttpError, HttpRequest, HttpResponse, ProviderId, RateGovernor, RetryConfig,
    RunContext, Symbol,
};

/// Answers with a fixed growth rate (or failure) after a delay.
struct FixedGrowth {
    id: ProviderId,
    growth: Option<f64>,
    delay: Duration,
}

impl FixedGrowth {
    fn new(id: ProviderId, growth: Option<f64>) -> Arc<dyn GrowthProvider> {
        Arc::new(Self {
            id,
            growth,
            delay: Duration::ZERO,
        })
    }

    fn slow(id: ProviderId, growth: f64, delay: Duration) -> Arc<dyn GrowthProvider> {
        Arc::new(Self {
            id,
            growth: Some(growth),
            delay,
        })
    }
}

impl GrowthProvider for FixedGrowth {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn fetch<'a>(
        &'a self,
        symbol: &'a Symbol,
        _context: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = GrowthEstimate> + Send + 'a>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            let url = self.id.url_for(symbol);
            match self.growth {
                Some(rate) => GrowthEstimate::success(self.id, url, rate),
                None => GrowthEstimate::failure(self.id, url, "upstream returned status 503"),
            }
        })
    }
}

/// Serves canned pages for two sites and a 503 for every other URL.
struct TwoSitesUp;

impl HttpClient for TwoSitesUp {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let response = if request.url.contains("finviz.com") {
            HttpResponse::ok(
                r#"<table class="snapshot-table2">
                    <tr><td>EPS next Y</td><td>9.80%</td></tr>
                    <tr><td>EPS next 5Y</td><td>12.20%</td></tr>
                </table>"#,
            )
        } else if request.url.contains("zacks.com") {
            HttpResponse::ok(r#"<div data-test="growth-rate">7.5%</div>"#)
        } else {
            HttpResponse::with_status(503, "unavailable")
        };
        Box::pin(async move { Ok(response) })
    }
}

fn symbol(value: &str) -> Symbol {
    Symbol::parse(value).expect("valid symbol")
}

fn context(budget: Duration) -> RunContext {
    RunContext::with_budget(RateGovernor::per_second(1_000), budget).with_retry(RetryConfig::no_retry())
}

// =============================================================================
// Consensus Journey: Agreeing and Disagreeing Sources
// =============================================================================

#[tokio::test]
async fn when_sources_report_growth_the_consensus_is_confidence_weighted_and_haircut() {
    // Given: Finviz (0.95) reports 10% and Marketwatch (0.70) reports 20%
    let engine = ConsensusEngine::new(vec![
        FixedGrowth::new(ProviderId::Finviz, Some(0.10)),
        FixedGrowth::new(ProviderId::Marketwatch, Some(0.20)),
        FixedGrowth::new(ProviderId::Reuters, None),
    ]);

    // When: The consensus for a ticker is computed
    let outcome = engine
        .consensus_detailed(&symbol("AAPL"), &context(Duration::from_secs(5)))
        .await;

    // Then: The value is the weighted mean times 0.9
    let weighted = (0.10 * 0.95 + 0.20 * 0.70) / (0.95 + 0.70);
    assert!((outcome.value - weighted * 0.9).abs() < 1e-12);
    assert_eq!(outcome.origin, ConsensusOrigin::Consensus);

    // And: Every source reported, including the failed one
    assert_eq!(outcome.estimates.len(), 3);
    assert_eq!(outcome.usable_count(), 2);
}

#[tokio::test]
async fn when_sources_report_extreme_growth_the_consensus_is_bounded() {
    // Given: Sources reporting runaway and negligible growth
    let high = ConsensusEngine::new(vec![FixedGrowth::new(ProviderId::Tipranks, Some(0.95))]);
    let low = ConsensusEngine::new(vec![FixedGrowth::new(ProviderId::Tipranks, Some(0.005))]);
    let context = context(Duration::from_secs(5));

    // When: Each consensus is computed
    let high_value = high.consensus(&symbol("NVDA"), &context).await;
    let low_value = low.consensus(&symbol("NVDA"), &context).await;

    // Then: Both land inside the allowed band
    assert_eq!(high_value, MAX_CONSENSUS_GROWTH);
    assert_eq!(low_value, MIN_CONSENSUS_GROWTH);
}

// =============================================================================
// Consensus Journey: Every Source Fails
// =============================================================================

#[tokio::test]
async fn when_every_source_fails_a_known_ticker_uses_the_static_table() {
    // Given: Three failing sources
    let engine = ConsensusEngine::new(vec![
        FixedGrowth::new(ProviderId::Finviz, None),
        FixedGrowth::new(ProviderId::Zacks, None),
        FixedGrowth::new(ProviderId::Bloomberg, None),
    ]);

    // When: MSFT is queried
    let outcome = engine
        .consensus_detailed(&symbol("MSFT"), &context(Duration::from_secs(5)))
        .await;

    // Then: The static growth table answers
    assert_eq!(outcome.origin, ConsensusOrigin::StaticTable);
    assert_eq!(outcome.value, 0.08);
}

#[test]
fn when_every_source_fails_an_unknown_ticker_gets_the_default_rate() {
    // Given: No usable estimates for a ticker absent from every table
    let estimates = vec![GrowthEstimate::failure(
        ProviderId::Finviz,
        "https://finviz.com/quote.ashx?t=QQQZ",
        "no growth value found",
    )];

    // When: The estimates are reduced
    let outcome = reduce(&symbol("QQQZ"), estimates);

    // Then: The global default applies
    assert_eq!(outcome.origin, ConsensusOrigin::Default);
    assert_eq!(outcome.value, 0.06);
}

// =============================================================================
// Consensus Journey: Deadline
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_the_deadline_fires_slow_sources_are_abandoned() {
    // Given: One fast source and one that answers after the deadline
    let engine = ConsensusEngine::new(vec![
        FixedGrowth::new(ProviderId::Finviz, Some(0.10)),
        FixedGrowth::slow(ProviderId::Morningstar, 0.30, Duration::from_secs(60)),
    ]);

    // When: The consensus runs with a one-second budget
    let outcome = engine
        .consensus_detailed(&symbol("AAPL"), &context(Duration::from_secs(1)))
        .await;

    // Then: Only the fast answer counts
    assert!((outcome.value - 0.09).abs() < 1e-12);
    assert_eq!(outcome.usable_count(), 1);

    // And: The abandoned source is reported as a failure
    let slow = outcome
        .estimates
        .iter()
        .find(|estimate| estimate.source == ProviderId::Morningstar)
        .expect("abandoned source is listed");
    assert!(slow.error.is_some());
}

// =============================================================================
// Consensus Journey: Scraped Pages
// =============================================================================

#[tokio::test]
async fn when_two_sites_serve_growth_pages_the_consensus_uses_both() {
    // Given: All ten page sources, with only Finviz and Zacks reachable
    let engine = ConsensusEngine::new(page_growth_providers(Arc::new(TwoSitesUp)));
    assert_eq!(engine.provider_ids().len(), 10);

    // When: The consensus for AAPL is computed
    let outcome = engine
        .consensus_detailed(&symbol("AAPL"), &context(Duration::from_secs(5)))
        .await;

    // Then: Finviz averages its two cells (11%), Zacks reads 7.5%
    let weighted = (0.11 * 0.95 + 0.075 * 0.85) / (0.95 + 0.85);
    assert!((outcome.value - weighted * 0.9).abs() < 1e-9);
    assert_eq!(outcome.usable_count(), 2);
    assert_eq!(outcome.estimates.len(), 10);
}
