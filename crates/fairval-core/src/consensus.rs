//! Multi-source growth consensus.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::context::RunContext;
use crate::data_source::GrowthProvider;
use crate::fallback::{self, DEFAULT_GROWTH_RATE};
use crate::{GrowthEstimate, ProviderId, Symbol};

/// Haircut applied to the weighted consensus.
pub const CONSERVATISM_FACTOR: f64 = 0.9;
pub const MIN_CONSENSUS_GROWTH: f64 = 0.02;
pub const MAX_CONSENSUS_GROWTH: f64 = 0.5;

/// Where a consensus value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusOrigin {
    Consensus,
    StaticTable,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub value: f64,
    pub origin: ConsensusOrigin,
    pub estimates: Vec<GrowthEstimate>,
}

impl ConsensusOutcome {
    pub fn usable_count(&self) -> usize {
        self.estimates.iter().filter(|estimate| estimate.is_usable()).count()
    }
}

/// Confidence-weighted mean of the usable estimates, or `None` when there are none.
pub fn weighted_consensus(estimates: &[GrowthEstimate]) -> Option<f64> {
    let (weighted, total) = estimates
        .iter()
        .filter(|estimate| estimate.is_usable() && estimate.confidence > 0.0)
        .fold((0.0, 0.0), |(weighted, total), estimate| {
            (
                weighted + estimate.growth_rate * estimate.confidence,
                total + estimate.confidence,
            )
        });

    (total > 0.0).then(|| weighted / total)
}

/// Reduces estimates to one growth rate: weighted consensus with haircut and
/// bounds, else the static table, else the global default.
pub fn reduce(symbol: &Symbol, estimates: Vec<GrowthEstimate>) -> ConsensusOutcome {
    let (value, origin) = match weighted_consensus(&estimates) {
        Some(consensus) => (
            (consensus * CONSERVATISM_FACTOR).clamp(MIN_CONSENSUS_GROWTH, MAX_CONSENSUS_GROWTH),
            ConsensusOrigin::Consensus,
        ),
        None => match fallback::growth_rate(symbol) {
            Some(rate) => (rate, ConsensusOrigin::StaticTable),
            None => (DEFAULT_GROWTH_RATE, ConsensusOrigin::Default),
        },
    };

    ConsensusOutcome {
        value,
        origin,
        estimates,
    }
}

/// Fans a ticker out to every growth provider and reduces the answers.
#[derive(Clone)]
pub struct ConsensusEngine {
    providers: Vec<Arc<dyn GrowthProvider>>,
}

impl ConsensusEngine {
    pub fn new(providers: Vec<Arc<dyn GrowthProvider>>) -> Self {
        Self { providers }
    }

    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|provider| provider.id()).collect()
    }

    pub async fn consensus(&self, symbol: &Symbol, context: &RunContext) -> f64 {
        self.consensus_detailed(symbol, context).await.value
    }

    /// Queries all providers concurrently. On cancellation the outstanding
    /// queries are aborted and the reduction uses whatever already finished.
    pub async fn consensus_detailed(&self, symbol: &Symbol, context: &RunContext) -> ConsensusOutcome {
        let mut tasks = JoinSet::new();
        for provider in &self.providers {
            let provider = Arc::clone(provider);
            let symbol = symbol.clone();
            let context = context.clone();
            tasks.spawn(async move {
                let id = provider.id();
                (id, provider.fetch(&symbol, &context).await)
            });
        }

        let mut estimates = Vec::with_capacity(self.providers.len());
        let mut reported = Vec::with_capacity(self.providers.len());
        let cancel = context.cancel_token().clone();

        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(ticker = %symbol, outstanding = tasks.len(), "consensus cancelled");
                    tasks.abort_all();
                    break;
                }
                _ = tokio::time::sleep_until(context.deadline()) => {
                    tasks.abort_all();
                    break;
                }
                joined = tasks.join_next() => joined,
            };

            match joined {
                None => break,
                Some(Ok((id, estimate))) => {
                    if let Some(reason) = &estimate.error {
                        debug!(ticker = %symbol, source = %id, %reason, "growth source failed");
                    }
                    reported.push(id);
                    estimates.push(estimate);
                }
                Some(Err(error)) if error.is_panic() => {
                    warn!(ticker = %symbol, %error, "growth provider task panicked");
                }
                Some(Err(_)) => {}
            }
        }

        for provider in &self.providers {
            let id = provider.id();
            if !reported.contains(&id) {
                let reason = if context.is_cancelled() {
                    "cancelled before completion"
                } else {
                    "provider task panicked"
                };
                estimates.push(GrowthEstimate::failure(id, id.url_for(symbol), reason));
            }
        }

        let outcome = reduce(symbol, estimates);
        debug!(
            ticker = %symbol,
            value = outcome.value,
            origin = ?outcome.origin,
            usable = outcome.usable_count(),
            "growth consensus"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    use super::*;
    use crate::throttling::RateGovernor;

    struct FixedProvider {
        id: ProviderId,
        rate: Option<f64>,
        delay: Duration,
    }

    impl GrowthProvider for FixedProvider {
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
                match self.rate {
                    Some(rate) => GrowthEstimate::success(self.id, url, rate),
                    None => GrowthEstimate::failure(self.id, url, "HTTP status 503"),
                }
            })
        }
    }

    struct PanickingProvider;

    impl GrowthProvider for PanickingProvider {
        fn id(&self) -> ProviderId {
            ProviderId::Reuters
        }

        fn fetch<'a>(
            &'a self,
            _symbol: &'a Symbol,
            _context: &'a RunContext,
        ) -> Pin<Box<dyn Future<Output = GrowthEstimate> + Send + 'a>> {
            Box::pin(async move { parse_changed_layout() })
        }
    }

    fn parse_changed_layout() -> GrowthEstimate {
        panic!("layout changed")
    }

    fn fixed(id: ProviderId, rate: Option<f64>) -> Arc<dyn GrowthProvider> {
        Arc::new(FixedProvider {
            id,
            rate,
            delay: Duration::ZERO,
        })
    }

    fn context() -> RunContext {
        RunContext::with_budget(RateGovernor::per_second(100), Duration::from_secs(5))
    }

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    #[test]
    fn weights_by_confidence() {
        let estimates = vec![
            GrowthEstimate::success(ProviderId::Finviz, "a", 0.10),
            GrowthEstimate::success(ProviderId::SeekingAlpha, "b", 0.20),
            GrowthEstimate::failure(ProviderId::Zacks, "c", "down"),
        ];
        let expected = (0.10 * 0.95 + 0.20 * 0.60) / (0.95 + 0.60);
        let value = weighted_consensus(&estimates).expect("usable estimates");
        assert!((value - expected).abs() < 1e-12);
    }

    #[test]
    fn reduce_applies_haircut_and_bounds() {
        let aapl = symbol("AAPL");

        let high = reduce(&aapl, vec![GrowthEstimate::success(ProviderId::Finviz, "a", 0.9)]);
        assert_eq!(high.value, MAX_CONSENSUS_GROWTH);

        let low = reduce(&aapl, vec![GrowthEstimate::success(ProviderId::Finviz, "a", 0.01)]);
        assert_eq!(low.value, MIN_CONSENSUS_GROWTH);

        let mid = reduce(&aapl, vec![GrowthEstimate::success(ProviderId::Finviz, "a", 0.10)]);
        assert!((mid.value - 0.09).abs() < 1e-12);
        assert_eq!(mid.origin, ConsensusOrigin::Consensus);
    }

    #[test]
    fn reduce_falls_back_to_table_then_default() {
        let table = reduce(&symbol("MSFT"), Vec::new());
        assert_eq!(table.value, 0.08);
        assert_eq!(table.origin, ConsensusOrigin::StaticTable);

        let default = reduce(&symbol("ZZZZ"), Vec::new());
        assert_eq!(default.value, DEFAULT_GROWTH_RATE);
        assert_eq!(default.origin, ConsensusOrigin::Default);
    }

    #[tokio::test]
    async fn engine_tolerates_failed_and_panicking_providers() {
        let engine = ConsensusEngine::new(vec![
            fixed(ProviderId::Finviz, Some(0.12)),
            fixed(ProviderId::Marketwatch, None),
            Arc::new(PanickingProvider),
        ]);

        let outcome = engine.consensus_detailed(&symbol("AAPL"), &context()).await;

        assert_eq!(outcome.estimates.len(), 3);
        assert_eq!(outcome.usable_count(), 1);
        assert!((outcome.value - 0.108).abs() < 1e-12);
        let panicked = outcome
            .estimates
            .iter()
            .find(|estimate| estimate.source == ProviderId::Reuters)
            .expect("panicked provider recorded");
        assert_eq!(panicked.error.as_deref(), Some("provider task panicked"));
    }

    #[tokio::test]
    async fn cancellation_reduces_completed_estimates() {
        let engine = ConsensusEngine::new(vec![
            fixed(ProviderId::Tipranks, Some(0.10)),
            Arc::new(FixedProvider {
                id: ProviderId::Bloomberg,
                rate: Some(0.40),
                delay: Duration::from_secs(30),
            }),
        ]);
        let context = context();
        let canceller = context.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = engine.consensus_detailed(&symbol("AAPL"), &context).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome.usable_count(), 1);
        assert!((outcome.value - 0.09).abs() < 1e-12);
    }
}
