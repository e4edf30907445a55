//! Per-ticker fundamentals aggregation with field-level fallback.

use std::sync::Arc;

use tracing::debug;

use crate::consensus::ConsensusEngine;
use crate::context::RunContext;
use crate::data_source::{FinancialDataProvider, SourceError};
use crate::extract::{extract_free_cash_flow, extract_key_statistics, extract_profile};
use crate::fallback;
use crate::{StockMetrics, Symbol, UtcDateTime};

/// Haircut applied to averaged P/E signals before caching.
pub const PE_CONSERVATISM_FACTOR: f64 = 0.85;
pub const MIN_CACHED_PE: f64 = 8.0;
pub const MAX_CACHED_PE: f64 = 50.0;

/// Share count assumed when FCF totals cannot be scaled by market cap.
pub const ASSUMED_SHARES_OUTSTANDING: f64 = 1e9;

/// Averages the available raw P/E signals, applies the haircut and clamps.
pub fn conservative_pe(signals: &[f64]) -> Option<f64> {
    let usable: Vec<f64> = signals
        .iter()
        .copied()
        .filter(|signal| signal.is_finite() && *signal > 0.0)
        .collect();
    if usable.is_empty() {
        return None;
    }
    let average = usable.iter().sum::<f64>() / usable.len() as f64;
    Some((average * PE_CONSERVATISM_FACTOR).clamp(MIN_CACHED_PE, MAX_CACHED_PE))
}

/// Values that came from live sources, kept apart from the record being filled.
#[derive(Debug, Default, Clone, Copy)]
struct LiveSignals {
    price: Option<f64>,
    eps: Option<f64>,
}

/// Builds a complete [`StockMetrics`] for one ticker.
///
/// Stages (quote, key statistics, financials, profile) fail independently; each
/// failure just leaves fields unset for the fallback pass. Growth comes from the
/// consensus engine when one is attached.
#[derive(Clone)]
pub struct FundamentalsAggregator {
    provider: Arc<dyn FinancialDataProvider>,
    consensus: Option<ConsensusEngine>,
}

impl FundamentalsAggregator {
    pub fn new(provider: Arc<dyn FinancialDataProvider>) -> Self {
        Self {
            provider,
            consensus: None,
        }
    }

    pub fn with_consensus(mut self, consensus: ConsensusEngine) -> Self {
        self.consensus = Some(consensus);
        self
    }

    pub async fn fetch(&self, symbol: &Symbol, context: &RunContext) -> StockMetrics {
        let growth = async {
            match &self.consensus {
                Some(engine) if !context.is_cancelled() => {
                    Some(engine.consensus_detailed(symbol, context).await)
                }
                _ => None,
            }
        };

        let (fetched, consensus) = tokio::join!(self.fetch_without_growth(symbol, context), growth);
        let (mut metrics, _) = fetched;

        if let Some(outcome) = consensus {
            metrics.growth_rate = outcome.value;
        }
        metrics
    }

    /// Every stage except the growth consensus; growth keeps its fallback value.
    pub async fn fetch_without_growth(
        &self,
        symbol: &Symbol,
        context: &RunContext,
    ) -> (StockMetrics, Vec<&'static str>) {
        let mut metrics = StockMetrics::empty(symbol.clone());
        let mut live = LiveSignals::default();

        self.run_stages(symbol, context, &mut metrics, &mut live).await;

        let filled = fallback::fill_missing(&mut metrics);
        if !filled.is_empty() {
            debug!(ticker = %symbol, fields = ?filled, "fallback fields applied");
        }

        if metrics.pe_ratio == 0.0 {
            metrics.pe_ratio = self.cached_pe(symbol, context, live).await.unwrap_or_else(|| {
                debug!(ticker = %symbol, sector = %metrics.sector, "using sector P/E");
                fallback::sector_pe_ratio(&metrics.sector)
            });
        }

        metrics.fetch_time = UtcDateTime::now();
        (metrics, filled)
    }

    async fn run_stages(
        &self,
        symbol: &Symbol,
        context: &RunContext,
        metrics: &mut StockMetrics,
        live: &mut LiveSignals,
    ) {
        if context.is_cancelled() {
            return;
        }
        match self.provider.fetch_quote(symbol, context).await {
            Ok(quote) => {
                metrics.current_price = quote.price;
                live.price = Some(quote.price);
                if let Some(profile) = fallback::stock_profile(symbol).filter(|p| p.price > 0.0) {
                    metrics.market_cap = profile.market_cap / profile.price * quote.price;
                }
                if let Some(name) = quote.symbol_name.filter(|name| !name.trim().is_empty()) {
                    if name != symbol.as_str() {
                        metrics.company_name = name;
                    }
                }
            }
            Err(error) => log_stage_failure(symbol, "quote", &error),
        }

        if context.is_cancelled() {
            return;
        }
        match self.provider.fetch_fundamentals_page(symbol, context).await {
            Ok(page) => {
                let stats = extract_key_statistics(&page);
                if let Some(pe) = stats.pe_ratio {
                    metrics.pe_ratio = pe;
                }
                if let Some(eps) = stats.eps.filter(|eps| *eps != 0.0) {
                    metrics.eps = eps;
                    live.eps = Some(eps);
                }
                if let Some(cap) = stats.market_cap {
                    metrics.market_cap = cap;
                }
                if let Some(book) = stats.book_value {
                    metrics.book_value = book;
                }
            }
            Err(error) => log_stage_failure(symbol, "key_statistics", &error),
        }

        if context.is_cancelled() {
            return;
        }
        match self.provider.fetch_financials_page(symbol, context).await {
            Ok(page) => {
                if let Some(total) = extract_free_cash_flow(&page) {
                    let shares = if metrics.market_cap > 0.0 && metrics.current_price > 0.0 {
                        metrics.market_cap / metrics.current_price
                    } else {
                        ASSUMED_SHARES_OUTSTANDING
                    };
                    metrics.fcf_per_share = total / shares;
                }
            }
            Err(error) => log_stage_failure(symbol, "financials", &error),
        }

        if context.is_cancelled() {
            return;
        }
        match self.provider.fetch_profile_page(symbol, context).await {
            Ok(page) => {
                let profile = extract_profile(&page);
                if let Some(sector) = profile.sector {
                    metrics.sector = sector;
                }
                if let Some(name) = profile.company_name {
                    metrics.company_name = name;
                }
            }
            Err(error) => log_stage_failure(symbol, "profile", &error),
        }
    }

    async fn cached_pe(
        &self,
        symbol: &Symbol,
        context: &RunContext,
        live: LiveSignals,
    ) -> Option<f64> {
        context
            .pe_cache()
            .get_or_compute(symbol, || async move {
                let mut signals = Vec::with_capacity(2);
                signals.extend(fallback::raw_pe_ratio(symbol));
                if let (Some(price), Some(eps)) = (live.price, live.eps) {
                    if eps > 0.0 {
                        signals.push(price / eps);
                    }
                }
                let value = conservative_pe(&signals);
                debug!(ticker = %symbol, signals = signals.len(), pe = ?value, "P/E cache miss");
                value
            })
            .await
    }
}

fn log_stage_failure(symbol: &Symbol, stage: &str, error: &SourceError) {
    debug!(ticker = %symbol, stage, %error, "fundamentals stage failed");
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    use super::*;
    use crate::data_source::Quote;
    use crate::throttling::RateGovernor;

    /// Serves fixed documents; any stage left as `None` fails.
    #[derive(Default)]
    struct StaticPages {
        price: Option<f64>,
        key_statistics: Option<String>,
        financials: Option<String>,
        profile: Option<String>,
    }

    fn page(content: &Option<String>) -> Result<String, SourceError> {
        content
            .clone()
            .ok_or_else(|| SourceError::unavailable("upstream returned status 503"))
    }

    impl FinancialDataProvider for StaticPages {
        fn fetch_quote<'a>(
            &'a self,
            symbol: &'a Symbol,
            _context: &'a RunContext,
        ) -> Pin<Box<dyn Future<Output = Result<Quote, SourceError>> + Send + 'a>> {
            let quote = self
                .price
                .map(|price| Quote {
                    symbol: symbol.clone(),
                    price,
                    symbol_name: None,
                })
                .ok_or_else(|| SourceError::unavailable("quote down"));
            Box::pin(async move { quote })
        }

        fn fetch_fundamentals_page<'a>(
            &'a self,
            _symbol: &'a Symbol,
            _context: &'a RunContext,
        ) -> Pin<Box<dyn Future<Output = Result<String, SourceError>> + Send + 'a>> {
            Box::pin(async move { page(&self.key_statistics) })
        }

        fn fetch_financials_page<'a>(
            &'a self,
            _symbol: &'a Symbol,
            _context: &'a RunContext,
        ) -> Pin<Box<dyn Future<Output = Result<String, SourceError>> + Send + 'a>> {
            Box::pin(async move { page(&self.financials) })
        }

        fn fetch_profile_page<'a>(
            &'a self,
            _symbol: &'a Symbol,
            _context: &'a RunContext,
        ) -> Pin<Box<dyn Future<Output = Result<String, SourceError>> + Send + 'a>> {
            Box::pin(async move { page(&self.profile) })
        }
    }

    fn context() -> RunContext {
        RunContext::with_budget(RateGovernor::per_second(100), Duration::from_secs(5))
    }

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    #[test]
    fn conservative_pe_averages_and_clamps() {
        assert_eq!(conservative_pe(&[]), None);
        assert!((conservative_pe(&[20.0, 30.0]).expect("signal") - 21.25).abs() < 1e-12);
        assert_eq!(conservative_pe(&[4.0]), Some(MIN_CACHED_PE));
        assert_eq!(conservative_pe(&[200.0]), Some(MAX_CACHED_PE));
    }

    #[tokio::test]
    async fn live_stages_override_fallback_fields() {
        let provider = StaticPages {
            price: Some(200.0),
            key_statistics: Some(String::from(
                "<table><tr><td>Diluted EPS (ttm)</td><td>6.50</td></tr>\
                 <tr><td>Book Value Per Share (mrq)</td><td>4.40</td></tr></table>",
            )),
            financials: Some(String::from(
                r#"<div data-test="fin-row"><div data-test="fin-col">Free Cash Flow</div><div data-test="fin-col">(2,000,000,000)</div></div>"#,
            )),
            profile: Some(String::from(r#"<span data-test="SECTOR">Technology</span>"#)),
        };
        let aggregator = FundamentalsAggregator::new(Arc::new(provider));

        let (metrics, filled) = aggregator.fetch_without_growth(&symbol("AAPL"), &context()).await;

        assert_eq!(metrics.current_price, 200.0);
        assert_eq!(metrics.eps, 6.5);
        assert_eq!(metrics.book_value, 4.4);
        let cap = 3.0e12 / 180.0 * 200.0;
        assert!((metrics.market_cap - cap).abs() < 1.0);
        assert!((metrics.fcf_per_share - (-2.0e9 / (cap / 200.0))).abs() < 1e-9);
        assert_eq!(metrics.company_name, "Apple Inc.");
        assert!(!filled.contains(&"current_price"));
        assert!(metrics.is_complete());
    }

    #[tokio::test]
    async fn cached_pe_combines_table_and_implied_multiple() {
        let provider = StaticPages {
            price: Some(240.0),
            key_statistics: Some(String::from(
                "<table><tr><td>Diluted EPS (ttm)</td><td>10.00</td></tr></table>",
            )),
            ..StaticPages::default()
        };
        let aggregator = FundamentalsAggregator::new(Arc::new(provider));
        let context = context();

        let (metrics, _) = aggregator.fetch_without_growth(&symbol("MSFT"), &context).await;
        let (again, _) = aggregator.fetch_without_growth(&symbol("MSFT"), &context).await;

        let expected = (27.3 + 24.0) / 2.0 * PE_CONSERVATISM_FACTOR;
        assert!((metrics.pe_ratio - expected).abs() < 1e-9);
        assert_eq!(again.pe_ratio, metrics.pe_ratio);
        assert_eq!(context.pe_cache().computations(), 1);
    }

    #[tokio::test]
    async fn unknown_ticker_uses_generic_profile_and_sector_pe() {
        let aggregator = FundamentalsAggregator::new(Arc::new(StaticPages::default()));

        let (metrics, _) = aggregator.fetch_without_growth(&symbol("ZZZZ"), &context()).await;

        assert_eq!(metrics.current_price, 150.0);
        assert_eq!(metrics.sector, "Technology");
        assert_eq!(metrics.pe_ratio, 22.0);
        assert_eq!(metrics.company_name, "ZZZZ");
        assert_eq!(metrics.growth_rate, fallback::DEFAULT_GROWTH_RATE);
    }

    #[tokio::test]
    async fn cancelled_run_skips_stages_and_fills_from_fallback() {
        let provider = StaticPages {
            price: Some(999.0),
            ..StaticPages::default()
        };
        let aggregator = FundamentalsAggregator::new(Arc::new(provider));
        let context = context();
        context.cancel();

        let (metrics, filled) = aggregator.fetch_without_growth(&symbol("JNJ"), &context).await;

        assert_eq!(metrics.current_price, 160.0);
        assert!(filled.contains(&"current_price"));
        assert!(metrics.is_complete());
    }
}
