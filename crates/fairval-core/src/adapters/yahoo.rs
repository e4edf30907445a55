use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::context::RunContext;
use crate::data_source::{governed_get, FinancialDataProvider, Quote, SourceError, SourceErrorKind};
use crate::http_client::{HttpClient, HttpRequest};
use crate::Symbol;

const CHART_ENDPOINT: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const QUOTE_PAGE: &str = "https://finance.yahoo.com/quote";
const REFERER: &str = "https://finance.yahoo.com/";

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
}

/// Yahoo Finance: chart endpoint for the live price, quote pages for fundamentals.
pub struct YahooFinanceProvider {
    http_client: Arc<dyn HttpClient>,
    circuit_breaker: CircuitBreaker,
}

impl YahooFinanceProvider {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        }
    }

    pub fn with_circuit_breaker(http_client: Arc<dyn HttpClient>, config: CircuitBreakerConfig) -> Self {
        Self {
            http_client,
            circuit_breaker: CircuitBreaker::new(config),
        }
    }

    async fn execute(&self, context: &RunContext, url: String) -> Result<String, SourceError> {
        let Some(permit) = self.circuit_breaker.acquire() else {
            return Err(SourceError::unavailable(
                "yahoo circuit breaker is open; skipping upstream call",
            ));
        };

        let request = HttpRequest::browser(url, context.user_agent()).with_referer(Some(REFERER));
        match governed_get(self.http_client.as_ref(), context, request).await {
            Ok(body) => {
                permit.record_success();
                Ok(body)
            }
            Err(error) => {
                if error.kind() != SourceErrorKind::Cancelled {
                    permit.record_failure();
                }
                Err(error)
            }
        }
    }

    async fn quote(&self, symbol: &Symbol, context: &RunContext) -> Result<Quote, SourceError> {
        let url = format!(
            "{CHART_ENDPOINT}/{}?interval=1d&range=1d",
            urlencoding::encode(symbol.as_str())
        );
        let body = self.execute(context, url).await?;
        parse_chart_quote(symbol, &body)
    }

    async fn page(
        &self,
        symbol: &Symbol,
        context: &RunContext,
        section: &str,
    ) -> Result<String, SourceError> {
        let url = format!(
            "{QUOTE_PAGE}/{}/{section}/",
            urlencoding::encode(symbol.as_str())
        );
        self.execute(context, url).await
    }
}

fn parse_chart_quote(symbol: &Symbol, body: &str) -> Result<Quote, SourceError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)
        .map_err(|error| SourceError::parse(format!("yahoo chart payload: {error}")))?;

    if let Some(error) = envelope.chart.error {
        return Err(SourceError::unavailable(format!(
            "yahoo chart error: {}",
            error.description.as_deref().unwrap_or("unknown")
        )));
    }

    let meta = envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .map(|result| result.meta)
        .ok_or_else(|| SourceError::parse("yahoo chart returned no result"))?;

    let price = meta
        .regular_market_price
        .filter(|price| price.is_finite() && *price > 0.0)
        .ok_or_else(|| SourceError::parse("yahoo chart has no market price"))?;

    Ok(Quote {
        symbol: symbol.clone(),
        price,
        symbol_name: meta.long_name.or(meta.short_name).or(meta.symbol),
    })
}

impl FinancialDataProvider for YahooFinanceProvider {
    fn fetch_quote<'a>(
        &'a self,
        symbol: &'a Symbol,
        context: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, SourceError>> + Send + 'a>> {
        Box::pin(self.quote(symbol, context))
    }

    fn fetch_fundamentals_page<'a>(
        &'a self,
        symbol: &'a Symbol,
        context: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, SourceError>> + Send + 'a>> {
        Box::pin(self.page(symbol, context, "key-statistics"))
    }

    fn fetch_financials_page<'a>(
        &'a self,
        symbol: &'a Symbol,
        context: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, SourceError>> + Send + 'a>> {
        Box::pin(self.page(symbol, context, "financials"))
    }

    fn fetch_profile_page<'a>(
        &'a self,
        symbol: &'a Symbol,
        context: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, SourceError>> + Send + 'a>> {
        Box::pin(self.page(symbol, context, "profile"))
    }
}
