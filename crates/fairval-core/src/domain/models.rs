use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{ProviderId, Symbol, UtcDateTime};

/// Per-ticker fundamentals gathered for one valuation.
///
/// Numeric fields use `0.0` as the "not yet populated" marker and text fields use
/// an empty string. The aggregator replaces every unset field with fallback data
/// before the record reaches the valuation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMetrics {
    pub ticker: Symbol,
    pub company_name: String,
    pub current_price: f64,
    pub fcf_per_share: f64,
    pub eps: f64,
    pub book_value: f64,
    pub sector: String,
    pub growth_rate: f64,
    pub pe_ratio: f64,
    pub market_cap: f64,
    pub fetch_time: UtcDateTime,
}

impl StockMetrics {
    pub fn empty(ticker: Symbol) -> Self {
        Self {
            ticker,
            company_name: String::new(),
            current_price: 0.0,
            fcf_per_share: 0.0,
            eps: 0.0,
            book_value: 0.0,
            sector: String::new(),
            growth_rate: 0.0,
            pe_ratio: 0.0,
            market_cap: 0.0,
            fetch_time: UtcDateTime::now(),
        }
    }

    /// Names of fields still carrying the unset marker.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let numeric = [
            ("current_price", self.current_price),
            ("fcf_per_share", self.fcf_per_share),
            ("eps", self.eps),
            ("book_value", self.book_value),
            ("growth_rate", self.growth_rate),
            ("pe_ratio", self.pe_ratio),
            ("market_cap", self.market_cap),
        ];

        let mut missing = Vec::new();
        if self.company_name.is_empty() {
            missing.push("company_name");
        }
        if self.sector.is_empty() {
            missing.push("sector");
        }
        missing.extend(
            numeric
                .into_iter()
                .filter(|(_, value)| *value == 0.0 || !value.is_finite())
                .map(|(name, _)| name),
        );
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// One provider's growth estimate for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthEstimate {
    pub source: ProviderId,
    pub url: String,
    pub growth_rate: f64,
    pub confidence: f64,
    pub fetched_at: UtcDateTime,
    pub error: Option<String>,
}

impl GrowthEstimate {
    pub fn success(source: ProviderId, url: impl Into<String>, growth_rate: f64) -> Self {
        Self {
            source,
            url: url.into(),
            growth_rate,
            confidence: source.confidence(),
            fetched_at: UtcDateTime::now(),
            error: None,
        }
    }

    pub fn failure(source: ProviderId, url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source,
            url: url.into(),
            growth_rate: 0.0,
            confidence: source.confidence(),
            fetched_at: UtcDateTime::now(),
            error: Some(reason.into()),
        }
    }

    /// Whether this estimate participates in the consensus.
    pub fn is_usable(&self) -> bool {
        self.error.is_none() && self.growth_rate > 0.0 && self.growth_rate.is_finite()
    }
}

/// Valuation verdict relative to the current market price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceStatus {
    Underpriced,
    Overpriced,
}

impl PriceStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Underpriced => "Underpriced",
            Self::Overpriced => "Overpriced",
        }
    }
}

impl Display for PriceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priced verdict for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub ticker: Symbol,
    pub fair_value: f64,
    pub current_price: f64,
    pub price_difference: f64,
    pub book_value: f64,
    pub status: PriceStatus,
    pub dcf_value: f64,
    pub comps_value: f64,
    pub upside_percentage: f64,
    pub pe_ratio: f64,
    pub eps: f64,
    pub fcf_per_share: f64,
    pub market_cap: f64,
    pub sector: String,
    pub growth_rate: f64,
    pub company_name: String,
}

impl ValuationResult {
    pub fn is_underpriced(&self) -> bool {
        self.status == PriceStatus::Underpriced
    }
}
