//! DCF and comparable-multiple valuation.
//!
//! Everything here is pure arithmetic over one [`StockMetrics`] record. The book
//! value per share is a floor for both models and for the blended fair value.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::{PriceStatus, StockMetrics, ValuationResult};

/// FCF per share assumed when the reported value is not positive.
pub const FALLBACK_FCF_PER_SHARE: f64 = 2.0;
/// EPS assumed when the reported value is not positive.
pub const FALLBACK_EPS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcfParameters {
    pub discount_rate: f64,
    pub terminal_growth_rate: f64,
    pub max_growth_rate: f64,
    pub projection_years: u32,
}

impl Default for DcfParameters {
    fn default() -> Self {
        Self {
            discount_rate: 0.12,
            terminal_growth_rate: 0.08,
            max_growth_rate: 0.08,
            projection_years: 5,
        }
    }
}

impl DcfParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.discount_rate > 0.0 && self.discount_rate < 1.0) {
            return Err(ConfigError::DiscountRateOutOfRange {
                value: self.discount_rate,
            });
        }
        if !(self.terminal_growth_rate > 0.0 && self.terminal_growth_rate < self.discount_rate) {
            return Err(ConfigError::TerminalGrowthOutOfRange {
                value: self.terminal_growth_rate,
                discount: self.discount_rate,
            });
        }
        if !(self.max_growth_rate > 0.0) {
            return Err(ConfigError::MaxGrowthNotPositive {
                value: self.max_growth_rate,
            });
        }
        if self.projection_years == 0 {
            return Err(ConfigError::ZeroProjectionYears);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompsParameters {
    pub pe_conservative_factor: f64,
    pub max_pe_ratio: f64,
    pub min_pe_ratio: f64,
}

impl Default for CompsParameters {
    fn default() -> Self {
        Self {
            pe_conservative_factor: 0.85,
            max_pe_ratio: 40.0,
            min_pe_ratio: 5.0,
        }
    }
}

impl CompsParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.pe_conservative_factor > 0.0 && self.pe_conservative_factor <= 1.0) {
            return Err(ConfigError::PeFactorOutOfRange {
                value: self.pe_conservative_factor,
            });
        }
        if !(self.min_pe_ratio > 0.0 && self.min_pe_ratio < self.max_pe_ratio) {
            return Err(ConfigError::PeBoundsInvalid {
                min: self.min_pe_ratio,
                max: self.max_pe_ratio,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationWeights {
    pub dcf_weight: f64,
    pub comps_weight: f64,
}

impl Default for ValuationWeights {
    fn default() -> Self {
        Self {
            dcf_weight: 0.6,
            comps_weight: 0.4,
        }
    }
}

impl ValuationWeights {
    /// Validates and rescales the weights so they sum to one.
    pub fn normalized(&self) -> Result<Self, ConfigError> {
        for (field, value) in [("dcf_weight", self.dcf_weight), ("comps_weight", self.comps_weight)] {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(ConfigError::NegativeWeight { field, value });
            }
        }
        let total = self.dcf_weight + self.comps_weight;
        if total <= 0.0 {
            return Err(ConfigError::ZeroWeightTotal);
        }
        Ok(Self {
            dcf_weight: self.dcf_weight / total,
            comps_weight: self.comps_weight / total,
        })
    }
}

/// All tunables of the valuation engine.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ValuationParameters {
    pub dcf: DcfParameters,
    pub comps: CompsParameters,
    pub weights: ValuationWeights,
}

impl ValuationParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dcf.validate()?;
        self.comps.validate()?;
        self.weights.normalized().map(|_| ())
    }
}

/// Stateless valuation over validated, normalized parameters.
#[derive(Debug, Clone, Copy)]
pub struct ValuationEngine {
    parameters: ValuationParameters,
}

impl ValuationEngine {
    pub fn new(parameters: ValuationParameters) -> Result<Self, ConfigError> {
        parameters.dcf.validate()?;
        parameters.comps.validate()?;
        let weights = parameters.weights.normalized()?;
        Ok(Self {
            parameters: ValuationParameters {
                weights,
                ..parameters
            },
        })
    }

    pub fn parameters(&self) -> &ValuationParameters {
        &self.parameters
    }

    /// Discounted FCF over the projection horizon plus a discounted terminal
    /// value, floored at book value.
    pub fn dcf_value(&self, metrics: &StockMetrics) -> f64 {
        let dcf = &self.parameters.dcf;
        let growth = metrics.growth_rate.min(dcf.max_growth_rate);
        let base_fcf = if metrics.fcf_per_share > 0.0 {
            metrics.fcf_per_share
        } else {
            FALLBACK_FCF_PER_SHARE
        };

        let mut fcf = base_fcf;
        let mut present_value = 0.0;
        for year in 1..=dcf.projection_years {
            fcf *= 1.0 + growth;
            present_value += fcf / discount_factor(dcf.discount_rate, year);
        }

        let terminal = fcf * (1.0 + dcf.terminal_growth_rate)
            / (dcf.discount_rate - dcf.terminal_growth_rate);
        let terminal_present = terminal / discount_factor(dcf.discount_rate, dcf.projection_years);

        (present_value + terminal_present).max(metrics.book_value)
    }

    /// Conservative P/E times EPS, floored at book value.
    pub fn comps_value(&self, metrics: &StockMetrics) -> f64 {
        let comps = &self.parameters.comps;
        let pe = (metrics.pe_ratio * comps.pe_conservative_factor)
            .clamp(comps.min_pe_ratio, comps.max_pe_ratio);
        let eps = if metrics.eps > 0.0 {
            metrics.eps
        } else {
            FALLBACK_EPS
        };
        (eps * pe).max(metrics.book_value)
    }

    pub fn evaluate(&self, metrics: &StockMetrics) -> ValuationResult {
        let weights = &self.parameters.weights;
        let dcf_value = self.dcf_value(metrics);
        let comps_value = self.comps_value(metrics);
        let fair_value = (dcf_value * weights.dcf_weight + comps_value * weights.comps_weight)
            .max(metrics.book_value);

        let price = metrics.current_price;
        let status = if price < fair_value {
            PriceStatus::Underpriced
        } else {
            PriceStatus::Overpriced
        };
        let price_difference = fair_value - price;
        let upside_percentage = if price > 0.0 {
            price_difference / price * 100.0
        } else {
            0.0
        };

        ValuationResult {
            ticker: metrics.ticker.clone(),
            fair_value,
            current_price: price,
            price_difference,
            book_value: metrics.book_value,
            status,
            dcf_value,
            comps_value,
            upside_percentage,
            pe_ratio: metrics.pe_ratio,
            eps: metrics.eps,
            fcf_per_share: metrics.fcf_per_share,
            market_cap: metrics.market_cap,
            sector: metrics.sector.clone(),
            growth_rate: metrics.growth_rate,
            company_name: metrics.company_name.clone(),
        }
    }
}

fn discount_factor(rate: f64, years: u32) -> f64 {
    (1.0 + rate).powi(i32::try_from(years).unwrap_or(i32::MAX))
}
