//! Domain types shared by the aggregation and valuation pipeline.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated, uppercase ticker |
//! | [`UtcDateTime`] | UTC fetch timestamp |
//! | [`StockMetrics`] | Gathered fundamentals for one ticker |
//! | [`GrowthEstimate`] | One source's growth estimate |
//! | [`ValuationResult`] | Final priced verdict |

mod models;
mod symbol;
mod timestamp;

pub use models::{GrowthEstimate, PriceStatus, StockMetrics, ValuationResult};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
