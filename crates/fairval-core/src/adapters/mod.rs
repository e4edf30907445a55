//! Source adapters.
//!
//! | Adapter | Contract | Upstream |
//! |---------|----------|----------|
//! | [`PageGrowthProvider`] | [`GrowthProvider`](crate::GrowthProvider) | analyst-estimate pages, one per [`ProviderId`](crate::ProviderId) |
//! | [`YahooFinanceProvider`] | [`FinancialDataProvider`](crate::FinancialDataProvider) | Yahoo chart endpoint and quote pages |

mod growth;
mod yahoo;

pub use growth::{page_growth_providers, PageGrowthProvider};
pub use yahoo::YahooFinanceProvider;
