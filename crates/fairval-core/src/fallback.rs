//! Static fallback tables used when live sources do not answer.

use crate::{StockMetrics, Symbol};

/// Growth rate used when neither providers nor the growth table know a ticker.
pub const DEFAULT_GROWTH_RATE: f64 = 0.06;

/// Default universe: 50 large-cap US equities.
pub const DEFAULT_TICKERS: [&str; 50] = [
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK-B", "UNH", "JNJ", "JPM", "V",
    "PG", "HD", "MA", "BAC", "ABBV", "PFE", "KO", "AVGO", "PEP", "TMO", "COST", "WMT", "MRK",
    "DIS", "ACN", "VZ", "ADBE", "NFLX", "NKE", "CRM", "DHR", "LIN", "TXN", "NEE", "ABT", "ORCL",
    "PM", "RTX", "QCOM", "HON", "WFC", "UPS", "T", "LOW", "SPGI", "ELV", "SCHW", "CAT",
];

/// Known fundamentals for a ticker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackProfile {
    pub price: f64,
    pub fcf_per_share: f64,
    pub eps: f64,
    pub book_value: f64,
    pub sector: &'static str,
    pub growth_rate: f64,
    pub market_cap: f64,
    pub company_name: &'static str,
}

const fn profile(
    price: f64,
    fcf_per_share: f64,
    eps: f64,
    book_value: f64,
    sector: &'static str,
    growth_rate: f64,
    market_cap: f64,
    company_name: &'static str,
) -> FallbackProfile {
    FallbackProfile {
        price,
        fcf_per_share,
        eps,
        book_value,
        sector,
        growth_rate,
        market_cap,
        company_name,
    }
}

/// Values for tickers absent from [`STOCK_PROFILES`]. The company name falls back to the ticker.
pub const GENERIC_PROFILE: FallbackProfile =
    profile(150.0, 8.0, 4.0, 25.0, "Technology", DEFAULT_GROWTH_RATE, 150e9, "");

const STOCK_PROFILES: [(&str, FallbackProfile); 10] = [
    ("AAPL", profile(180.0, 9.5, 6.0, 4.0, "Technology", 0.08, 3.0e12, "Apple Inc.")),
    ("MSFT", profile(350.0, 15.2, 12.0, 16.0, "Technology", 0.09, 2.6e12, "Microsoft Corporation")),
    ("GOOGL", profile(140.0, 8.8, 5.8, 22.0, "Technology", 0.07, 1.8e12, "Alphabet Inc.")),
    ("AMZN", profile(140.0, 3.5, 3.2, 18.0, "Consumer Cyclical", 0.12, 1.4e12, "Amazon.com Inc.")),
    ("NVDA", profile(480.0, 8.2, 12.0, 26.0, "Technology", 0.15, 1.2e12, "NVIDIA Corporation")),
    ("META", profile(320.0, 18.5, 14.0, 42.0, "Technology", 0.10, 8.0e11, "Meta Platforms Inc.")),
    ("TSLA", profile(240.0, 3.8, 4.9, 28.0, "Consumer Cyclical", 0.20, 8.0e11, "Tesla Inc.")),
    ("BRK-B", profile(420.0, 22.0, 18.0, 350.0, "Financial Services", 0.06, 9.0e11, "Berkshire Hathaway Inc.")),
    ("UNH", profile(520.0, 25.0, 22.0, 65.0, "Healthcare", 0.08, 4.8e11, "UnitedHealth Group Inc.")),
    ("JNJ", profile(160.0, 8.5, 6.2, 28.0, "Healthcare", 0.05, 4.2e11, "Johnson & Johnson")),
];

const GROWTH_RATES: [(&str, f64); 50] = [
    ("AAPL", 0.05), ("MSFT", 0.08), ("GOOGL", 0.07), ("AMZN", 0.12), ("NVDA", 0.15),
    ("META", 0.09), ("TSLA", 0.20), ("BRK-B", 0.06), ("UNH", 0.08), ("JNJ", 0.04),
    ("JPM", 0.05), ("V", 0.10), ("PG", 0.04), ("HD", 0.06), ("MA", 0.11),
    ("BAC", 0.05), ("ABBV", 0.07), ("PFE", 0.03), ("KO", 0.04), ("AVGO", 0.09),
    ("PEP", 0.04), ("TMO", 0.07), ("COST", 0.06), ("WMT", 0.05), ("MRK", 0.05),
    ("DIS", 0.06), ("ACN", 0.07), ("VZ", 0.02), ("ADBE", 0.10), ("NFLX", 0.08),
    ("NKE", 0.07), ("CRM", 0.12), ("DHR", 0.07), ("LIN", 0.05), ("TXN", 0.05),
    ("NEE", 0.06), ("ABT", 0.06), ("ORCL", 0.06), ("PM", 0.03), ("RTX", 0.05),
    ("QCOM", 0.08), ("HON", 0.06), ("WFC", 0.05), ("UPS", 0.04), ("T", 0.01),
    ("LOW", 0.06), ("SPGI", 0.08), ("ELV", 0.07), ("SCHW", 0.06), ("CAT", 0.05),
];

const PE_RATIOS: [(&str, f64); 50] = [
    ("AAPL", 24.2), ("MSFT", 27.3), ("GOOGL", 19.4), ("AMZN", 38.4), ("NVDA", 55.5),
    ("META", 20.5), ("TSLA", 49.9), ("BRK-B", 8.3), ("UNH", 15.7), ("JNJ", 12.9),
    ("JPM", 11.8), ("V", 31.2), ("PG", 24.6), ("HD", 18.9), ("MA", 29.7),
    ("BAC", 12.4), ("ABBV", 13.8), ("PFE", 11.5), ("KO", 22.8), ("AVGO", 25.4),
    ("PEP", 23.7), ("TMO", 20.9), ("COST", 38.2), ("WMT", 25.1), ("MRK", 14.6),
    ("DIS", 32.8), ("ACN", 23.4), ("VZ", 9.2), ("ADBE", 41.7), ("NFLX", 28.5),
    ("NKE", 26.9), ("CRM", 45.3), ("DHR", 22.8), ("LIN", 19.7), ("TXN", 21.3),
    ("NEE", 19.8), ("ABT", 18.5), ("ORCL", 22.1), ("PM", 16.4), ("RTX", 15.2),
    ("QCOM", 14.8), ("HON", 21.7), ("WFC", 10.9), ("UPS", 17.6), ("T", 8.7),
    ("LOW", 19.4), ("SPGI", 34.5), ("ELV", 13.2), ("SCHW", 18.9), ("CAT", 14.7),
];

const SECTOR_PE_RATIOS: [(&str, f64); 11] = [
    ("Technology", 22.0),
    ("Healthcare", 18.0),
    ("Financial Services", 10.0),
    ("Consumer Cyclical", 16.0),
    ("Consumer Defensive", 20.0),
    ("Energy", 12.0),
    ("Industrials", 13.0),
    ("Materials", 12.0),
    ("Real Estate", 14.0),
    ("Utilities", 16.0),
    ("Communication Services", 18.0),
];

/// Sector multiple for sectors missing from the table.
pub const DEFAULT_SECTOR_PE: f64 = 18.0;

fn lookup<T: Copy>(table: &[(&str, T)], key: &str) -> Option<T> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, value)| *value)
}

pub fn stock_profile(symbol: &Symbol) -> Option<FallbackProfile> {
    lookup(&STOCK_PROFILES, symbol.as_str())
}

pub fn growth_rate(symbol: &Symbol) -> Option<f64> {
    lookup(&GROWTH_RATES, symbol.as_str())
}

/// Reported (unadjusted) trailing P/E.
pub fn raw_pe_ratio(symbol: &Symbol) -> Option<f64> {
    lookup(&PE_RATIOS, symbol.as_str())
}

pub fn sector_pe_ratio(sector: &str) -> f64 {
    lookup(&SECTOR_PE_RATIOS, sector).unwrap_or(DEFAULT_SECTOR_PE)
}

/// Fills every unset field of `metrics` from the ticker's profile, or from
/// [`GENERIC_PROFILE`] when the ticker is unknown. Returns the filled field names.
pub fn fill_missing(metrics: &mut StockMetrics) -> Vec<&'static str> {
    let known = stock_profile(&metrics.ticker);
    let source = known.unwrap_or(GENERIC_PROFILE);
    let mut filled = Vec::new();

    let mut fill_number = |name: &'static str, field: &mut f64, value: f64| {
        if *field == 0.0 || !field.is_finite() {
            *field = value;
            filled.push(name);
        }
    };
    fill_number("current_price", &mut metrics.current_price, source.price);
    fill_number("fcf_per_share", &mut metrics.fcf_per_share, source.fcf_per_share);
    fill_number("eps", &mut metrics.eps, source.eps);
    fill_number("book_value", &mut metrics.book_value, source.book_value);
    fill_number("growth_rate", &mut metrics.growth_rate, source.growth_rate);
    fill_number("market_cap", &mut metrics.market_cap, source.market_cap);

    if metrics.sector.is_empty() {
        metrics.sector = source.sector.to_owned();
        filled.push("sector");
    }
    if metrics.company_name.is_empty() {
        metrics.company_name = match known {
            Some(profile) => profile.company_name.to_owned(),
            None => metrics.ticker.to_string(),
        };
        filled.push("company_name");
    }

    filled
}
