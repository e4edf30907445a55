use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Symbol, ValidationError};

/// Canonical identifiers of the external growth-estimate sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    YahooFinance,
    Marketwatch,
    SeekingAlpha,
    Finviz,
    Tipranks,
    Investing,
    Zacks,
    Morningstar,
    Reuters,
    Bloomberg,
}

impl ProviderId {
    pub const ALL: [Self; 10] = [
        Self::YahooFinance,
        Self::Marketwatch,
        Self::SeekingAlpha,
        Self::Finviz,
        Self::Tipranks,
        Self::Investing,
        Self::Zacks,
        Self::Morningstar,
        Self::Reuters,
        Self::Bloomberg,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::YahooFinance => "yahoo_finance",
            Self::Marketwatch => "marketwatch",
            Self::SeekingAlpha => "seeking_alpha",
            Self::Finviz => "finviz",
            Self::Tipranks => "tipranks",
            Self::Investing => "investing",
            Self::Zacks => "zacks",
            Self::Morningstar => "morningstar",
            Self::Reuters => "reuters",
            Self::Bloomberg => "bloomberg",
        }
    }

    /// Static reliability weight used by the consensus reduction.
    pub const fn confidence(self) -> f64 {
        match self {
            Self::YahooFinance => 0.85,
            Self::Marketwatch => 0.70,
            Self::SeekingAlpha => 0.60,
            Self::Finviz => 0.95,
            Self::Tipranks => 0.90,
            Self::Investing => 0.80,
            Self::Zacks => 0.85,
            Self::Morningstar => 0.90,
            Self::Reuters => 0.85,
            Self::Bloomberg => 0.90,
        }
    }

    /// Page consulted for a ticker's growth estimate.
    pub fn url_for(self, symbol: &Symbol) -> String {
        let ticker = urlencoding::encode(symbol.as_str());
        match self {
            Self::YahooFinance => format!("https://finance.yahoo.com/quote/{ticker}/analysis/"),
            Self::Marketwatch => format!(
                "https://www.marketwatch.com/investing/stock/{}/analystestimates",
                urlencoding::encode(&symbol.to_lowercase())
            ),
            Self::SeekingAlpha => format!("https://seekingalpha.com/symbol/{ticker}"),
            Self::Finviz => format!("https://finviz.com/quote.ashx?t={ticker}"),
            Self::Tipranks => format!(
                "https://www.tipranks.com/stocks/{}/forecast",
                urlencoding::encode(&symbol.to_lowercase())
            ),
            Self::Investing => format!(
                "https://www.investing.com/equities/{}-earnings",
                urlencoding::encode(&symbol.to_lowercase())
            ),
            Self::Zacks => format!("https://www.zacks.com/stock/quote/{ticker}"),
            Self::Morningstar => format!("https://www.morningstar.com/stocks/xnas/{ticker}/quote"),
            Self::Reuters => format!("https://www.reuters.com/markets/companies/{ticker}.O"),
            Self::Bloomberg => format!("https://www.bloomberg.com/quote/{ticker}:US"),
        }
    }

    pub const fn referer(self) -> Option<&'static str> {
        match self {
            Self::YahooFinance => Some("https://finance.yahoo.com/"),
            Self::Marketwatch => Some("https://www.marketwatch.com/"),
            Self::SeekingAlpha => Some("https://seekingalpha.com/"),
            _ => None,
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str() == normalized)
            .ok_or(ValidationError::InvalidSource { value: normalized })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_identifiers_through_from_str() {
        for provider in ProviderId::ALL {
            assert_eq!(provider.as_str().parse::<ProviderId>(), Ok(provider));
        }
        assert_eq!("Seeking-Alpha".parse::<ProviderId>(), Ok(ProviderId::SeekingAlpha));
        assert!(matches!(
            "google".parse::<ProviderId>(),
            Err(ValidationError::InvalidSource { .. })
        ));
    }

    #[test]
    fn confidences_stay_within_unit_interval() {
        assert!(ProviderId::ALL
            .iter()
            .all(|provider| provider.confidence() > 0.0 && provider.confidence() <= 1.0));
        assert_eq!(ProviderId::Finviz.confidence(), 0.95);
    }

    #[test]
    fn builds_source_urls_for_ticker() {
        let symbol = Symbol::parse("BRK-B").expect("valid symbol");
        assert_eq!(
            ProviderId::Finviz.url_for(&symbol),
            "https://finviz.com/quote.ashx?t=BRK-B"
        );
        assert_eq!(
            ProviderId::Investing.url_for(&symbol),
            "https://www.investing.com/equities/brk-b-earnings"
        );
    }
}
