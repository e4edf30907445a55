//! Batch report plus ordering, filtering and summary of its results.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{PriceStatus, Symbol, ValidationError, ValuationResult};

pub type RunId = Uuid;

/// Ticker that produced no result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerFailure {
    pub ticker: Symbol,
    pub reason: String,
}

impl TickerFailure {
    pub fn new(ticker: Symbol, reason: &impl Display) -> Self {
        Self {
            ticker,
            reason: reason.to_string(),
        }
    }
}

/// Outcome of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: RunId,
    pub results: Vec<ValuationResult>,
    pub failures: Vec<TickerFailure>,
    /// The batch deadline, or the grace point ahead of it, fired before the run drained.
    pub timed_out: bool,
    pub elapsed_ms: u64,
    pub dispatched: usize,
    pub not_dispatched: usize,
}

impl BatchReport {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            results: Vec::new(),
            failures: Vec::new(),
            timed_out: false,
            elapsed_ms: 0,
            dispatched: 0,
            not_dispatched: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    pub fn total(&self) -> usize {
        self.results.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn summary(&self) -> Summary {
        Summary::from_results(&self.results)
    }
}

/// Result ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Underpriced first, then by price difference descending.
    #[default]
    Upside,
    Ticker,
    FairValue,
}

impl SortKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upside => "upside",
            Self::Ticker => "ticker",
            Self::FairValue => "fair_value",
        }
    }
}

impl Display for SortKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "upside" => Ok(Self::Upside),
            "ticker" => Ok(Self::Ticker),
            "fair_value" => Ok(Self::FairValue),
            _ => Err(ValidationError::InvalidSortKey {
                value: value.to_owned(),
            }),
        }
    }
}

fn status_rank(status: PriceStatus) -> u8 {
    match status {
        PriceStatus::Underpriced => 0,
        PriceStatus::Overpriced => 1,
    }
}

fn descending(left: f64, right: f64) -> Ordering {
    right.partial_cmp(&left).unwrap_or(Ordering::Equal)
}

pub fn sort_results(results: &mut [ValuationResult], key: SortKey) {
    match key {
        SortKey::Upside => results.sort_by(|left, right| {
            status_rank(left.status)
                .cmp(&status_rank(right.status))
                .then_with(|| descending(left.price_difference, right.price_difference))
                .then_with(|| left.ticker.cmp(&right.ticker))
        }),
        SortKey::Ticker => results.sort_by(|left, right| left.ticker.cmp(&right.ticker)),
        SortKey::FairValue => results.sort_by(|left, right| {
            descending(left.fair_value, right.fair_value)
                .then_with(|| left.ticker.cmp(&right.ticker))
        }),
    }
}

/// Presentation choices applied to a result list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultView {
    pub sort_by: SortKey,
    pub only_underpriced: bool,
    /// `0` keeps every row.
    pub max_results: usize,
}

impl ResultView {
    /// Filters, sorts, then truncates.
    pub fn apply(&self, results: &[ValuationResult]) -> Vec<ValuationResult> {
        let mut selected: Vec<ValuationResult> = results
            .iter()
            .filter(|result| !self.only_underpriced || result.is_underpriced())
            .cloned()
            .collect();
        sort_results(&mut selected, self.sort_by);
        if self.max_results > 0 {
            selected.truncate(self.max_results);
        }
        selected
    }
}

/// Counts over the full result set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub underpriced: usize,
    pub overpriced: usize,
    /// Mean price difference of the underpriced rows, in currency units.
    pub average_upside: f64,
}

impl Summary {
    pub fn from_results(results: &[ValuationResult]) -> Self {
        let (underpriced, upside) = results
            .iter()
            .filter(|result| result.is_underpriced())
            .fold((0_usize, 0.0), |(count, sum), result| {
                (count + 1, sum + result.price_difference)
            });

        Self {
            total: results.len(),
            underpriced,
            overpriced: results.len() - underpriced,
            average_upside: if underpriced > 0 {
                upside / underpriced as f64
            } else {
                0.0
            },
        }
    }
}
