//! Ticker list loading.

use std::path::Path;

use tracing::{info, warn};

use crate::error::CoreError;
use crate::fallback::DEFAULT_TICKERS;
use crate::Symbol;

/// The built-in 50-symbol universe.
pub fn default_tickers() -> Vec<Symbol> {
    DEFAULT_TICKERS
        .iter()
        .filter_map(|ticker| Symbol::parse(ticker).ok())
        .collect()
}

/// Reads the first column of a CSV file with a header row.
///
/// Blank cells are skipped; cells that are not valid symbols are skipped with a
/// warning. Duplicate symbols keep their first position.
pub fn read_ticker_csv(path: &Path) -> Result<Vec<Symbol>, CoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut tickers: Vec<Symbol> = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let Some(cell) = record.get(0).filter(|cell| !cell.is_empty()) else {
            continue;
        };
        match Symbol::parse(cell) {
            Ok(symbol) if !tickers.contains(&symbol) => tickers.push(symbol),
            Ok(_) => {}
            Err(error) => warn!(row = line + 2, value = cell, %error, "skipping invalid ticker"),
        }
    }
    Ok(tickers)
}

/// Loads the ticker list, falling back to [`default_tickers`] when the file is
/// missing, unreadable or empty.
pub fn load_tickers(path: Option<&Path>) -> Vec<Symbol> {
    let Some(path) = path else {
        return default_tickers();
    };

    match read_ticker_csv(path) {
        Ok(tickers) if !tickers.is_empty() => {
            info!(path = %path.display(), count = tickers.len(), "loaded tickers");
            tickers
        }
        Ok(_) => {
            warn!(path = %path.display(), "ticker file is empty; using default list");
            default_tickers()
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "could not read ticker file; using default list");
            default_tickers()
        }
    }
}
