//! CLI argument definitions for fairval.
//!
//! # Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | none | JSON configuration file |
//! | `--tickers` | config value | Ticker CSV (first column, header row) |
//! | `--workers` | `8` | Worker pool size |
//! | `--rate` | `10` | Outbound requests per second |
//! | `--deadline-secs` | `300` | Batch deadline |
//! | `--format` | `table` | Output format (table, json) |
//! | `--sort` | `upside` | Ordering (upside, ticker, fair_value) |
//! | `--underpriced` | `false` | Only underpriced rows |
//! | `--limit` | `0` | Maximum rows, `0` for all |
//! | `--extra` | `false` | P/E, EPS, FCF, sector and company columns |
//! | `--test` | `false` | First ten built-in tickers, four workers |
//! | `--offline` | `false` | No network; values come from fallback tables |
//!
//! # Examples
//!
//! ```bash
//! fairval --test
//! fairval --tickers data/fortune_500_tickers.csv --underpriced --limit 20
//! fairval --format json --pretty --deadline-secs 60
//! ```

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use fairval_core::SortKey;

/// Estimate fair values for a list of stocks.
///
/// Blends a five-year discounted cash flow with a P/E comparables value,
/// using growth estimates gathered from public finance sites.
#[derive(Debug, Parser)]
#[command(name = "fairval", author, version, about = "Stock fair value estimator")]
pub struct Cli {
    /// JSON configuration file; absent fields keep their defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Ticker CSV file.
    #[arg(long)]
    pub tickers: Option<PathBuf>,

    /// Maximum number of parallel workers.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Outbound requests per second, shared by every worker.
    #[arg(long)]
    pub rate: Option<u32>,

    /// Seconds before the batch returns with whatever has finished.
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, default_value_t = false)]
    pub pretty: bool,

    /// Sort results by: upside, ticker, fair_value.
    #[arg(long)]
    pub sort: Option<SortKey>,

    /// Show only underpriced stocks.
    #[arg(long, default_value_t = false)]
    pub underpriced: bool,

    /// Maximum number of results to show (0 = no limit).
    #[arg(long)]
    pub limit: Option<usize>,

    /// Show additional columns (P/E, EPS, FCF/share, sector, company).
    #[arg(long, default_value_t = false)]
    pub extra: bool,

    /// Color table rows by verdict.
    #[arg(long, default_value_t = false)]
    pub color: bool,

    /// Run with the first ten tickers and four workers.
    #[arg(long, default_value_t = false)]
    pub test: bool,

    /// Skip the network; every value comes from the fallback tables.
    #[arg(long, default_value_t = false)]
    pub offline: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Fixed-width table for terminal display.
    Table,
    /// Single JSON object.
    Json,
}
