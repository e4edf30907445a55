//! Application configuration.
//!
//! Loaded from an optional JSON file; every section and field has a default, so a
//! file only needs the values it changes.
//!
//! ```json
//! {
//!   "dcf_parameters": { "discount_rate": 0.10 },
//!   "processing": { "max_workers": 16, "requests_per_second": 20 },
//!   "output": { "sort_by": "fair_value", "show_only_underpriced": true }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::report::{ResultView, SortKey};
use crate::retry::RetryConfig;
use crate::valuation::{CompsParameters, DcfParameters, ValuationParameters, ValuationWeights};

/// Number of tickers processed in test mode.
pub const TEST_TICKER_COUNT: usize = 10;

/// Longest accepted batch deadline (one day).
pub const MAX_BATCH_DEADLINE_SECONDS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourcesConfig {
    pub ticker_file: PathBuf,
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
    /// Fixed user agent; unset rotates through browser agents.
    pub user_agent: Option<String>,
}

impl Default for DataSourcesConfig {
    fn default() -> Self {
        Self {
            ticker_file: PathBuf::from("data/fortune_500_tickers.csv"),
            request_timeout_seconds: 10,
            max_retries: 3,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub max_workers: usize,
    pub requests_per_second: u32,
    pub batch_deadline_seconds: u64,
    pub shutdown_grace_ms: u64,
    pub pe_cache_enabled: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            requests_per_second: 10,
            batch_deadline_seconds: 300,
            shutdown_grace_ms: 250,
            pe_cache_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub sort_by: SortKey,
    pub show_only_underpriced: bool,
    /// `0` shows every row.
    pub max_results: usize,
    pub show_extra: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dcf_parameters: DcfParameters,
    pub comps_parameters: CompsParameters,
    pub valuation_weights: ValuationWeights,
    pub data_sources: DataSourcesConfig,
    pub processing: ProcessingConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Reads a JSON config file. Fields absent from the file keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Smaller run used by `--test`: four workers and at most ten rows.
    pub fn test_profile() -> Self {
        let mut config = Self::default();
        config.apply_test_profile();
        config
    }

    /// Shrinks an already loaded config to the `--test` run size.
    pub fn apply_test_profile(&mut self) {
        self.processing.max_workers = 4;
        self.output.max_results = TEST_TICKER_COUNT;
    }

    /// Checks every invariant and normalizes the valuation weights in place.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.dcf_parameters.validate()?;
        self.comps_parameters.validate()?;
        self.valuation_weights = self.valuation_weights.normalized()?;

        if self.processing.max_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.processing.requests_per_second == 0 {
            return Err(ConfigError::ZeroRequestRate);
        }
        if self.processing.batch_deadline_seconds == 0 {
            return Err(ConfigError::ZeroDeadline);
        }
        if self.processing.batch_deadline_seconds > MAX_BATCH_DEADLINE_SECONDS {
            return Err(ConfigError::DeadlineTooLong {
                value: self.processing.batch_deadline_seconds,
                max: MAX_BATCH_DEADLINE_SECONDS,
            });
        }
        if self.data_sources.request_timeout_seconds == 0 {
            return Err(ConfigError::ZeroRequestTimeout);
        }
        Ok(())
    }

    pub fn valuation_parameters(&self) -> ValuationParameters {
        ValuationParameters {
            dcf: self.dcf_parameters,
            comps: self.comps_parameters,
            weights: self.valuation_weights,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::exponential(self.data_sources.max_retries)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.data_sources.request_timeout_seconds)
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_secs(self.processing.batch_deadline_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.processing.shutdown_grace_ms)
    }

    pub fn result_view(&self) -> ResultView {
        ResultView {
            sort_by: self.output.sort_by,
            only_underpriced: self.output.show_only_underpriced,
            max_results: self.output.max_results,
        }
    }
}
