use thiserror::Error;

/// Validation errors for domain values parsed from user input or upstream data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid growth source '{value}'")]
    InvalidSource { value: String },
    #[error("invalid sort key '{value}', expected one of upside, ticker, fair_value")]
    InvalidSortKey { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
}

/// Configuration errors. Any of these aborts a run before work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("discount rate must be in (0, 1), got {value}")]
    DiscountRateOutOfRange { value: f64 },
    #[error("terminal growth rate must be in (0, discount rate {discount}), got {value}")]
    TerminalGrowthOutOfRange { value: f64, discount: f64 },
    #[error("max growth rate must be positive, got {value}")]
    MaxGrowthNotPositive { value: f64 },
    #[error("projection years must be greater than zero")]
    ZeroProjectionYears,

    #[error("P/E conservative factor must be in (0, 1], got {value}")]
    PeFactorOutOfRange { value: f64 },
    #[error("P/E bounds must satisfy 0 < min < max, got min={min} max={max}")]
    PeBoundsInvalid { min: f64, max: f64 },

    #[error("valuation weight '{field}' must be non-negative, got {value}")]
    NegativeWeight { field: &'static str, value: f64 },
    #[error("valuation weights must have a positive total")]
    ZeroWeightTotal,

    #[error("max workers must be greater than zero")]
    ZeroWorkers,
    #[error("requests per second must be greater than zero")]
    ZeroRequestRate,
    #[error("batch deadline must be greater than zero")]
    ZeroDeadline,
    #[error("batch deadline must be at most {max} seconds, got {value}")]
    DeadlineTooLong { value: u64, max: u64 },
    #[error("request timeout must be greater than zero")]
    ZeroRequestTimeout,

    #[error("failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Why one ticker of a batch produced no valuation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TickerError {
    #[error("metrics incomplete after fallback: {fields}")]
    IncompleteMetrics { fields: String },
    #[error("ticker task panicked")]
    Panicked,
    #[error("aborted at batch deadline")]
    Aborted,
    #[error("not dispatched before deadline")]
    NotDispatched,
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
