use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] fairval_core::ConfigError),

    #[error("batch produced no results ({failures} tickers failed)")]
    NoResults { failures: usize },

    #[error("batch deadline reached before any ticker finished ({failures} tickers failed)")]
    DeadlineWithoutResults { failures: usize },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::NoResults { .. } => 3,
            Self::DeadlineWithoutResults { .. } => 3,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
