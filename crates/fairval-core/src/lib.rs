//! # Fairval Core
//!
//! Concurrent fundamentals aggregation and fair-value estimation for equities.
//!
//! ## Overview
//!
//! For every ticker in a batch this crate:
//!
//! - fetches a quote and fundamentals pages from Yahoo Finance
//! - scrapes growth estimates from ten public sites and reduces them to a
//!   confidence-weighted, conservative consensus
//! - fills anything the network did not supply from a static fallback table
//! - blends a five-year DCF with a P/E comparables value into a fair value
//!
//! All outbound requests share one rate governor and one batch deadline; the
//! batch returns partial results when the deadline fires.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Yahoo Finance and growth-page providers |
//! | [`cache`] | Per-run cached P/E map |
//! | [`circuit_breaker`] | Circuit breaker for resilient calls |
//! | [`config`] | Application configuration |
//! | [`consensus`] | Growth consensus fan-out and reduction |
//! | [`context`] | Per-run deadline, cancellation and shared handles |
//! | [`data_source`] | Provider traits and the governed HTTP call |
//! | [`domain`] | Domain models (Symbol, StockMetrics, ValuationResult) |
//! | [`error`] | Core error types |
//! | [`extract`] | Number parsing and page extraction rules |
//! | [`fallback`] | Static fallback tables |
//! | [`fundamentals`] | Staged fundamentals aggregation |
//! | [`http_client`] | HTTP client abstraction |
//! | [`report`] | Batch report, sorting and summary |
//! | [`retry`] | Retry and backoff policy |
//! | [`scheduler`] | Bounded worker pool under a batch deadline |
//! | [`source`] | Growth source identifiers |
//! | [`throttling`] | Shared request-rate governor |
//! | [`tickers`] | Ticker list loading |
//! | [`valuation`] | DCF, comparables and blended fair value |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  TaskScheduler  │  workers × N, batch deadline
//! └────────┬────────┘
//!          │ per ticker
//!          ▼
//! ┌──────────────────────┐     ┌──────────────────┐
//! │ FundamentalsAggregator│────▶│ ConsensusEngine  │  10 growth sources
//! └────────┬─────────────┘     └────────┬─────────┘
//!          │                            │
//!          ▼                            ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ governed_get    │────▶│ HTTP Client      │
//! │ (rate governor) │     │ (reqwest/none)   │
//! └─────────────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ ValuationEngine │
//! └─────────────────┘
//! ```

pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod consensus;
pub mod context;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod fundamentals;
pub mod http_client;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod source;
pub mod throttling;
pub mod tickers;
pub mod valuation;

// Adapter implementations
pub use adapters::{page_growth_providers, PageGrowthProvider, YahooFinanceProvider};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitPermit, CircuitState};

// Caching
pub use cache::PeCache;

// Configuration
pub use config::{AppConfig, DataSourcesConfig, OutputConfig, ProcessingConfig};

// Consensus
pub use consensus::{ConsensusEngine, ConsensusOrigin, ConsensusOutcome};

// Run context
pub use context::RunContext;

// Provider traits and types
pub use data_source::{
    governed_get, FinancialDataProvider, GrowthProvider, Quote, SourceError, SourceErrorKind,
};

// Domain models
pub use domain::{GrowthEstimate, PriceStatus, StockMetrics, Symbol, UtcDateTime, ValuationResult};

// Error types
pub use error::{ConfigError, CoreError, TickerError, ValidationError};

// Fundamentals
pub use fundamentals::FundamentalsAggregator;

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, NoopHttpClient, ReqwestHttpClient};

// Reporting
pub use report::{BatchReport, ResultView, RunId, SortKey, Summary, TickerFailure};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Scheduling
pub use scheduler::{SchedulerConfig, TaskScheduler, TickerJob, TickerPipeline};

// Source identifiers
pub use source::ProviderId;

// Throttling
pub use throttling::{GovernorError, RateGovernor};

// Tickers
pub use tickers::{default_tickers, load_tickers};

// Valuation
pub use valuation::{
    CompsParameters, DcfParameters, ValuationEngine, ValuationParameters, ValuationWeights,
};
