//! Wires configuration, providers and the scheduler into one batch run.

use std::sync::Arc;

use fairval_core::config::TEST_TICKER_COUNT;
use fairval_core::{
    default_tickers, load_tickers, page_growth_providers, AppConfig, BatchReport, ConsensusEngine,
    FundamentalsAggregator, HttpClient, NoopHttpClient, PeCache, RateGovernor, ReqwestHttpClient,
    RunContext, SchedulerConfig, Symbol, TaskScheduler, TickerPipeline, ValuationEngine,
    YahooFinanceProvider,
};
use tracing::{info, warn};

use crate::cli::Cli;
use crate::error::CliError;

/// Loads the config file (or a default profile) and applies command-line overrides.
pub fn resolve_config(cli: &Cli) -> Result<AppConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if cli.test {
        config.apply_test_profile();
    }

    if let Some(path) = &cli.tickers {
        config.data_sources.ticker_file = path.clone();
    }
    if let Some(workers) = cli.workers {
        config.processing.max_workers = workers;
    }
    if let Some(rate) = cli.rate {
        config.processing.requests_per_second = rate;
    }
    if let Some(seconds) = cli.deadline_secs {
        config.processing.batch_deadline_seconds = seconds;
    }
    if let Some(sort) = cli.sort {
        config.output.sort_by = sort;
    }
    if let Some(limit) = cli.limit {
        config.output.max_results = limit;
    }
    config.output.show_only_underpriced |= cli.underpriced;
    config.output.show_extra |= cli.extra;

    config.validate()?;
    Ok(config)
}

/// Test mode runs the first ten built-in tickers; otherwise the configured CSV.
pub fn select_tickers(config: &AppConfig, test: bool) -> Vec<Symbol> {
    if test {
        return default_tickers().into_iter().take(TEST_TICKER_COUNT).collect();
    }
    load_tickers(Some(config.data_sources.ticker_file.as_path()))
}

pub async fn run(cli: &Cli, config: &AppConfig) -> Result<BatchReport, CliError> {
    let tickers = select_tickers(config, cli.test);

    let http_client: Arc<dyn HttpClient> = if cli.offline {
        Arc::new(NoopHttpClient)
    } else {
        Arc::new(ReqwestHttpClient::new())
    };

    let aggregator = FundamentalsAggregator::new(Arc::new(YahooFinanceProvider::new(Arc::clone(
        &http_client,
    ))))
    .with_consensus(ConsensusEngine::new(page_growth_providers(http_client)));
    let engine = ValuationEngine::new(config.valuation_parameters())?;

    let scheduler = TaskScheduler::new(
        TickerPipeline::new(aggregator, engine),
        SchedulerConfig {
            workers: config.processing.max_workers,
            shutdown_grace: config.shutdown_grace(),
        },
    );

    let governor = RateGovernor::per_second(config.processing.requests_per_second);
    let pe_cache = if config.processing.pe_cache_enabled {
        PeCache::new()
    } else {
        PeCache::disabled()
    };
    let context = RunContext::with_budget(governor.clone(), config.batch_deadline())
        .with_pe_cache(pe_cache)
        .with_retry(config.retry_config())
        .with_request_timeout(config.request_timeout())
        .with_user_agent(config.data_sources.user_agent.clone());

    let interrupt = tokio::spawn({
        let cancel = context.cancel_token().clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing in-flight tickers");
                cancel.cancel();
            }
        }
    });

    info!(
        tickers = tickers.len(),
        offline = cli.offline,
        rate = config.processing.requests_per_second,
        "starting valuation run"
    );
    let report = scheduler.run(tickers, context).await;
    interrupt.abort();
    governor.shutdown();

    if report.results.is_empty() {
        let failures = report.failures.len();
        return Err(if report.timed_out {
            CliError::DeadlineWithoutResults { failures }
        } else {
            CliError::NoResults { failures }
        });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;
    use fairval_core::{ConfigError, SortKey};

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fairval").chain(args.iter().copied()))
            .expect("arguments parse")
    }

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"processing": {{"max_workers": 16, "requests_per_second": 5}}, "output": {{"sort_by": "ticker"}}}}"#
        )
        .expect("write config");
        let path = file.path().display().to_string();

        let config = resolve_config(&parse(&["--config", &path, "--workers", "2", "--underpriced"]))
            .expect("config resolves");

        assert_eq!(config.processing.max_workers, 2);
        assert_eq!(config.processing.requests_per_second, 5);
        assert_eq!(config.output.sort_by, SortKey::Ticker);
        assert!(config.output.show_only_underpriced);
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        let error = resolve_config(&parse(&["--workers", "0"])).expect_err("rejected");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_mode_uses_the_small_profile() {
        let cli = parse(&["--test", "--tickers", "/nonexistent/tickers.csv"]);
        let config = resolve_config(&cli).expect("config resolves");

        assert_eq!(config.processing.max_workers, 4);
        let tickers = select_tickers(&config, cli.test);
        assert_eq!(tickers.len(), TEST_TICKER_COUNT);
        assert_eq!(tickers[0].as_str(), "AAPL");
    }

    #[test]
    fn test_mode_overrides_a_config_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"processing": {{"max_workers": 16}}}}"#).expect("write config");
        let mut csv = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(csv, "Symbol\nXOM\nCVX").expect("write tickers");
        let config_path = file.path().display().to_string();
        let csv_path = csv.path().display().to_string();

        let cli = parse(&["--test", "--config", &config_path, "--tickers", &csv_path]);
        let config = resolve_config(&cli).expect("config resolves");

        assert_eq!(config.processing.max_workers, 4);
        assert_eq!(config.output.max_results, TEST_TICKER_COUNT);
        let tickers = select_tickers(&config, cli.test);
        assert_eq!(tickers, default_tickers()[..TEST_TICKER_COUNT].to_vec());
    }

    #[test]
    fn explicit_workers_win_over_test_profile() {
        let config = resolve_config(&parse(&["--test", "--workers", "2"])).expect("config resolves");
        assert_eq!(config.processing.max_workers, 2);
    }

    #[test]
    fn oversized_deadline_is_a_config_error() {
        let error = resolve_config(&parse(&["--deadline-secs", "18446744073709551615"]))
            .expect_err("rejected");
        assert!(matches!(error, CliError::Config(ConfigError::DeadlineTooLong { .. })));
        assert_eq!(error.exit_code(), 2);
    }

    #[tokio::test]
    async fn offline_run_values_every_ticker_from_fallback() {
        let cli = parse(&[
            "--test",
            "--offline",
            "--rate",
            "1000",
            "--tickers",
            "/nonexistent/tickers.csv",
        ]);
        let config = resolve_config(&cli).expect("config resolves");

        let report = run(&cli, &config).await.expect("offline run has results");

        assert_eq!(report.results.len(), TEST_TICKER_COUNT);
        assert!(report.failures.is_empty());
        assert!(!report.timed_out);
    }
}
