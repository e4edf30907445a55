//! Result rendering: a fixed-width table or a single JSON document.

use std::io::Write;

use fairval_core::{
    AppConfig, BatchReport, PriceStatus, Summary, TickerFailure, UtcDateTime, ValuationResult,
};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const BOLD_CYAN: &str = "\x1b[1m\x1b[36m";
const RESET: &str = "\x1b[0m";

const WIDTH: usize = 98;
const EXTRA_WIDTH: usize = 168;

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub color: bool,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    run_id: String,
    timed_out: bool,
    elapsed_ms: u64,
    dispatched: usize,
    not_dispatched: usize,
    summary: Summary,
    results: Vec<ValuationResult>,
    failures: &'a [TickerFailure],
}

pub fn render(
    out: &mut impl Write,
    report: &BatchReport,
    config: &AppConfig,
    options: RenderOptions,
) -> Result<(), CliError> {
    let rows = config.result_view().apply(&report.results);
    match options.format {
        OutputFormat::Json => {
            let document = JsonReport {
                run_id: report.run_id.to_string(),
                timed_out: report.timed_out,
                elapsed_ms: report.elapsed_ms,
                dispatched: report.dispatched,
                not_dispatched: report.not_dispatched,
                summary: report.summary(),
                results: rows,
                failures: &report.failures,
            };
            if options.pretty {
                serde_json::to_writer_pretty(&mut *out, &document)?;
            } else {
                serde_json::to_writer(&mut *out, &document)?;
            }
            writeln!(out)?;
        }
        OutputFormat::Table => {
            render_table(out, report, &rows, config.output.show_extra, options.color)?;
        }
    }
    Ok(())
}

fn paint(color: bool, code: &str, text: &str) -> String {
    if color {
        format!("{code}{text}{RESET}")
    } else {
        text.to_owned()
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let kept: String = text.chars().take(max - 3).collect();
        format!("{kept}...")
    } else {
        text.to_owned()
    }
}

fn render_table(
    out: &mut impl Write,
    report: &BatchReport,
    rows: &[ValuationResult],
    extra: bool,
    color: bool,
) -> Result<(), CliError> {
    if rows.is_empty() {
        writeln!(out, "No results to display!")?;
        return render_summary(out, report, color);
    }

    let banner = "=".repeat(WIDTH);
    writeln!(out, "{}", paint(color, BOLD_CYAN, &banner))?;
    writeln!(
        out,
        "{}",
        paint(
            color,
            BOLD_CYAN,
            &format!("Stock Fair Value Analysis - {}", UtcDateTime::now().format_display())
        )
    )?;
    writeln!(out, "{}", paint(color, BOLD_CYAN, &banner))?;

    let mut header = format!(
        "{:<8} {:<12} {:<12} {:<12} {:<8} {:<12} {:<12} {:<8}",
        "Ticker", "Fair Value", "Current Price", "Difference", "Pct", "Book Value", "Status", "Growth"
    );
    if extra {
        header.push_str(&format!(
            " {:<6} {:<8} {:<12} {:<20} {:<12}",
            "P/E", "EPS", "FCF/Share", "Sector", "Company"
        ));
    }
    writeln!(out, "{}", header.trim_end())?;
    writeln!(out, "{}", "-".repeat(if extra { EXTRA_WIDTH } else { WIDTH }))?;

    for result in rows {
        let mut line = format!(
            "{:<8} ${:<11.2} ${:<11.2} ${:<11.2} {:>6.1}% ${:<11.2} {:<12} {:>5.1}%",
            result.ticker.as_str(),
            result.fair_value,
            result.current_price,
            result.price_difference,
            result.upside_percentage,
            result.book_value,
            result.status.as_str(),
            result.growth_rate * 100.0,
        );
        if extra {
            line.push_str(&format!(
                " {:>5.1} ${:<7.2} ${:<11.2} {:<20} {:<12}",
                result.pe_ratio,
                result.eps,
                result.fcf_per_share,
                truncate(&result.sector, 18),
                truncate(&result.company_name, 20),
            ));
        }
        let code = match result.status {
            PriceStatus::Underpriced => GREEN,
            PriceStatus::Overpriced => RED,
        };
        writeln!(out, "{}", paint(color, code, line.trim_end()))?;
    }

    render_summary(out, report, color)
}

fn render_summary(out: &mut impl Write, report: &BatchReport, color: bool) -> Result<(), CliError> {
    let summary = report.summary();
    let banner = "=".repeat(WIDTH);

    writeln!(out)?;
    writeln!(out, "{}", paint(color, BOLD_CYAN, &banner))?;
    writeln!(out, "Summary:")?;
    writeln!(out, "Total stocks analyzed: {}", summary.total)?;
    writeln!(out, "{}", paint(color, GREEN, &format!("Underpriced: {}", summary.underpriced)))?;
    writeln!(out, "{}", paint(color, RED, &format!("Overpriced: {}", summary.overpriced)))?;
    if summary.underpriced > 0 {
        writeln!(
            out,
            "{}",
            paint(
                color,
                GREEN,
                &format!("Average upside for underpriced stocks: ${:.2}", summary.average_upside)
            )
        )?;
    }
    if !report.failures.is_empty() {
        writeln!(out, "Failed tickers: {}", report.failures.len())?;
        for failure in &report.failures {
            writeln!(out, "  {:<8} {}", failure.ticker.as_str(), failure.reason)?;
        }
    }
    if report.timed_out {
        writeln!(
            out,
            "Batch deadline reached after {:.1}s; results are partial.",
            report.elapsed().as_secs_f64()
        )?;
    }
    writeln!(out, "{}", paint(color, BOLD_CYAN, &banner))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use fairval_core::{RunId, Symbol};

    use super::*;

    fn result(ticker: &str, fair_value: f64, price: f64, status: PriceStatus) -> ValuationResult {
        ValuationResult {
            ticker: Symbol::parse(ticker).expect("valid symbol"),
            fair_value,
            current_price: price,
            price_difference: fair_value - price,
            book_value: 4.0,
            status,
            dcf_value: fair_value,
            comps_value: fair_value,
            upside_percentage: (fair_value - price) / price * 100.0,
            pe_ratio: 22.0,
            eps: 6.0,
            fcf_per_share: 9.5,
            market_cap: 3.0e12,
            sector: String::from("Technology"),
            growth_rate: 0.08,
            company_name: String::from("Apple Inc. with a very long legal name"),
        }
    }

    fn report() -> BatchReport {
        let mut report = BatchReport::new(RunId::nil());
        report.results = vec![
            result("MSFT", 300.0, 350.0, PriceStatus::Overpriced),
            result("AAPL", 200.0, 170.0, PriceStatus::Underpriced),
        ];
        report.failures.push(TickerFailure {
            ticker: Symbol::parse("KO").expect("valid symbol"),
            reason: String::from("not dispatched before deadline"),
        });
        report.dispatched = 2;
        report.not_dispatched = 1;
        report
    }

    fn render_to_string(config: &AppConfig, options: RenderOptions) -> String {
        let mut buffer = Vec::new();
        render(&mut buffer, &report(), config, options).expect("renders");
        String::from_utf8(buffer).expect("utf-8 output")
    }

    const PLAIN_TABLE: RenderOptions = RenderOptions {
        format: OutputFormat::Table,
        pretty: false,
        color: false,
    };

    #[test]
    fn table_lists_underpriced_first_with_summary() {
        let text = render_to_string(&AppConfig::default(), PLAIN_TABLE);
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[1].starts_with("Stock Fair Value Analysis - "));
        assert!(lines[3].starts_with("Ticker   Fair Value"));
        assert!(lines[5].starts_with("AAPL     $200.00      $170.00      $30.00         17.6% $4.00"));
        assert!(lines[6].starts_with("MSFT"));
        assert!(text.contains("Average upside for underpriced stocks: $30.00"));
        assert!(text.contains("  KO       not dispatched before deadline"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn extra_columns_truncate_company_names() {
        let mut config = AppConfig::default();
        config.output.show_extra = true;
        let text = render_to_string(&config, PLAIN_TABLE);

        assert!(text.contains("FCF/Share"));
        assert!(text.contains("Apple Inc. with a..."));
    }

    #[test]
    fn json_applies_view_and_carries_run_metadata() {
        let mut config = AppConfig::default();
        config.output.show_only_underpriced = true;
        let text = render_to_string(
            &config,
            RenderOptions {
                format: OutputFormat::Json,
                pretty: false,
                color: false,
            },
        );

        let json: serde_json::Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(json["results"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["results"][0]["ticker"], "AAPL");
        assert_eq!(json["summary"]["total"], 2);
        assert_eq!(json["not_dispatched"], 1);
        assert_eq!(json["failures"][0]["ticker"], "KO");
    }
}
