//! Field extraction from fetched HTML pages and embedded JSON.
//!
//! Every function here is pure: it takes a document body and returns whatever it
//! could recognise. Network access and fallback policy live elsewhere.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use thiserror::Error;

use crate::ProviderId;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+\.?\d*").expect("number pattern is valid"));
static JSON_GROWTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""growth"[^}]*?(\d+\.?\d*)"#).expect("json growth pattern is valid")
});
static APP_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)root\.App\.main\s*=\s*(\{.*\});\s*$").expect("app state pattern is valid")
});
static MARKET_CAP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+\.?[0-9]*)([KMBT]?)$").expect("market cap pattern is valid")
});

const NOT_AVAILABLE: [&str; 6] = ["n/a", "--", "na", "null", "none", "-"];

/// Text elements longer than this are containers, not labelled values.
const MAX_LABELLED_TEXT: usize = 200;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GrowthParseError {
    #[error("value not available")]
    NotAvailable,
    #[error("no number found")]
    NoNumber,
    #[error("value too small to be a growth rate")]
    TooSmall,
}

/// Converts a displayed growth figure to a fraction.
///
/// `"12.5%"` and `"12.5"` both become `0.125`; `"0.08"` stays `0.08`. The result is
/// clamped to `[-0.5, 1.0]` and positive values under `0.001` are rejected.
pub fn parse_growth_value(text: &str) -> Result<f64, GrowthParseError> {
    let cleaned: String = text
        .chars()
        .filter(|ch| !matches!(ch, '%' | ',' | '$' | '(' | ')'))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || NOT_AVAILABLE.contains(&cleaned.to_ascii_lowercase().as_str()) {
        return Err(GrowthParseError::NotAvailable);
    }

    let mut value: f64 = NUMBER
        .find(cleaned)
        .and_then(|found| found.as_str().parse().ok())
        .ok_or(GrowthParseError::NoNumber)?;

    if text.contains('%') || value > 1.0 {
        value /= 100.0;
    }
    let value = value.clamp(-0.5, 1.0);

    if value > 0.0 && value < 0.001 {
        return Err(GrowthParseError::TooSmall);
    }
    Ok(value)
}

/// Plain ratio or per-share figure such as `"28.45"` or `"$6.13"`.
pub fn parse_plain_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|ch| !matches!(ch, ',' | '$' | '%'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || NOT_AVAILABLE.contains(&cleaned.to_ascii_lowercase().as_str()) {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Market capitalisation with an optional `K`/`M`/`B`/`T` suffix.
pub fn parse_market_cap(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|ch| !matches!(ch, ',' | '$') && !ch.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    let captures = MARKET_CAP.captures(&cleaned)?;
    let base: f64 = captures.get(1)?.as_str().parse().ok()?;
    let multiplier = match captures.get(2).map(|m| m.as_str()) {
        Some("K") => 1e3,
        Some("M") => 1e6,
        Some("B") => 1e9,
        Some("T") => 1e12,
        _ => 1.0,
    };
    Some(base * multiplier).filter(|value| *value > 0.0)
}

/// Statement figure where parentheses mark a negative value, e.g. `"(1,234)"`.
pub fn parse_financial_value(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let negative = trimmed.starts_with('(') || trimmed.starts_with('-');
    let cleaned: String = trimmed
        .chars()
        .filter(|ch| !matches!(ch, ',' | '$' | '(' | ')' | '-'))
        .collect();
    let magnitude = parse_plain_number(&cleaned)?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Averages numbers that follow a `"growth"` key in embedded JSON.
pub fn extract_json_growth(content: &str) -> Option<f64> {
    let rates: Vec<f64> = JSON_GROWTH
        .captures_iter(content)
        .filter_map(|captures| captures.get(1)?.as_str().parse::<f64>().ok())
        .map(|value| if value > 1.0 { value / 100.0 } else { value })
        .collect();
    average(&rates)
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Growth pages
// ============================================================================

/// How a growth page is searched.
#[derive(Debug, Clone, Copy)]
struct GrowthRules {
    /// Table rows whose first cell contains one of these; later cells hold values.
    row_labels: &'static [&'static str],
    /// Label cells followed by their value cell.
    pair_labels: &'static [&'static str],
    /// Elements scanned for labelled text.
    text_selector: Option<&'static str>,
    text_keywords: &'static [&'static str],
    text_context: &'static [&'static str],
    /// Dedicated value elements; the first parseable one wins.
    direct_selectors: &'static [&'static str],
    scan_scripts: bool,
}

const EMPTY: &[&str] = &[];

const fn rules_for(provider: ProviderId) -> GrowthRules {
    let base = GrowthRules {
        row_labels: EMPTY,
        pair_labels: EMPTY,
        text_selector: None,
        text_keywords: EMPTY,
        text_context: EMPTY,
        direct_selectors: EMPTY,
        scan_scripts: false,
    };

    match provider {
        ProviderId::YahooFinance => GrowthRules {
            row_labels: &["growth", "next year", "5 year", "eps"],
            text_selector: Some("span, td"),
            text_keywords: &["growth"],
            text_context: &["estimate", "next year", "5 year", "eps growth", "revenue growth"],
            scan_scripts: true,
            ..base
        },
        ProviderId::Marketwatch => GrowthRules {
            row_labels: &["growth", "estimate"],
            ..base
        },
        ProviderId::SeekingAlpha => GrowthRules {
            text_selector: Some("div, span, td"),
            text_keywords: &["growth"],
            text_context: &["%", "estimate"],
            ..base
        },
        ProviderId::Finviz => GrowthRules {
            pair_labels: &[
                "eps next y",
                "eps next 5y",
                "sales next 5y",
                "eps growth",
                "sales growth",
                "ltg",
            ],
            ..base
        },
        ProviderId::Tipranks => GrowthRules {
            row_labels: &["growth", "estimate", "consensus"],
            text_selector: Some("div, span, td"),
            text_keywords: &["growth", "estimate", "consensus"],
            text_context: &["eps", "revenue", "earnings", "next year", "5 year"],
            scan_scripts: true,
            ..base
        },
        ProviderId::Investing => GrowthRules {
            row_labels: &["growth", "estimate", "consensus", "eps", "revenue", "earnings"],
            text_selector: Some("div, span"),
            text_keywords: &["growth", "estimate"],
            text_context: &["eps", "revenue", "earnings"],
            ..base
        },
        ProviderId::Zacks => GrowthRules {
            direct_selectors: &[
                ".rank_view .zr_ranktext",
                ".composite_val",
                "[data-test='growth-rate']",
            ],
            ..base
        },
        ProviderId::Morningstar => GrowthRules {
            direct_selectors: &[
                ".dp-value",
                "[data-test='growth-forecast']",
                ".sal-component-cta-link",
            ],
            ..base
        },
        ProviderId::Reuters => GrowthRules {
            direct_selectors: &[
                ".forecast-data",
                ".analyst-estimates",
                "[data-testid='growth-rate']",
            ],
            ..base
        },
        ProviderId::Bloomberg => GrowthRules {
            direct_selectors: &[
                ".data-table-row",
                "[data-module='Estimates']",
                ".analyst-forecast",
            ],
            ..base
        },
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn accept_growth(text: &str) -> Option<f64> {
    parse_growth_value(text)
        .ok()
        .filter(|value| *value > 0.0 && *value < 1.0)
}

/// Extracts a provider's growth estimate from its page, as a fraction in `(0, 1)`.
pub fn extract_growth(provider: ProviderId, html: &str) -> Option<f64> {
    let rules = rules_for(provider);
    let document = Html::parse_document(html);

    if !rules.direct_selectors.is_empty() {
        return rules
            .direct_selectors
            .iter()
            .filter_map(|css| selector(css))
            .map(|sel| {
                document
                    .select(&sel)
                    .map(element_text)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .find_map(|text| accept_growth(&text));
    }

    let mut found = Vec::new();

    if !rules.row_labels.is_empty() {
        if let (Some(tr), Some(cell)) = (selector("tr"), selector("td, th")) {
            for row in document.select(&tr) {
                let cells: Vec<String> = row.select(&cell).map(element_text).collect();
                let Some((label, values)) = cells.split_first() else {
                    continue;
                };
                if contains_any(&label.to_lowercase(), rules.row_labels) {
                    found.extend(values.iter().filter_map(|value| accept_growth(value)));
                }
            }
        }
    }

    if !rules.pair_labels.is_empty() {
        if let Some(td) = selector("td") {
            let cells: Vec<String> = document.select(&td).map(element_text).collect();
            for pair in cells.windows(2) {
                if contains_any(&pair[0].to_lowercase(), rules.pair_labels) {
                    found.extend(accept_growth(&pair[1]));
                }
            }
        }
    }

    if let Some(sel) = rules.text_selector.and_then(selector) {
        for element in document.select(&sel) {
            let text = element_text(element);
            if text.len() > MAX_LABELLED_TEXT {
                continue;
            }
            let lower = text.to_lowercase();
            let labelled = contains_any(&lower, rules.text_keywords)
                && (rules.text_context.is_empty() || contains_any(&lower, rules.text_context));
            if labelled {
                found.extend(accept_growth(&text));
            }
        }
    }

    if rules.scan_scripts {
        if let Some(script) = selector("script") {
            for element in document.select(&script) {
                let content = element.text().collect::<String>();
                if content.contains("growth") {
                    found.extend(extract_json_growth(&content).filter(|v| *v > 0.0 && *v < 1.0));
                }
            }
        }
    }

    average(&found)
}

// ============================================================================
// Fundamentals pages
// ============================================================================

fn app_state(document: &Html) -> Option<Value> {
    let script = selector("script")?;
    document.select(&script).find_map(|element| {
        let content = element.text().collect::<String>();
        if !content.contains("root.App.main") {
            return None;
        }
        let captures = APP_STATE.captures(&content)?;
        serde_json::from_str(captures.get(1)?.as_str()).ok()
    })
}

fn quote_summary_number(state: &Value, path: &str) -> Option<f64> {
    state
        .pointer(&format!("/context/dispatcher/stores/QuoteSummaryStore{path}"))
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
}

fn quote_summary_text(state: &Value, path: &str) -> Option<String> {
    state
        .pointer(&format!("/context/dispatcher/stores/QuoteSummaryStore{path}"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

/// Figures found on a key-statistics page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyStatistics {
    pub pe_ratio: Option<f64>,
    pub eps: Option<f64>,
    pub market_cap: Option<f64>,
    pub book_value: Option<f64>,
}

pub fn extract_key_statistics(html: &str) -> KeyStatistics {
    let document = Html::parse_document(html);
    let mut stats = KeyStatistics::default();

    if let (Some(tr), Some(cell)) = (selector("tr"), selector("td, th")) {
        for row in document.select(&tr) {
            let cells: Vec<String> = row.select(&cell).map(element_text).collect();
            let (Some(label), Some(value)) = (cells.first(), cells.last()) else {
                continue;
            };
            if cells.len() < 2 {
                continue;
            }
            let label = label.to_lowercase();

            if label.contains("trailing p/e") || label.contains("pe ratio") {
                if let Some(pe) = parse_plain_number(value).filter(|pe| *pe > 0.0) {
                    stats.pe_ratio = Some(pe);
                }
            } else if label.contains("diluted eps") || label.contains("eps (ttm)") {
                if let Some(eps) = parse_plain_number(value) {
                    stats.eps = Some(eps);
                }
            } else if label.contains("market cap") {
                if let Some(cap) = parse_market_cap(value) {
                    stats.market_cap = Some(cap);
                }
            } else if label.contains("book value per share") {
                if let Some(book) = parse_plain_number(value).filter(|book| *book > 0.0) {
                    stats.book_value = Some(book);
                }
            }
        }
    }

    if let Some(state) = app_state(&document) {
        let pe = quote_summary_number(&state, "/defaultKeyStatistics/trailingPE/raw")
            .or_else(|| quote_summary_number(&state, "/summaryDetail/trailingPE/raw"));
        stats.pe_ratio = stats.pe_ratio.or(pe.filter(|pe| *pe > 0.0));
        stats.eps = stats
            .eps
            .or_else(|| quote_summary_number(&state, "/defaultKeyStatistics/trailingEps/raw"));
        stats.book_value = stats.book_value.or_else(|| {
            quote_summary_number(&state, "/defaultKeyStatistics/bookValue/raw")
                .filter(|book| *book > 0.0)
        });
        stats.market_cap = stats.market_cap.or_else(|| {
            quote_summary_number(&state, "/summaryDetail/marketCap/raw").filter(|cap| *cap > 0.0)
        });
    }

    stats
}

/// Most recent free cash flow total from a financials page.
pub fn extract_free_cash_flow(html: &str) -> Option<f64> {
    let document = Html::parse_document(html);

    if let (Some(row), Some(col)) = (
        selector("div[data-test='fin-row']"),
        selector("div[data-test='fin-col']"),
    ) {
        for element in document.select(&row) {
            let columns: Vec<String> = element.select(&col).map(element_text).collect();
            let Some((label, values)) = columns.split_first() else {
                continue;
            };
            let label = label.to_lowercase();
            if label.contains("free cash flow") || label.contains("operating cash flow") {
                let value = values
                    .iter()
                    .filter_map(|value| parse_financial_value(value))
                    .find(|value| *value != 0.0);
                if value.is_some() {
                    return value;
                }
            }
        }
    }

    app_state(&document).and_then(|state| {
        quote_summary_number(
            &state,
            "/cashflowStatementHistory/cashflowStatements/0/freeCashFlow/raw",
        )
        .filter(|value| *value != 0.0)
    })
}

/// Company profile fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyProfile {
    pub sector: Option<String>,
    pub company_name: Option<String>,
}

pub fn extract_profile(html: &str) -> CompanyProfile {
    let document = Html::parse_document(html);
    let mut profile = CompanyProfile::default();

    let first_text = |css: &str| {
        selector(css).and_then(|sel| {
            document
                .select(&sel)
                .map(element_text)
                .find(|text| !text.is_empty())
        })
    };

    profile.sector = first_text("span[data-test='SECTOR']");
    profile.company_name = first_text("h1[data-test='qsp-overview-entity-name']");

    if profile.sector.is_none() {
        if let Some(p) = selector("p") {
            profile.sector = document.select(&p).map(element_text).find_map(|text| {
                let lower = text.to_lowercase();
                let start = lower.find("sector:")? + "sector:".len();
                let rest = text.get(start..)?;
                let sector = rest.split(['\n', ':']).next()?.trim();
                let sector = sector
                    .strip_suffix("Industry")
                    .unwrap_or(sector)
                    .trim()
                    .to_owned();
                (!sector.is_empty()).then_some(sector)
            });
        }
    }

    if let Some(state) = app_state(&document) {
        profile.sector = profile
            .sector
            .or_else(|| quote_summary_text(&state, "/assetProfile/sector"));
        profile.company_name = profile
            .company_name
            .or_else(|| quote_summary_text(&state, "/price/longName"));
    }

    profile
}
