//! Field & table extraction over normalised page text.
//!
//! Two passes run over every page:
//!
//! - **Summary pass**: label regexes locate the portfolio total, client
//!   identifier and statement date; the value is read from a short window of
//!   tokens following the label (spilling onto the next line when the label
//!   stands alone).
//! - **Table pass**: every line that looks like a holdings row is split into
//!   security name, ISIN, quantity and market value. Rows that cannot be read
//!   become [`RowError`]s; they never abort the page.
//!
//! Merging fragments across pages is the aggregator's job.

use super::isin::{isin_shape_of, repair_isin};
use super::normalize::{has_digit, is_currency_code, is_table_row};
use super::numbers::{parse_amount, split_amount};
use crate::error::RowError;
use crate::output::Holding;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

/// Tokens inspected after a summary label.
const LABEL_WINDOW: usize = 6;

static RE_TOTAL_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:total\s+portfolio\s+value|total\s+portfolio|total\s+value|portfolio\s+value|total\s+assets|net\s+asset\s+value|total\s+net\s+assets|grand\s+total)\b",
    )
    .unwrap()
});

/// `portfolio` only counts with an explicit id marker; bare it is part of
/// total labels ("Total Portfolio 125,000.00").
static RE_CLIENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:client|account|customer|depot)\s*(?:id|no\.?|number|nr\.?|#)?|portfolio\s*(?:id|no\.?|number|nr\.?|#|:))\s*[:#]?\s*([A-Z0-9][A-Z0-9\-/.]*)",
    )
    .unwrap()
});

static RE_DATE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:statement\s+date|valuation\s+date|as\s+of|as\s+at|date)\b").unwrap()
});

static RE_DATE_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{4})$").unwrap());
static RE_DATE_ISO: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").unwrap());
static RE_DATE_SLASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{4})$").unwrap());
static RE_DATE_NAMED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[-\s]([A-Za-z]{3,})\.?[-\s](\d{4})$").unwrap());

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Summary fields found on one page. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryFragment {
    pub total_value: Option<Decimal>,
    /// Currency printed next to the total label.
    pub currency: Option<String>,
    /// First ISO code seen anywhere on the page.
    pub page_currency: Option<String>,
    pub client_id: Option<String>,
    pub statement_date: Option<NaiveDate>,
}

impl SummaryFragment {
    pub fn is_empty(&self) -> bool {
        *self == SummaryFragment::default()
    }
}

/// Everything extracted from one page.
#[derive(Debug, Clone, Default)]
pub struct PageExtraction {
    /// 1-based page index.
    pub page: usize,
    pub summary: SummaryFragment,
    pub holdings: Vec<Holding>,
    pub row_errors: Vec<RowError>,
}

/// Run both passes over the normalised text of `page`.
///
/// `confidence` is the backend's page confidence; it is copied onto every
/// holding read from the page.
pub fn extract_page(page: usize, text: &str, confidence: Option<f32>) -> PageExtraction {
    let summary = extract_summary(text);
    let (holdings, row_errors) = extract_holdings(page, text, confidence);
    PageExtraction {
        page,
        summary,
        holdings,
        row_errors,
    }
}

// ── Summary pass ────────────────────────────────────────────────────────────

/// Locate summary fields. The first match of each field on the page wins.
pub fn extract_summary(text: &str) -> SummaryFragment {
    let lines: Vec<&str> = text.lines().collect();
    let mut frag = SummaryFragment::default();

    for (i, line) in lines.iter().enumerate() {
        if frag.page_currency.is_none() {
            frag.page_currency = line.split_whitespace().find_map(currency_in);
        }

        if frag.total_value.is_none() {
            if let Some(m) = RE_TOTAL_LABEL.find(line) {
                let window = label_window(&line[m.end()..], lines.get(i + 1).copied());
                if let Some(total) = window.iter().find_map(|t| total_amount(t)) {
                    frag.total_value = Some(total);
                    frag.currency = line
                        .split_whitespace()
                        .chain(window.iter().copied())
                        .find_map(currency_in);
                }
            }
        }

        if frag.client_id.is_none() {
            frag.client_id = RE_CLIENT
                .captures_iter(line)
                .filter_map(|c| c.get(1))
                .filter(|m| !is_amount_prefix(line, m.start(), m.end()))
                .map(|m| m.as_str().trim_end_matches(['.', '/', '-']))
                .find(|id| id.len() >= 3 && has_digit(id))
                .map(str::to_string);
        }

        if frag.statement_date.is_none() {
            for m in RE_DATE_LABEL.find_iter(line) {
                let window = label_window(&line[m.end()..], None);
                if let Some(date) = parse_date_window(&window) {
                    frag.statement_date = Some(date);
                    break;
                }
            }
        }
    }
    frag
}

/// Up to [`LABEL_WINDOW`] tokens after a label. A label alone on its line
/// borrows from the next line, unless that line is a holdings row.
fn label_window<'a>(rest: &'a str, next_line: Option<&'a str>) -> Vec<&'a str> {
    let mut tokens: Vec<&str> = rest
        .split_whitespace()
        .map(|t| t.trim_start_matches(':'))
        .filter(|t| !t.is_empty())
        .collect();
    if !tokens.iter().any(|t| has_digit(t)) {
        if let Some(next) = next_line.filter(|n| !is_holdings_candidate(n)) {
            tokens.extend(next.split_whitespace());
        }
    }
    tokens.truncate(LABEL_WINDOW);
    tokens
}

/// True when the capture at `start..end` stops inside a grouped amount
/// (`125` out of `125,000.00`).
fn is_amount_prefix(line: &str, start: usize, end: usize) -> bool {
    let token_end = line[start..]
        .find(char::is_whitespace)
        .map_or(line.len(), |i| start + i);
    token_end > end && split_amount(&line[start..token_end]).is_some()
}

/// A total is a non-negative, non-percentage amount.
fn total_amount(tok: &str) -> Option<Decimal> {
    let parts = split_amount(tok)?;
    if parts.percent || parts.negative {
        return None;
    }
    parts.to_decimal()
}

fn currency_in(tok: &str) -> Option<String> {
    let code = tok.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    is_currency_code(code).then(|| code.to_string())
}

fn parse_date_window(window: &[&str]) -> Option<NaiveDate> {
    for (i, tok) in window.iter().enumerate() {
        let tok = tok.trim_end_matches([',', ';']);
        if let Some(d) = parse_date_token(tok) {
            return Some(d);
        }
        if let Some(three) = window.get(i..i + 3) {
            if let Some(d) = parse_named_date(three) {
                return Some(d);
            }
        }
    }
    None
}

/// Numeric dates in one token: `30.09.2025`, `2025-09-30`, `30/09/2025`,
/// `30-Sep-2025`. Slash dates read day-first unless the first field cannot
/// be a day-of-month paired with a valid month.
fn parse_date_token(tok: &str) -> Option<NaiveDate> {
    let num = |s: &str| s.parse::<u32>().ok();
    if let Some(c) = RE_DATE_DOT.captures(tok) {
        return NaiveDate::from_ymd_opt(c[3].parse().ok()?, num(&c[2])?, num(&c[1])?);
    }
    if let Some(c) = RE_DATE_ISO.captures(tok) {
        return NaiveDate::from_ymd_opt(c[1].parse().ok()?, num(&c[2])?, num(&c[3])?);
    }
    if let Some(c) = RE_DATE_SLASH.captures(tok) {
        let (a, b) = (num(&c[1])?, num(&c[2])?);
        let year = c[3].parse().ok()?;
        let (day, month) = if b > 12 && a <= 12 { (b, a) } else { (a, b) };
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    if let Some(c) = RE_DATE_NAMED.captures(tok) {
        return NaiveDate::from_ymd_opt(c[3].parse().ok()?, month_number(&c[2])?, num(&c[1])?);
    }
    None
}

/// `30 September 2025` or `September 30, 2025` spread over three tokens.
fn parse_named_date(tokens: &[&str]) -> Option<NaiveDate> {
    let clean = |s: &str| s.trim_end_matches(['.', ',']).to_string();
    let (a, b, c) = (clean(tokens[0]), clean(tokens[1]), clean(tokens[2]));
    if c.len() != 4 {
        return None;
    }
    let year: i32 = c.parse().ok()?;
    if let (Ok(day), Some(month)) = (a.parse::<u32>(), month_number(&b)) {
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    if let (Some(month), Ok(day)) = (month_number(&a), b.parse::<u32>()) {
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    None
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    if lower.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| m.starts_with(&lower))
        .map(|i| i as u32 + 1)
}

// ── Table pass ──────────────────────────────────────────────────────────────

/// Parse every candidate row on the page, in reading order.
pub fn extract_holdings(
    page: usize,
    text: &str,
    confidence: Option<f32>,
) -> (Vec<Holding>, Vec<RowError>) {
    let mut holdings = Vec::new();
    let mut errors = Vec::new();
    for line in text.lines().filter(|l| is_holdings_candidate(l)) {
        match parse_row(page, line, confidence) {
            Ok(h) => holdings.push(h),
            Err(e) => errors.push(e),
        }
    }
    (holdings, errors)
}

/// A tabular-looking line, or any line carrying an ISIN-shaped token.
fn is_holdings_candidate(line: &str) -> bool {
    is_table_row(line)
        || line
            .split_whitespace()
            .any(|t| isin_shape_of(isin_candidate(t)).is_some())
}

fn isin_candidate(tok: &str) -> &str {
    tok.trim_matches(|c: char| !c.is_ascii_alphanumeric())
}

/// Split one row into a [`Holding`].
///
/// Layout: `<name tokens> <ISIN> … <amount> … <amount>`. The two rightmost
/// amounts after the ISIN are quantity and market value; the larger
/// magnitude is the market value, and on a tie the rightmost one is.
/// Percentages and word tokens (currency codes, units) are skipped.
pub fn parse_row(page: usize, line: &str, confidence: Option<f32>) -> Result<Holding, RowError> {
    let row_err = |reason: String| RowError::RowParse {
        page,
        row: line.to_string(),
        reason,
    };
    let num_err = |reason: String| RowError::NumericParse {
        page,
        row: line.to_string(),
        reason,
    };

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(isin_idx) = tokens
        .iter()
        .position(|t| isin_shape_of(isin_candidate(t)).is_some())
    else {
        return Err(row_err("no ISIN".into()));
    };
    let printed = isin_candidate(tokens[isin_idx]);
    let Some(isin) = repair_isin(printed) else {
        return Err(row_err(format!("ISIN {printed} fails its check digit")));
    };

    let name = tokens[..isin_idx]
        .join(" ")
        .trim_end_matches([',', ';', ':', '-', '|'])
        .trim()
        .to_string();
    if name.is_empty() {
        return Err(row_err("missing security name".into()));
    }

    let amounts: Vec<&str> = tokens[isin_idx + 1..]
        .iter()
        .copied()
        .filter(|t| has_digit(t) && !t.ends_with('%'))
        .collect();
    if amounts.len() < 2 {
        return Err(num_err(format!(
            "expected quantity and market value, found {} amount(s)",
            amounts.len()
        )));
    }

    let (a_tok, b_tok) = (amounts[amounts.len() - 2], amounts[amounts.len() - 1]);
    let a = parse_amount(a_tok).ok_or_else(|| num_err(format!("'{a_tok}' is not a number")))?;
    let b = parse_amount(b_tok).ok_or_else(|| num_err(format!("'{b_tok}' is not a number")))?;
    if a.is_sign_negative() || b.is_sign_negative() {
        return Err(num_err("negative quantity or market value".into()));
    }

    let (quantity, market_value) = if a.abs() > b.abs() { (b, a) } else { (a, b) };

    Ok(Holding {
        security_name: name,
        isin,
        quantity,
        market_value,
        source_page: page,
        confidence,
    })
}
