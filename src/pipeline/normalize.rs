//! Text normalisation: raw recognised text → canonical text for parsing.
//!
//! OCR backends disagree on whitespace, currency notation and number
//! formatting, and they occasionally merge two table rows onto one line or
//! break one row over two. [`normalize`] smooths all of that so the
//! extractor can work on whitespace-separated tokens, one row per line.
//!
//! Passes, in order:
//! 1. Strip invisible Unicode and normalise line endings
//! 2. Collapse Unicode whitespace inside each line to single spaces
//! 3. Map currency symbols to ISO 4217 codes (`€1.234,56` → `EUR 1,234.56`)
//! 4. Rewrite amounts in canonical US style (see [`super::numbers`])
//! 5. Split lines carrying two holdings rows
//! 6. Join a security-name line with the ISIN row that follows it
//! 7. Collapse runs of blank lines
//!
//! The whole function is idempotent: `normalize(normalize(x)) == normalize(x)`.

use super::isin::has_isin_shape;
use super::numbers::canonicalize_amount;

/// ISO 4217 codes recognised on statements.
pub const ISO_CURRENCIES: &[&str] = &[
    "USD", "EUR", "CHF", "GBP", "JPY", "CAD", "AUD", "SEK", "NOK", "DKK", "HKD", "SGD", "CNY",
    "INR", "KRW", "NZD", "ZAR",
];

/// Currency symbols and their ISO codes. Longer symbols come first so that
/// `US$` wins over `$`.
const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("SFr.", "CHF"),
    ("US$", "USD"),
    ("HK$", "HKD"),
    ("C$", "CAD"),
    ("A$", "AUD"),
    ("S$", "SGD"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
    ("₹", "INR"),
    ("₩", "KRW"),
    ("$", "USD"),
];

/// Leading words that never start a holdings row.
const NON_ROW_LABELS: &[&str] = &[
    "total",
    "subtotal",
    "page",
    "date",
    "statement",
    "client",
    "account",
    "portfolio",
    "balance",
    "summary",
    "valuation",
];

/// Normalise raw recognised text.
pub fn normalize(raw: &str) -> String {
    let s = remove_invisible_chars(raw);
    let s = normalise_line_endings(&s);

    let lines: Vec<String> = s
        .lines()
        .map(|line| {
            line.split_whitespace()
                .flat_map(split_currency_symbol)
                .map(|tok| normalise_amount_token(&tok))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    let lines = split_merged_rows(lines);
    let lines = join_split_rows(lines);
    collapse_blank_lines(lines)
}

/// Tabular-row heuristic: a security-name-like first token followed by at
/// least three tokens that carry digits (identifier, quantity, value…).
pub fn is_table_row(line: &str) -> bool {
    let mut tokens = line.split_whitespace();
    let Some(first) = tokens.next() else {
        return false;
    };
    if !is_name_like(first) {
        return false;
    }
    if NON_ROW_LABELS.contains(&first.to_lowercase().trim_end_matches(':')) {
        return false;
    }
    tokens.filter(|t| has_digit(t)).count() >= 3
}

/// True for an ISO code the extractor should treat as a currency.
pub fn is_currency_code(tok: &str) -> bool {
    ISO_CURRENCIES.contains(&tok)
}

pub(crate) fn has_digit(tok: &str) -> bool {
    tok.chars().any(|c| c.is_ascii_digit())
}

fn is_name_like(tok: &str) -> bool {
    tok.chars().next().is_some_and(char::is_alphabetic) && !has_digit(tok)
}

// ── Pass 1: invisible characters and line endings ───────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Pass 3: currency symbols ────────────────────────────────────────────────

fn split_currency_symbol(tok: &str) -> Vec<String> {
    for (sym, code) in CURRENCY_SYMBOLS {
        if tok == *sym {
            return vec![(*code).to_string()];
        }
        if let Some(rest) = tok.strip_prefix(sym) {
            if rest.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '(') {
                return vec![(*code).to_string(), rest.to_string()];
            }
        }
        if let Some(rest) = tok.strip_suffix(sym) {
            if rest.ends_with(|c: char| c.is_ascii_digit()) {
                return vec![rest.to_string(), (*code).to_string()];
            }
        }
    }
    vec![tok.to_string()]
}

// ── Pass 4: amounts ─────────────────────────────────────────────────────────

fn normalise_amount_token(tok: &str) -> String {
    // Bare digit runs stay verbatim: they may be account numbers with
    // significant leading zeros.
    if tok.chars().all(|c| c.is_ascii_digit()) {
        return tok.to_string();
    }
    canonicalize_amount(tok).unwrap_or_else(|| tok.to_string())
}

// ── Pass 5: one line, two rows ──────────────────────────────────────────────

/// "A Corp US… 10 1,000.00 B Corp DE… 5 500.00" → two lines.
///
/// The cut goes before the first name-like token that follows the previous
/// row's ISIN; amounts, percentages and currency codes stay with that row.
fn split_merged_rows(lines: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let tokens: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
        let isin_positions: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| has_isin_shape(t))
            .map(|(i, _)| i)
            .collect();
        if isin_positions.len() < 2 {
            out.push(line);
            continue;
        }

        let mut cuts = Vec::new();
        for pair in isin_positions.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            let cut = (prev + 1..next).find(|&i| is_name_like(tokens[i]) && !is_currency_code(tokens[i]));
            if let Some(c) = cut {
                // Only cut when the previous row kept at least one amount.
                if (prev + 1..c).any(|i| has_digit(tokens[i])) {
                    cuts.push(c);
                }
            }
        }
        if cuts.is_empty() {
            out.push(line);
            continue;
        }

        let mut start = 0;
        for c in cuts {
            out.push(tokens[start..c].join(" "));
            start = c;
        }
        out.push(tokens[start..].join(" "));
    }
    out
}

// ── Pass 6: one row, two lines ──────────────────────────────────────────────

/// "Apple Inc" / "US0378331005 100 15,000.00" → one line.
fn join_split_rows(lines: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        if let Some(next) = lines.get(i + 1) {
            if is_name_only(line) && is_nameless_row(next) {
                out.push(format!("{line} {next}"));
                i += 2;
                continue;
            }
        }
        out.push(line.clone());
        i += 1;
    }
    out
}

fn is_name_only(line: &str) -> bool {
    let mut tokens = line.split(' ').filter(|t| !t.is_empty()).peekable();
    let Some(&first) = tokens.peek() else {
        return false;
    };
    if NON_ROW_LABELS.contains(&first.to_lowercase().trim_end_matches(':')) {
        return false;
    }
    is_name_like(first) && tokens.all(|t| !has_digit(t))
}

fn is_nameless_row(line: &str) -> bool {
    let tokens: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
    match tokens.split_first() {
        Some((first, rest)) => {
            has_isin_shape(first)
                && !rest.iter().any(|t| has_isin_shape(t))
                && rest.iter().filter(|t| has_digit(t)).count() >= 2
        }
        None => false,
    }
}

// ── Pass 7: blank lines ─────────────────────────────────────────────────────

fn collapse_blank_lines(lines: Vec<String>) -> String {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.is_empty() && out.last().is_none_or(|l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
