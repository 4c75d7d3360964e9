//! Locale-ambiguous amount parsing.
//!
//! Statements print the same value as `1,234.56`, `1.234,56` or `1'234.56`.
//! OCR output carries no locale, so the convention is inferred per token:
//!
//! 1. Only digits and the separators `.` `,` `'` `’` are accepted, with a
//!    digit at both ends and no two separators in a row.
//! 2. **Two separator kinds** (`1.234,56`, `1'234.56`): the rightmost
//!    separator is the decimal point and must occur once; the other kind
//!    groups thousands.
//! 3. **One kind, repeated** (`1.234.567`): grouping.
//! 4. **One kind, once**: apostrophes always group. Otherwise a trailing run
//!    of anything but exactly three digits is a decimal part (`15,00`,
//!    `0.5`). Exactly three trailing digits is the ambiguous case: it is a
//!    decimal when the integer part is `0` or longer than three digits, and
//!    a thousands group otherwise (`1,500` and `1.500` both read 1500,
//!    the more common pattern on statements). A zero-padded integer part
//!    (`0001.500`) has no stable reading and is rejected.
//!
//! Grouped parts must look like real digit grouping: a first group of 1–3
//! digits without a leading zero, then groups of exactly three. Anything
//! else (dates such as `30.09.2025`, Indian grouping) is rejected and left
//! to the caller untouched.
//!
//! The canonical rendering is US style (`1,234,567.89`). It is a fixed
//! point of [`canonicalize_amount`], which keeps text normalisation
//! idempotent.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

static RE_AMOUNT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<open>\()?(?P<sign>[+\-−])?(?P<core>\d(?:[\d.,'’]*\d)?)(?P<close>\))?(?P<pct>%)?$")
        .unwrap()
});

/// A parsed amount token split into its sign and digit runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountParts {
    pub negative: bool,
    /// Integer digits without grouping and without leading zeros ("0" for zero).
    pub int_digits: String,
    /// Fraction digits exactly as printed (may be empty).
    pub frac_digits: String,
    pub percent: bool,
}

impl AmountParts {
    /// US-style rendering: `,` groups thousands, `.` marks the decimals.
    pub fn canonical(&self) -> String {
        let mut out = String::with_capacity(self.int_digits.len() + self.frac_digits.len() + 4);
        if self.negative {
            out.push('-');
        }
        let len = self.int_digits.len();
        for (i, ch) in self.int_digits.chars().enumerate() {
            if i > 0 && (len - i) % 3 == 0 {
                out.push(',');
            }
            out.push(ch);
        }
        if !self.frac_digits.is_empty() {
            out.push('.');
            out.push_str(&self.frac_digits);
        }
        if self.percent {
            out.push('%');
        }
        out
    }

    pub fn to_decimal(&self) -> Option<Decimal> {
        let mut s = String::with_capacity(self.int_digits.len() + self.frac_digits.len() + 2);
        if self.negative {
            s.push('-');
        }
        s.push_str(&self.int_digits);
        if !self.frac_digits.is_empty() {
            s.push('.');
            s.push_str(&self.frac_digits);
        }
        Decimal::from_str(&s).ok()
    }
}

/// Split a single whitespace-free token into amount parts.
///
/// Returns `None` when the token is not an amount under the rules above.
pub fn split_amount(token: &str) -> Option<AmountParts> {
    let caps = RE_AMOUNT_TOKEN.captures(token)?;
    let open = caps.name("open").is_some();
    let close = caps.name("close").is_some();
    if open != close {
        return None;
    }
    let negative = open
        || caps
            .name("sign")
            .is_some_and(|m| m.as_str() == "-" || m.as_str() == "−");
    let (int_raw, frac) = split_core(&caps["core"])?;

    let trimmed = int_raw.trim_start_matches('0');
    let int_digits = if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    };

    Some(AmountParts {
        negative,
        int_digits,
        frac_digits: frac,
        percent: caps.name("pct").is_some(),
    })
}

/// Rewrite an amount token into canonical form, or `None` if it is not one.
pub fn canonicalize_amount(token: &str) -> Option<String> {
    split_amount(token).map(|p| p.canonical())
}

/// Parse an amount token (any supported convention) into a decimal.
pub fn parse_amount(token: &str) -> Option<Decimal> {
    split_amount(token)?.to_decimal()
}

fn is_sep(c: char) -> bool {
    matches!(c, '.' | ',' | '\'' | '’')
}

fn is_apostrophe(c: char) -> bool {
    c == '\'' || c == '’'
}

/// Returns `(integer digits, fraction digits)` for the separator-bearing core.
fn split_core(core: &str) -> Option<(String, String)> {
    let seps: Vec<(usize, char)> = core.char_indices().filter(|(_, c)| is_sep(*c)).collect();
    if seps.is_empty() {
        return Some((core.to_string(), String::new()));
    }

    // No doubled separators ("1,,234").
    let chars: Vec<char> = core.chars().collect();
    if chars.windows(2).any(|w| is_sep(w[0]) && is_sep(w[1])) {
        return None;
    }

    // Apostrophe variants count as one kind.
    let kind = |c: char| if is_apostrophe(c) { '\'' } else { c };
    let mut kinds: Vec<char> = seps.iter().map(|(_, c)| kind(*c)).collect();
    kinds.sort_unstable();
    kinds.dedup();

    match kinds.len() {
        1 => {
            let sep = kinds[0];
            if seps.len() > 1 || sep == '\'' {
                let int = ungroup(core, |c| kind(c) == sep)?;
                return Some((int, String::new()));
            }
            let (pos, _) = seps[0];
            let int_part = &core[..pos];
            let frac_part = &core[pos + 1..];
            let frac_len = frac_part.chars().count();
            if frac_len != 3 {
                return Some((int_part.to_string(), frac_part.to_string()));
            }
            // Zero-padded integers would canonicalise into the other reading.
            if int_part.trim_start_matches('0').is_empty() {
                return Some(("0".to_string(), frac_part.to_string()));
            }
            if int_part.starts_with('0') {
                return None;
            }
            if int_part.len() > 3 {
                return Some((int_part.to_string(), frac_part.to_string()));
            }
            Some((format!("{int_part}{frac_part}"), String::new()))
        }
        2 => {
            let (dec_pos, dec_char) = *seps.last()?;
            let dec_kind = kind(dec_char);
            if seps.iter().filter(|(_, c)| kind(*c) == dec_kind).count() != 1 {
                return None;
            }
            let int_part = &core[..dec_pos];
            let frac_part = &core[dec_pos + dec_char.len_utf8()..];
            let int = ungroup(int_part, |c| is_sep(c) && kind(c) != dec_kind)?;
            Some((int, frac_part.to_string()))
        }
        _ => None,
    }
}

/// Strip grouping separators after validating the group widths.
fn ungroup(s: &str, is_group_sep: impl Fn(char) -> bool) -> Option<String> {
    let groups: Vec<&str> = s.split(|c: char| is_group_sep(c)).collect();
    let first = groups.first()?;
    if first.is_empty() || first.len() > 3 || first.starts_with('0') {
        return None;
    }
    if groups[1..].iter().any(|g| g.len() != 3) {
        return None;
    }
    if groups.iter().any(|g| !g.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }
    Some(groups.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn us_and_european_grouping() {
        assert_eq!(parse_amount("1,234,567.89"), Some(dec!(1234567.89)));
        assert_eq!(parse_amount("1.234.567,89"), Some(dec!(1234567.89)));
        assert_eq!(parse_amount("1'234'567.89"), Some(dec!(1234567.89)));
        assert_eq!(parse_amount("1’234.50"), Some(dec!(1234.50)));
    }

    #[test]
    fn single_separator_heuristics() {
        assert_eq!(parse_amount("15,00"), Some(dec!(15.00)));
        assert_eq!(parse_amount("0.5"), Some(dec!(0.5)));
        assert_eq!(parse_amount("1,500"), Some(dec!(1500)));
        assert_eq!(parse_amount("1.500"), Some(dec!(1500)));
        assert_eq!(parse_amount("0.125"), Some(dec!(0.125)));
        assert_eq!(parse_amount("1234.567"), Some(dec!(1234.567)));
        assert_eq!(parse_amount("1,2345"), Some(dec!(1.2345)));
    }

    #[test]
    fn signs_and_brackets() {
        assert_eq!(parse_amount("-1,234.00"), Some(dec!(-1234.00)));
        assert_eq!(parse_amount("(1,234.00)"), Some(dec!(-1234.00)));
        assert_eq!(parse_amount("+12"), Some(dec!(12)));
        assert_eq!(parse_amount("(12"), None);
    }

    #[test]
    fn rejects_non_amounts() {
        assert_eq!(parse_amount("30.09.2025"), None);
        assert_eq!(parse_amount("1,23,456"), None);
        assert_eq!(parse_amount("1,,234"), None);
        assert_eq!(parse_amount("1.234.5"), None);
        assert_eq!(parse_amount("15,0O0.00"), None);
        assert_eq!(parse_amount("US0378331005"), None);
        assert_eq!(parse_amount("1,234.56.78"), None);
    }

    #[test]
    fn padded_integer_with_three_decimals_is_rejected() {
        assert_eq!(parse_amount("0001.500"), None);
        assert_eq!(parse_amount("01,500"), None);
        assert_eq!(parse_amount("000.500"), Some(dec!(0.500)));
        assert_eq!(parse_amount("0001.50"), Some(dec!(1.50)));
    }

    #[test]
    fn canonical_form() {
        assert_eq!(canonicalize_amount("1.234.567,89").as_deref(), Some("1,234,567.89"));
        assert_eq!(canonicalize_amount("1234567.89").as_deref(), Some("1,234,567.89"));
        assert_eq!(canonicalize_amount("15,00").as_deref(), Some("15.00"));
        assert_eq!(canonicalize_amount("(50)").as_deref(), Some("-50"));
        assert_eq!(canonicalize_amount("12,5%").as_deref(), Some("12.5%"));
        assert_eq!(canonicalize_amount("007").as_deref(), Some("7"));
    }

    #[test]
    fn canonical_form_is_fixed_point() {
        let samples = [
            "1.234.567,89", "1,234.56", "1'234", "15,00", "0,125", "1.500", "100",
            "1234.567", "(1.234,50)", "-0.5", "12,5%", "1,2345", "999.999,999",
            "000.500", "0001.50",
        ];
        for s in samples {
            let once = canonicalize_amount(s).unwrap();
            let twice = canonicalize_amount(&once).unwrap();
            assert_eq!(once, twice, "not a fixed point for {s}");
            assert_eq!(parse_amount(s), parse_amount(&once), "value changed for {s}");
        }
    }
}
