//! ISIN shape and check-digit validation (ISO 6166).
//!
//! An ISIN is two country letters, nine alphanumerics and one check digit.
//! The check digit is a Luhn checksum over the code with every letter
//! expanded to its two-digit value (`A` = 10 … `Z` = 35).

/// OCR confusions inside an ISIN: the letter read and the digit printed.
const LETTER_DIGIT: [(u8, u8); 5] = [(b'O', b'0'), (b'I', b'1'), (b'L', b'1'), (b'S', b'5'), (b'B', b'8')];

/// National-code variants tried at most; beyond this the token is left alone.
const MAX_AMBIGUOUS: usize = 4;

/// True when `s` has the ISIN shape (2 letters, 9 alphanumerics, 1 digit).
///
/// Only uppercase ASCII is accepted; raw OCR tokens go through
/// [`isin_shape_of`] instead.
pub fn has_isin_shape(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 12
        && b[..2].iter().all(u8::is_ascii_uppercase)
        && b[2..11]
            .iter()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && b[11].is_ascii_digit()
}

/// True when `s` is shaped like an ISIN and its check digit is correct.
pub fn is_valid_isin(s: &str) -> bool {
    has_isin_shape(s) && luhn_ok(s)
}

/// Uppercase an OCR token and fix the positions whose class is fixed: the
/// country code must be letters and the check position a digit.
///
/// Returns the candidate when it then has the ISIN shape. Tokens with fewer
/// than two digits never qualify, so twelve-letter words are not read as
/// codes.
pub fn isin_shape_of(tok: &str) -> Option<String> {
    if tok.len() != 12 || tok.bytes().filter(u8::is_ascii_digit).count() < 2 {
        return None;
    }
    let mut b = tok.to_ascii_uppercase().into_bytes();
    for c in &mut b[..2] {
        if let Some(&(letter, _)) = LETTER_DIGIT.iter().find(|(_, d)| d == c) {
            *c = letter;
        }
    }
    if let Some(&(_, digit)) = LETTER_DIGIT.iter().find(|(l, _)| *l == b[11]) {
        b[11] = digit;
    }
    let candidate = String::from_utf8(b).ok()?;
    has_isin_shape(&candidate).then_some(candidate)
}

/// Resolve an OCR token to a checksum-valid ISIN.
///
/// A token that validates after [`isin_shape_of`] is returned as is.
/// Otherwise `O`, `I` and `L` in the national code are tried as the digits
/// they resemble, and a repair is accepted only when exactly one variant
/// passes the check digit. Printed digits are never changed.
pub fn repair_isin(tok: &str) -> Option<String> {
    let candidate = isin_shape_of(tok)?;
    if luhn_ok(&candidate) {
        return Some(candidate);
    }

    let bytes = candidate.as_bytes();
    let ambiguous: Vec<(usize, u8)> = (2..11)
        .filter(|&i| matches!(bytes[i], b'O' | b'I' | b'L'))
        .filter_map(|i| {
            LETTER_DIGIT
                .iter()
                .find(|(l, _)| *l == bytes[i])
                .map(|&(_, d)| (i, d))
        })
        .collect();
    if ambiguous.is_empty() || ambiguous.len() > MAX_AMBIGUOUS {
        return None;
    }

    let mut found = None;
    for mask in 1u32..(1 << ambiguous.len()) {
        let mut variant = bytes.to_vec();
        for (bit, &(i, digit)) in ambiguous.iter().enumerate() {
            if mask & (1 << bit) != 0 {
                variant[i] = digit;
            }
        }
        let variant = String::from_utf8(variant).ok()?;
        if luhn_ok(&variant) {
            if found.is_some() {
                return None;
            }
            found = Some(variant);
        }
    }
    found
}

fn luhn_ok(s: &str) -> bool {
    let mut digits: Vec<u32> = Vec::with_capacity(24);
    for c in s.chars() {
        match c.to_digit(36) {
            Some(v) if v >= 10 => {
                digits.push(v / 10);
                digits.push(v % 10);
            }
            Some(v) => digits.push(v),
            None => return false,
        }
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &[&str] = &[
        "US0378331005",
        "US5949181045",
        "DE0005140008",
        "CH0012032048",
        "GB0002634946",
        "IE00B4L5Y983",
        "US912828U816",
        "XS2314659447",
        "LU0274208692",
        "DE000BAY0017",
        "US88160R1014",
    ];

    #[test]
    fn accepts_known_isins() {
        for isin in VALID {
            assert!(is_valid_isin(isin), "{isin} should be valid");
        }
    }

    #[test]
    fn rejects_every_single_digit_mutation() {
        for isin in VALID {
            for (pos, ch) in isin.char_indices() {
                let Some(orig) = ch.to_digit(10) else {
                    continue;
                };
                for d in 0..10u32 {
                    if d == orig {
                        continue;
                    }
                    let mut mutated = isin.to_string();
                    let repl = char::from_digit(d, 10).unwrap();
                    mutated.replace_range(pos..pos + 1, &repl.to_string());
                    assert!(
                        !is_valid_isin(&mutated),
                        "{mutated} (from {isin}) should fail the checksum"
                    );
                }
            }
        }
    }

    #[test]
    fn shape_checks() {
        assert!(has_isin_shape("US0378331005"));
        assert!(!has_isin_shape("us0378331005"));
        assert!(!has_isin_shape("US037833100"));
        assert!(!has_isin_shape("US037833100X"));
        assert!(!has_isin_shape("1S0378331005"));
        assert!(!is_valid_isin("US0378331006"));
    }

    #[test]
    fn repairs_common_ocr_confusions() {
        let fixed = |s: &str| repair_isin(s);
        assert_eq!(fixed("us0378331005").as_deref(), Some("US0378331005"));
        assert_eq!(fixed("US037833100S").as_deref(), Some("US0378331005"));
        assert_eq!(fixed("U50378331005").as_deref(), Some("US0378331005"));
        assert_eq!(fixed("US03783310O5").as_deref(), Some("US0378331005"));
        assert_eq!(fixed("US5949181O45").as_deref(), Some("US5949181045"));
        // letters that belong to the code stay
        assert_eq!(fixed("IE00B4L5Y983").as_deref(), Some("IE00B4L5Y983"));
    }

    #[test]
    fn repair_never_rewrites_printed_digits() {
        assert_eq!(repair_isin("US0378331006"), None);
        assert_eq!(repair_isin("DE0007236102"), None);
    }

    #[test]
    fn words_are_not_isin_candidates() {
        assert_eq!(isin_shape_of("Technologies"), None);
        assert_eq!(isin_shape_of("International"), None);
        assert_eq!(isin_shape_of("US0378331005").as_deref(), Some("US0378331005"));
    }
}
