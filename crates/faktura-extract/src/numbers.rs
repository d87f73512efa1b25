//! Swedish number parsing (spec §4.6): comma decimals, space/period
//! thousands separators, currency symbols stripped.

use regex::Regex;
use std::sync::OnceLock;

fn currency_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(sek|kr\.?|:-|€|\$)").unwrap())
}

fn amount_like_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d{1,3}(?:[ .]\d{3})*(?:,\d{1,2})?|-?\d+(?:,\d{1,2})?").unwrap())
}

/// Whether `text` contains something that looks like a Swedish-formatted
/// amount, ignoring currency symbols.
#[must_use]
pub fn looks_like_amount(text: &str) -> bool {
    let stripped = currency_regex().replace_all(text, "");
    amount_like_regex().is_match(stripped.trim())
}

/// Parses a Swedish-formatted number: strips currency symbols and
/// whitespace, treats `.` and ` ` as thousands separators and `,` as the
/// decimal point. Returns `None` if nothing numeric remains.
///
/// Falls back to treating a lone `.` as a decimal point when there is no
/// comma in the string and exactly one group of 1-2 digits follows it
/// (handles the rare invoice that uses `.` as the decimal separator).
#[must_use]
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned = currency_regex().replace_all(text, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    let has_comma = cleaned.contains(',');
    let mut normalized = String::with_capacity(cleaned.len());

    if has_comma {
        for c in cleaned.chars() {
            match c {
                ' ' | '.' | '\u{a0}' => {}
                ',' => normalized.push('.'),
                c => normalized.push(c),
            }
        }
    } else {
        // No comma: a single trailing ".NN" is a decimal point; any other dot
        // is a thousands separator.
        let dot_count = cleaned.matches('.').count();
        let trailing_decimal = cleaned.rsplit('.').next().map(str::len).unwrap_or(0);
        let use_last_dot_as_decimal = dot_count >= 1 && trailing_decimal <= 2;

        if use_last_dot_as_decimal {
            if let Some(pos) = cleaned.rfind('.') {
                let (whole, frac) = cleaned.split_at(pos);
                for c in whole.chars() {
                    if c != ' ' && c != '.' && c != '\u{a0}' {
                        normalized.push(c);
                    }
                }
                normalized.push('.');
                normalized.push_str(&frac[1..]);
            }
        } else {
            for c in cleaned.chars() {
                if c != ' ' && c != '.' && c != '\u{a0}' {
                    normalized.push(c);
                }
            }
        }
    }

    normalized.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_decimal() {
        assert_eq!(parse_amount("1 250,50 kr"), Some(1250.50));
    }

    #[test]
    fn parses_period_thousands_with_comma_decimal() {
        assert_eq!(parse_amount("1.250,00"), Some(1250.00));
    }

    #[test]
    fn parses_plain_integer() {
        assert_eq!(parse_amount("500"), Some(500.0));
    }

    #[test]
    fn strips_currency_symbols() {
        assert_eq!(parse_amount("SEK 99,00"), Some(99.0));
        assert_eq!(parse_amount("99:-"), Some(99.0));
    }

    #[test]
    fn empty_after_stripping_is_none() {
        assert_eq!(parse_amount("kr"), None);
    }

    #[test]
    fn looks_like_amount_detects_swedish_format() {
        assert!(looks_like_amount("1 250,00 kr"));
        assert!(!looks_like_amount("Faktura"));
    }

    #[test]
    fn dot_as_decimal_point_when_no_comma_present() {
        assert_eq!(parse_amount("99.50"), Some(99.50));
    }

    #[test]
    fn dot_as_thousands_separator_when_trailing_group_is_three_digits() {
        assert_eq!(parse_amount("1.250"), Some(1250.0));
    }
}
