//! Invoice boundary primitives (spec §4.4) shared by the real detector.
//!
//! The detector itself lives in `faktura-pipeline`, not here: deciding
//! whether a page starts a new invoice needs the header extractor's
//! multi-factor candidate scorer, calibrated against the same model the rest
//! of the pipeline uses, and this crate cannot depend on `faktura-extract`
//! (that crate depends on layout, not the reverse). This module keeps only
//! the page-local signals that don't need scoring: the keyword match and the
//! date-plus-amount fallback pair.

use faktura_core::Page;
use regex::Regex;
use std::sync::OnceLock;

fn faktura_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bfaktura\b|\binvoice\b").unwrap())
}

fn date_pattern_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{1,2}[./-]\d{1,2}[./-]\d{2,4}\b").unwrap())
}

fn amount_pattern_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d[\d .,]*\d\s*(kr|sek|:-)?\b").unwrap())
}

/// A contiguous page range belonging to one logical invoice, 1-based inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceRange {
    pub page_start: usize,
    pub page_end: usize,
}

/// Whether `row_text` contains the "faktura"/"invoice" keyword (spec §4.4).
#[must_use]
pub fn row_has_faktura_keyword(row_text: &str) -> bool {
    faktura_keyword_regex().is_match(row_text)
}

/// Whether `row_text` carries both a date and an amount-shaped token, the
/// fallback boundary signal used when no plausible invoice-number candidate
/// is present (spec §4.4).
#[must_use]
pub fn row_has_date_and_amount(row_text: &str) -> bool {
    date_pattern_regex().is_match(row_text) && amount_pattern_regex().is_match(row_text)
}

/// Whether any row on `page` carries the keyword plus the date-and-amount
/// fallback pair, with no invoice-number candidate scoring involved. Callers
/// needing the full signal (keyword + a real scored candidate) combine this
/// with their own candidate check; see `faktura_pipeline::boundary`.
#[must_use]
pub fn has_fallback_boundary_signal(page: &Page) -> bool {
    page.rows.iter().any(|row| row_has_faktura_keyword(&row.text) && row_has_date_and_amount(&row.text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use faktura_core::Row;

    fn page_with_row_text(text: &str) -> Page {
        let mut page = Page::new(1, 595.0, 842.0);
        page.rows.push(Row { token_indices: vec![], y_center: 10.0, x_start: 0.0, x_end: 100.0, text: text.to_string() });
        page
    }

    #[test]
    fn keyword_with_date_and_amount_on_same_row_is_a_fallback_signal() {
        let page = page_with_row_text("Faktura 2024-05-01 1 250,00 kr");
        assert!(has_fallback_boundary_signal(&page));
    }

    #[test]
    fn keyword_alone_is_not_a_fallback_signal() {
        let page = page_with_row_text("faktura xyz");
        assert!(!has_fallback_boundary_signal(&page));
    }
}
