//! Header Extractor (spec §4.5): candidate generation and multi-factor
//! scoring for the invoice number (the first critical field), plus
//! companion extraction of supplier, date, and reference.
//!
//! Grounded on `docling-backend`'s candidate/pipeline interplay, restructured
//! here as a plain weighted scorer instead of an ML pipeline stage — there is
//! no trained model backing this component, only the weight vector below.

use std::sync::OnceLock;

use chrono::NaiveDate;
use faktura_core::{BBox, Page, Segment, SegmentKind, Token, Traceability, ExtractionSource};
use regex::Regex;

/// Hard gate: a resolved value is retained only above this calibrated
/// confidence (spec §4.5, §4.13).
pub const HARD_GATE_CONFIDENCE: f32 = 0.95;

/// Score-difference threshold below which the top two distinct candidates
/// are considered a tie (spec §4.5).
pub const TIE_BREAK_DELTA: f32 = 0.03;

struct Weights;
impl Weights {
    const KEYWORD_PROXIMITY: f32 = 0.35;
    const HEADER_POSITION: f32 = 0.30;
    const FORMAT_PLAUSIBILITY: f32 = 0.20;
    const DOCUMENT_UNIQUENESS: f32 = 0.10;
    const TOKEN_CONFIDENCE: f32 = 0.05;
}

fn invoice_number_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(fakturanummer|invoice\s*number|fakturanr|\bnr\b|\bno\b)").unwrap())
}

fn candidate_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Za-z0-9-]{3,25}\b").unwrap())
}

fn pure_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,2}[./-]\d{1,2}[./-]\d{2,4}$").unwrap())
}

/// A scored invoice-number candidate (spec §4.5).
#[derive(Debug, Clone)]
pub struct InvoiceNumberCandidate {
    pub value: String,
    pub score: f32,
    pub row_index: usize,
    pub page_index: usize,
    pub matched_bboxes: Vec<BBox>,
    pub excerpt: String,
}

fn is_format_plausible(candidate: &str) -> bool {
    if pure_date_regex().is_match(candidate) {
        return false;
    }
    let is_ten_digit_org_number = candidate.len() == 10 && candidate.chars().all(|c| c.is_ascii_digit());
    if is_ten_digit_org_number {
        return false;
    }
    candidate.chars().any(|c| c.is_alphanumeric())
}

/// Generates and scores invoice-number candidates across a page's header
/// segment (and, with a reduced proximity score, the rest of the page).
#[must_use]
pub fn score_candidates(page: &Page, header_segment: Option<&Segment>) -> Vec<InvoiceNumberCandidate> {
    let mut candidates = Vec::new();
    let header_row_indices: std::collections::HashSet<usize> =
        header_segment.map(|s| s.row_indices.iter().copied().collect()).unwrap_or_default();

    let all_values: Vec<&str> = page
        .rows
        .iter()
        .flat_map(|row| candidate_token_regex().find_iter(&row.text).map(|m| m.as_str()))
        .collect();

    for (row_index, row) in page.rows.iter().enumerate() {
        let keyword_here = invoice_number_keyword_regex().is_match(&row.text);
        let keyword_nearby = row_index > 0 && invoice_number_keyword_regex().is_match(&page.rows[row_index - 1].text);

        for m in candidate_token_regex().find_iter(&row.text) {
            let candidate_value = m.as_str();
            if !is_format_plausible(candidate_value) {
                continue;
            }

            let keyword_score = if keyword_here {
                Weights::KEYWORD_PROXIMITY
            } else if keyword_nearby {
                Weights::KEYWORD_PROXIMITY * 0.5
            } else {
                0.0
            };

            let position_score = if header_row_indices.contains(&row_index) { Weights::HEADER_POSITION } else { 0.0 };
            let format_score = Weights::FORMAT_PLAUSIBILITY;
            let uniqueness_count = all_values.iter().filter(|&&v| v == candidate_value).count();
            let uniqueness_score = if uniqueness_count <= 1 { Weights::DOCUMENT_UNIQUENESS } else { 0.0 };

            let matched_tokens: Vec<&Token> = page.row_tokens(row);
            let avg_confidence: f32 = {
                let confidences: Vec<f32> = matched_tokens.iter().filter_map(|t| t.confidence).collect();
                if confidences.is_empty() { 1.0 } else { confidences.iter().sum::<f32>() / confidences.len() as f32 / 100.0 }
            };
            let confidence_score = Weights::TOKEN_CONFIDENCE * avg_confidence;

            let score = keyword_score + position_score + format_score + uniqueness_score + confidence_score;

            let bboxes: Vec<BBox> = matched_tokens.iter().map(|t| t.bbox).collect();
            let excerpt: String = row.text.chars().take(120).collect();

            candidates.push(InvoiceNumberCandidate {
                value: candidate_value.to_string(),
                score,
                row_index,
                page_index: page.index,
                matched_bboxes: bboxes,
                excerpt,
            });
        }
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    candidates
}

/// Result of selecting among scored candidates (spec §4.5): the final value
/// and confidence, `None` value when a tie or gate failure nulls the field.
#[derive(Debug, Clone)]
pub struct SelectedInvoiceNumber {
    pub value: Option<String>,
    pub confidence: f32,
    pub trace: Option<Traceability>,
}

/// Applies tie-break and the hard gate to a scored candidate list, then
/// applies the prefix-repair rule (spec §4.5) using the full token stream of
/// the winning row. `candidates` must already carry calibrated scores — this
/// function does not calibrate, only gates and tie-breaks (spec §4.13:
/// "calibrated(invoice_number) ≥ 0.95" — callers pass their own gate so the
/// threshold can be configured rather than hardcoded).
#[must_use]
pub fn select(candidates: &[InvoiceNumberCandidate], page: &Page, hard_gate: f32) -> SelectedInvoiceNumber {
    let Some(top) = candidates.first() else {
        return SelectedInvoiceNumber { value: None, confidence: 0.0, trace: None };
    };

    let tied = candidates
        .get(1)
        .is_some_and(|second| second.value != top.value && (top.score - second.score).abs() < TIE_BREAK_DELTA);

    if tied {
        return SelectedInvoiceNumber { value: None, confidence: top.score, trace: None };
    }

    let repaired_value = repair_prefix(&top.value, page, top.row_index);

    let confidence = top.score;
    let value = if confidence >= hard_gate { Some(repaired_value) } else { None };

    let trace = if top.matched_bboxes.is_empty() {
        None
    } else {
        Some(Traceability {
            page_index: top.page_index,
            bbox: BBox::union_all(&top.matched_bboxes),
            source: ExtractionSource::EmbeddedText,
            raw_text: top.excerpt.clone(),
        })
    };

    SelectedInvoiceNumber { value, confidence, trace }
}

/// Year-like two-digit suffixes that indicate a truncated invoice number had
/// a year pasted onto it (spec §4.5).
const YEAR_SUFFIXES: [&str; 4] = ["06", "24", "25", "26"];

/// Scans the winning row's token text for a longer digit run containing
/// `selected`; if a 10-character run ends in a year-like suffix, returns the
/// first 8 characters instead.
#[must_use]
pub fn repair_prefix(selected: &str, page: &Page, row_index: usize) -> String {
    let Some(row) = page.rows.get(row_index) else { return selected.to_string() };
    let digit_run_regex = {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"\d{10}").unwrap())
    };

    for m in digit_run_regex.find_iter(&row.text) {
        let run = m.as_str();
        if run.contains(selected) && YEAR_SUFFIXES.contains(&&run[8..10]) {
            return run[0..8].to_string();
        }
    }
    selected.to_string()
}

/// Corporate suffixes used by the supplier heuristic (spec §4.5).
fn corporate_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(AB|HB|KB|AKTIEBOLAG|ENSKILD FIRMA)\b").unwrap())
}

fn header_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(fakturanummer|fakturadatum|förfallodatum|referens|organisationsnummer)").unwrap())
}

/// Picks a supplier name from the first rows of the header segment, skipping
/// rows that look like labeled header fields.
#[must_use]
pub fn extract_supplier_name(page: &Page, header_segment: &Segment) -> Option<String> {
    let rows = page.segment_rows(header_segment);
    rows.iter()
        .find(|row| corporate_suffix_regex().is_match(&row.text) && !header_keyword_regex().is_match(&row.text))
        .map(|row| row.text.trim().to_string())
}

fn reference_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(referens|fakturareferens|betalningsreferens)\s*:?\s*(.+)").unwrap())
}

/// Extracts a free-text reference value following a known reference keyword.
#[must_use]
pub fn extract_reference(page: &Page, header_segment: &Segment) -> Option<String> {
    page.segment_rows(header_segment).iter().find_map(|row| {
        reference_keyword_regex().captures(&row.text).map(|caps| caps[2].trim().to_string())
    })
}

/// Parses DD/MM/YYYY, DD.MM.YYYY, DD-MM-YYYY, and Swedish textual month
/// names, normalizing to ISO `YYYY-MM-DD` (spec §4.5).
#[must_use]
pub fn parse_swedish_date(text: &str) -> Option<NaiveDate> {
    for fmt in ["%d/%m/%Y", "%d.%m.%Y", "%d-%m-%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text.trim(), fmt) {
            return Some(date);
        }
    }
    parse_swedish_textual_date(text)
}

fn swedish_month(name: &str) -> Option<u32> {
    let months = [
        ("januari", 1), ("februari", 2), ("mars", 3), ("april", 4), ("maj", 5), ("juni", 6),
        ("juli", 7), ("augusti", 8), ("september", 9), ("oktober", 10), ("november", 11), ("december", 12),
    ];
    let lower = name.to_lowercase();
    months.iter().find(|(m, _)| *m == lower).map(|(_, n)| *n)
}

fn parse_swedish_textual_date(text: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = text.trim().split_whitespace().collect();
    if parts.len() != 3 {
        return None;
    }
    let day: u32 = parts[0].trim_end_matches(':').parse().ok()?;
    let month = swedish_month(parts[1])?;
    let year: i32 = parts[2].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faktura_core::{Row, Token};

    fn page_with_header_row(text: &str) -> (Page, Segment) {
        let mut page = Page::new(1, 595.0, 842.0);
        for word in text.split_whitespace() {
            page.tokens.push(Token::new(word, BBox::new(10.0, 10.0, 20.0, 10.0)));
        }
        let row = Row { token_indices: (0..page.tokens.len()).collect(), y_center: 10.0, x_start: 10.0, x_end: 100.0, text: text.to_string() };
        page.rows.push(row);
        let segment = Segment { kind: SegmentKind::Header, row_indices: vec![0], y_top: 10.0, y_bottom: 10.0 };
        (page, segment)
    }

    #[test]
    fn ten_digit_org_number_is_not_format_plausible() {
        assert!(!is_format_plausible("5566778899"));
    }

    #[test]
    fn pure_date_is_not_format_plausible() {
        assert!(!is_format_plausible("12/05/2024"));
    }

    #[test]
    fn alphanumeric_candidate_is_format_plausible() {
        assert!(is_format_plausible("AB12345"));
    }

    #[test]
    fn scoring_prefers_candidate_near_keyword_in_header() {
        let (mut page, segment) = page_with_header_row("Fakturanummer AB12345");
        page.rows = page.rows.clone();
        let candidates = score_candidates(&page, Some(&segment));
        assert!(!candidates.is_empty());
        assert_eq!(candidates[0].value, "AB12345");
        assert!(candidates[0].score > 0.6);
    }

    #[test]
    fn select_returns_none_value_below_hard_gate() {
        let candidates = vec![InvoiceNumberCandidate {
            value: "AB1".into(),
            score: 0.5,
            row_index: 0,
            page_index: 1,
            matched_bboxes: vec![],
            excerpt: String::new(),
        }];
        let page = Page::new(1, 595.0, 842.0);
        let selected = select(&candidates, &page, HARD_GATE_CONFIDENCE);
        assert!(selected.value.is_none());
        assert!((selected.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn select_ties_when_scores_are_close_and_values_differ() {
        let candidates = vec![
            InvoiceNumberCandidate { value: "AB123".into(), score: 0.97, row_index: 0, page_index: 1, matched_bboxes: vec![], excerpt: String::new() },
            InvoiceNumberCandidate { value: "CD456".into(), score: 0.96, row_index: 0, page_index: 1, matched_bboxes: vec![], excerpt: String::new() },
        ];
        let page = Page::new(1, 595.0, 842.0);
        let selected = select(&candidates, &page, HARD_GATE_CONFIDENCE);
        assert!(selected.value.is_none());
    }

    #[test]
    fn prefix_repair_strips_year_suffix_from_truncated_number() {
        let mut page = Page::new(1, 595.0, 842.0);
        page.rows.push(Row { token_indices: vec![], y_center: 0.0, x_start: 0.0, x_end: 0.0, text: "1234567825".into() });
        let repaired = repair_prefix("1234567825", &page, 0);
        assert_eq!(repaired, "12345678");
    }

    #[test]
    fn swedish_textual_date_parses() {
        let date = parse_swedish_date("15 maj 2024").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 5, 15).unwrap());
    }

    #[test]
    fn slash_date_parses() {
        let date = parse_swedish_date("15/05/2024").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 5, 15).unwrap());
    }
}
