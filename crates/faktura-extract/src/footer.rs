//! Footer / Total Extractor (spec §4.7): generates amount candidates from
//! the footer segment, classifies each by nearest keyword, and scores them
//! with the weighted multi-factor model below.
//!
//! The AI trigger and post-AI acceptance rule (spec §4.7, §4.10) are not
//! implemented here — they need the AI adapter (`faktura-ai`) and retry
//! policy, which live above this crate in `faktura-pipeline::retry` to avoid
//! a circular dependency. This module only produces the heuristic candidate
//! set those stages act on.

use std::sync::OnceLock;

use faktura_core::{BBox, KeywordClass, Page, Segment, Token, Traceability, ExtractionSource};
use regex::Regex;

use crate::numbers::parse_amount;

struct Weights;
impl Weights {
    const KEYWORD_CLASS: f32 = 0.32;
    const POSITION_RIGHT_ALIGN: f32 = 0.18;
    const MATH_VALIDATION: f32 = 0.32;
    const RELATIVE_SIZE: f32 = 0.08;
    const FONT_SIGNAL: f32 = 0.05;
    const VAT_PROXIMITY: f32 = 0.05;
    const CURRENCY_SYMBOL: f32 = 0.03;
    const ROW_ISOLATION: f32 = 0.02;
}

fn with_vat_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(att betala|inkl\.?\s*moms|slutsumma|summa att betala)").unwrap())
}

fn generic_total_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\btotal(t)?\b").unwrap())
}

fn without_vat_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(exkl\.?\s*moms|delsumma|netto att betala)").unwrap())
}

fn vat_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bmoms\b").unwrap())
}

fn currency_symbol_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(sek|kr\b|:-)").unwrap())
}

/// A thousands-group fragment with no decimal comma, e.g. the "12" half of
/// "12 345,67" once the embedded tokenizer has split it on whitespace.
fn leading_thousands_fragment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,3}$").unwrap())
}

/// The remainder of a Swedish thousands-separated amount after the leading
/// group, e.g. the "345,67" half of "12 345,67".
fn thousands_continuation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{3},\d{1,2}\b").unwrap())
}

/// Detects a Swedish thousands-separator amount split across two adjacent
/// tokens by whitespace tokenization (spec §8: "12 345,67" spread over
/// multiple tokens) and merges them into a single parsed amount.
fn merged_thousands_amount(token: &Token, next: Option<&Token>) -> Option<(f64, BBox)> {
    let next = next?;
    if !leading_thousands_fragment_regex().is_match(&token.text) || !thousands_continuation_regex().is_match(&next.text) {
        return None;
    }
    let merged = format!("{} {}", token.text, next.text);
    let amount = parse_amount(&merged)?;
    Some((amount, BBox::union_all(&[token.bbox, next.bbox])))
}

/// Classifies a row's text into a [`KeywordClass`] (spec §4.7).
#[must_use]
pub fn classify_keyword(row_text: &str) -> KeywordClass {
    if with_vat_regex().is_match(row_text) {
        KeywordClass::WithVat
    } else if without_vat_regex().is_match(row_text) {
        KeywordClass::Subtotal
    } else if vat_keyword_regex().is_match(row_text) {
        KeywordClass::Tax
    } else if generic_total_regex().is_match(row_text) {
        KeywordClass::Generic
    } else {
        KeywordClass::Unknown
    }
}

fn keyword_class_component(class: KeywordClass) -> f32 {
    match class {
        KeywordClass::WithVat => 1.0,
        KeywordClass::Generic => 0.7,
        KeywordClass::Tax | KeywordClass::Unknown => 0.4,
        KeywordClass::Subtotal => -0.3,
        KeywordClass::Discount => -0.5,
    }
}

/// Validation tolerance for a given total (spec §4.7): `±1.00` for small
/// totals, `max(1.00, 0.5% of total)` for larger ones.
#[must_use]
pub fn validation_tolerance(total: f64) -> f64 {
    (1.00_f64).max(0.005 * total.abs())
}

/// Graded partial credit for a near-miss against `lines_sum` (spec §4.7):
/// full credit within tolerance, 0.25 within 5, 0.15 within 50, else 0.
#[must_use]
pub fn math_validation_score(candidate: f64, lines_sum: f64) -> f32 {
    let diff = (candidate - lines_sum).abs();
    let tolerance = validation_tolerance(candidate);
    if diff <= tolerance {
        Weights::MATH_VALIDATION
    } else if diff <= 5.0 {
        0.25
    } else if diff <= 50.0 {
        0.15
    } else {
        0.0
    }
}

/// A scored footer amount candidate (spec §4.7).
#[derive(Debug, Clone)]
pub struct FooterCandidate {
    pub value: f64,
    pub keyword_class: KeywordClass,
    pub score: f32,
    pub row_index: usize,
    pub page_index: usize,
    pub matched_bboxes: Vec<BBox>,
    pub excerpt: String,
}

/// Generates and scores every amount-like token in the footer segment, no
/// top-N clipping at generation time (spec §4.7: "no top-N clipping at
/// generation"). Callers persist only the top 5 in the header.
#[must_use]
pub fn score_candidates(page: &Page, footer_segment: &Segment, lines_sum: f64) -> Vec<FooterCandidate> {
    let rows = page.segment_rows(footer_segment);
    if rows.is_empty() {
        return Vec::new();
    }

    let row_heights: Vec<f64> = footer_segment
        .row_indices
        .iter()
        .map(|&i| {
            let tokens = page.row_tokens(&page.rows[i]);
            tokens.iter().map(|t| t.bbox.h).fold(0.0, f64::max)
        })
        .collect();
    let median_height = median(&row_heights);

    let max_row_width = footer_segment
        .row_indices
        .iter()
        .map(|&i| page.rows[i].x_end)
        .fold(0.0_f64, f64::max);

    let mut all_amounts: Vec<f64> = Vec::new();
    let mut candidates = Vec::new();

    for (pos, &row_idx) in footer_segment.row_indices.iter().enumerate() {
        let row = &page.rows[row_idx];
        let class = classify_keyword(&row.text);
        let tokens: Vec<&Token> = page.row_tokens(row);

        let mut token_idx = 0;
        while token_idx < tokens.len() {
            let token = tokens[token_idx];
            let next = tokens.get(token_idx + 1).copied();

            let (amount, bbox, consumed) = if let Some((amount, bbox)) = merged_thousands_amount(token, next) {
                (amount, bbox, 2)
            } else if let Some(amount) = parse_amount(&token.text) {
                (amount, token.bbox, 1)
            } else {
                token_idx += 1;
                continue;
            };

            all_amounts.push(amount);

            let keyword_score = Weights::KEYWORD_CLASS * keyword_class_component(class).clamp(-1.0, 1.0).max(0.0)
                + if matches!(class, KeywordClass::Subtotal | KeywordClass::Discount) { -0.1 } else { 0.0 };

            let position_score = if row.x_end >= max_row_width - 5.0 { Weights::POSITION_RIGHT_ALIGN } else { 0.0 };
            let math_score = math_validation_score(amount, lines_sum);

            let row_height = tokens.iter().map(|t| t.bbox.h).fold(0.0, f64::max);
            let font_score = if median_height > 0.0 && row_height >= median_height * 1.10 { Weights::FONT_SIGNAL } else { 0.0 };

            let vat_nearby = nearby_row_has_vat_keyword(page, footer_segment, pos);
            let vat_score = if vat_nearby { Weights::VAT_PROXIMITY } else { 0.0 };

            let currency_score = if currency_symbol_regex().is_match(&row.text) { Weights::CURRENCY_SYMBOL } else { 0.0 };

            let isolation_score = if row_is_isolated(page, footer_segment, pos, median_height) { Weights::ROW_ISOLATION } else { 0.0 };

            candidates.push((row_idx, amount, class, bbox, keyword_score + position_score + math_score + font_score + vat_score + currency_score + isolation_score, row.text.clone()));

            token_idx += consumed;
        }
    }

    let max_amount = all_amounts.iter().cloned().fold(0.0_f64, f64::max);

    let mut scored: Vec<FooterCandidate> = candidates
        .into_iter()
        .map(|(row_idx, amount, class, bbox, mut score, row_text)| {
            if max_amount > 0.0 && (amount - max_amount).abs() < f64::EPSILON {
                score += Weights::RELATIVE_SIZE;
            }
            FooterCandidate {
                value: amount,
                keyword_class: class,
                score,
                row_index: row_idx,
                page_index: page.index,
                matched_bboxes: vec![bbox],
                excerpt: row_text.chars().take(120).collect(),
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    scored
}

fn nearby_row_has_vat_keyword(page: &Page, segment: &Segment, pos: usize) -> bool {
    let window = 1..=3;
    window.into_iter().any(|offset| {
        segment
            .row_indices
            .get(pos.wrapping_sub(offset))
            .or_else(|| segment.row_indices.get(pos + offset))
            .is_some_and(|&idx| vat_keyword_regex().is_match(&page.rows[idx].text))
    })
}

fn row_is_isolated(page: &Page, segment: &Segment, pos: usize, median_height: f64) -> bool {
    if median_height <= 0.0 {
        return false;
    }
    let row_idx = segment.row_indices[pos];
    let current_y = page.rows[row_idx].y_center;
    let prev_gap = pos.checked_sub(1).map(|p| (current_y - page.rows[segment.row_indices[p]].y_center).abs());
    prev_gap.is_none_or(|gap| gap >= median_height * 1.5)
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    sorted[sorted.len() / 2]
}

/// Builds the traceability record for the top footer candidate, mirroring
/// the invoice-number traceability shape (spec §4.7: "mirrors §4.5").
#[must_use]
pub fn trace_of(candidate: &FooterCandidate) -> Traceability {
    Traceability {
        page_index: candidate.page_index,
        bbox: BBox::union_all(&candidate.matched_bboxes),
        source: ExtractionSource::EmbeddedText,
        raw_text: candidate.excerpt.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faktura_core::{Row, SegmentKind, Token};

    fn footer_page(rows: &[&str]) -> (Page, Segment) {
        let mut page = Page::new(1, 595.0, 842.0);
        for (i, text) in rows.iter().enumerate() {
            let start = page.tokens.len();
            for (j, word) in text.split_whitespace().enumerate() {
                page.tokens.push(Token::new(word, BBox::new((j * 30) as f64, (i * 20) as f64, 25.0, 12.0)));
            }
            let indices: Vec<usize> = (start..page.tokens.len()).collect();
            page.rows.push(Row { token_indices: indices, y_center: (i * 20) as f64, x_start: 0.0, x_end: 200.0, text: (*text).to_string() });
        }
        let segment = Segment { kind: SegmentKind::Footer, row_indices: (0..rows.len()).collect(), y_top: 0.0, y_bottom: (rows.len() * 20) as f64 };
        (page, segment)
    }

    #[test]
    fn classify_keyword_finds_with_vat_total() {
        assert_eq!(classify_keyword("Att betala 500,00"), KeywordClass::WithVat);
    }

    #[test]
    fn classify_keyword_finds_subtotal() {
        assert_eq!(classify_keyword("Delsumma 450,00"), KeywordClass::Subtotal);
    }

    #[test]
    fn validation_tolerance_uses_percentage_for_large_totals() {
        assert_eq!(validation_tolerance(100.0), 1.0);
        assert!((validation_tolerance(10_000.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn math_validation_gives_full_credit_within_tolerance() {
        assert_eq!(math_validation_score(100.0, 100.0), Weights::MATH_VALIDATION);
    }

    #[test]
    fn math_validation_gives_partial_credit_for_near_misses() {
        assert_eq!(math_validation_score(105.0, 100.0), 0.25);
        assert_eq!(math_validation_score(140.0, 100.0), 0.15);
        assert_eq!(math_validation_score(500.0, 100.0), 0.0);
    }

    #[test]
    fn with_vat_candidate_scores_higher_than_subtotal() {
        let (page, segment) = footer_page(&["Delsumma 450,00", "Att betala 500,00"]);
        let candidates = score_candidates(&page, &segment, 500.0);
        let total_candidate = candidates.iter().find(|c| (c.value - 500.0).abs() < 1e-6).unwrap();
        let subtotal_candidate = candidates.iter().find(|c| (c.value - 450.0).abs() < 1e-6).unwrap();
        assert!(total_candidate.score > subtotal_candidate.score);
    }

    #[test]
    fn merges_thousands_separated_amount_split_across_tokens() {
        let (page, segment) = footer_page(&["Att betala 12 345,67"]);
        let candidates = score_candidates(&page, &segment, 12_345.67);
        assert!(candidates.iter().any(|c| (c.value - 12_345.67).abs() < 1e-6));
        assert!(!candidates.iter().any(|c| (c.value - 12.0).abs() < 1e-9));
        assert!(!candidates.iter().any(|c| (c.value - 345.67).abs() < 1e-6));
    }

    #[test]
    fn classify_keyword_distinguishes_generic_from_with_vat() {
        assert_eq!(classify_keyword("Totalt 12000"), KeywordClass::Generic);
        assert_eq!(classify_keyword("Att betala 12000"), KeywordClass::WithVat);
    }

    #[test]
    fn with_vat_candidate_scores_higher_than_generic_total() {
        let (page, segment) = footer_page(&["Totalt 450,00", "Att betala 450,00"]);
        let candidates = score_candidates(&page, &segment, 450.0);
        let with_vat = candidates.iter().find(|c| c.keyword_class == KeywordClass::WithVat).unwrap();
        let generic = candidates.iter().find(|c| c.keyword_class == KeywordClass::Generic).unwrap();
        assert!(with_vat.score > generic.score);
    }
}
