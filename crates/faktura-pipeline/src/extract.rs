//! Per-source header and line-item extraction for one logical invoice (spec
//! §4.5, §4.6), run once per candidate source (embedded text, OCR) by
//! [`crate::compare`]. Footer/total extraction lives separately in
//! [`crate::retry`] because it needs the AI adapter and calibration model;
//! this module stays a thin composition of `faktura-extract`'s scorers over
//! one page range.

use std::collections::HashMap;

use faktura_core::{Document, InvoiceHeader, InvoiceLine, Page, Segment, SegmentKind};
use faktura_layout::{is_wrap_row, InvoiceRange, MAX_WRAP_ROWS};

use crate::context::PipelineContext;

fn segment_of(page: &Page, kind: SegmentKind) -> Option<&Segment> {
    page.segments.iter().find(|s| s.kind == kind)
}

/// Builds a row-index -> anchor-row-index map for every wrap continuation in
/// an items segment (spec §4.3): the anchor stays the original item row for
/// the whole run, capped at [`MAX_WRAP_ROWS`].
fn wrap_map(page: &Page, segment: &Segment) -> HashMap<usize, usize> {
    let mut wraps = HashMap::new();
    let indices = &segment.row_indices;
    let mut i = 0;
    while i < indices.len() {
        let anchor_idx = indices[i];
        let anchor_row = &page.rows[anchor_idx];
        let mut count = 0;
        let mut j = i + 1;
        while j < indices.len() && count < MAX_WRAP_ROWS {
            let candidate = &page.rows[indices[j]];
            if is_wrap_row(anchor_row, candidate, page.width) {
                wraps.insert(indices[j], anchor_idx);
                count += 1;
                j += 1;
            } else {
                break;
            }
        }
        i = j.max(i + 1);
    }
    wraps
}

/// Parses every items segment in `range`'s pages into [`InvoiceLine`]s,
/// renumbering sequentially across pages and carrying page-relative
/// `row_index` values as-is (traceability only needs to resolve them against
/// the same page).
#[must_use]
pub fn extract_lines(document: &Document, range: InvoiceRange) -> Vec<InvoiceLine> {
    let mut lines = Vec::new();
    for page in document.pages.iter().filter(|p| p.index >= range.page_start && p.index <= range.page_end) {
        let Some(segment) = segment_of(page, SegmentKind::Items) else { continue };
        let wraps = wrap_map(page, segment);
        let page_lines = faktura_extract::parse_lines(page, segment, &|row_idx| wraps.get(&row_idx).copied());
        lines.extend(page_lines);
    }
    for (i, line) in lines.iter_mut().enumerate() {
        line.line_number = (i + 1) as u32;
    }
    lines
}

/// Extracts the invoice header (spec §4.5) from the first page in `range`
/// that carries a header segment, falling back to the range's first page.
/// Candidate scoring is calibrated before the tie-break and hard-gate rules
/// are applied, so the hard gate reflects the same calibrated confidence the
/// rest of the pipeline reports (spec §4.13: "calibrated(invoice_number) ≥
/// 0.95").
#[must_use]
pub fn extract_header(document: &Document, range: InvoiceRange, ctx: &PipelineContext) -> InvoiceHeader {
    let pages_in_range: Vec<&Page> =
        document.pages.iter().filter(|p| p.index >= range.page_start && p.index <= range.page_end).collect();

    let Some(&anchor_page) = pages_in_range.first() else { return InvoiceHeader::empty() };
    let header_page = pages_in_range.iter().find(|p| segment_of(p, SegmentKind::Header).is_some()).copied().unwrap_or(anchor_page);
    let header_segment = segment_of(header_page, SegmentKind::Header);

    let mut candidates = faktura_extract::score_header_candidates(header_page, header_segment);
    for c in &mut candidates {
        c.score = ctx.calibrate(c.score);
    }
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());

    let selected = faktura_extract::select(&candidates, header_page, ctx.config.hard_gate_confidence);

    let mut header = InvoiceHeader::empty();
    header.invoice_number_confidence = selected.confidence;
    header.invoice_number = selected.value;
    header.invoice_number_trace = selected.trace;

    if let Some(segment) = header_segment {
        header.supplier_name = faktura_extract::extract_supplier_name(header_page, segment);
        header.ocr_reference = faktura_extract::extract_reference(header_page, segment);
        header.invoice_date = faktura_extract::parse_swedish_date(&header_page.segment_rows(segment).iter().map(|r| r.text.as_str()).collect::<Vec<_>>().join(" "));
    }

    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use faktura_core::{BBox as CoreBBox, Row, Token};

    fn single_page_document(rows: &[(&str, SegmentKind)]) -> Document {
        let mut page = Page::new(1, 595.0, 842.0);
        for (text, _) in rows {
            let start = page.tokens.len();
            for (j, word) in text.split_whitespace().enumerate() {
                page.tokens.push(Token::new(word, CoreBBox::new((j * 20) as f64, 0.0, 15.0, 10.0)));
            }
            let indices: Vec<usize> = (start..page.tokens.len()).collect();
            page.rows.push(Row { token_indices: indices, y_center: (page.rows.len() * 20) as f64, x_start: 0.0, x_end: 200.0, text: (*text).to_string() });
        }
        let mut run_start = 0;
        for i in 1..=rows.len() {
            if i == rows.len() || rows[i].1 != rows[run_start].1 {
                page.segments.push(Segment {
                    kind: rows[run_start].1,
                    row_indices: (run_start..i).collect(),
                    y_top: page.rows[run_start].y_center,
                    y_bottom: page.rows[i - 1].y_center,
                });
                run_start = i;
            }
        }
        Document::new("f.pdf", vec![page])
    }

    #[test]
    fn extracts_lines_from_items_segment() {
        let document = single_page_document(&[("Widget 2 50,00 100,00", SegmentKind::Items)]);
        let range = InvoiceRange { page_start: 1, page_end: 1 };
        let lines = extract_lines(&document, range);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line_total, Some(100.0));
    }

    #[test]
    fn header_hard_gate_nulls_low_confidence_candidate() {
        let document = single_page_document(&[("random text xyz", SegmentKind::Header)]);
        let ctx = PipelineContext::new(crate::context::PipelineConfig::default());
        let range = InvoiceRange { page_start: 1, page_end: 1 };
        let header = extract_header(&document, range, &ctx);
        assert!(header.invoice_number.is_none());
    }

    #[test]
    fn header_accepts_candidate_near_keyword() {
        let document = single_page_document(&[("Fakturanummer AB123456", SegmentKind::Header)]);
        let ctx = PipelineContext::new(crate::context::PipelineConfig::default());
        let range = InvoiceRange { page_start: 1, page_end: 1 };
        let header = extract_header(&document, range, &ctx);
        assert!(header.invoice_number_confidence > 0.5);
    }
}
