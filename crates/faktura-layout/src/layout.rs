//! Layout Analyzer (spec §4.3): groups tokens into rows, assembles header /
//! items / footer segments by position with content-based overrides, and
//! flags wrapped continuation rows for the line-item parser.

use faktura_core::{BBox, Page, Row, Segment, SegmentKind};
use regex::Regex;
use std::sync::OnceLock;

fn total_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(summa att betala|att betala|totalt|delsumma|nettobelopp|moms|total)").unwrap()
    })
}

fn item_pattern_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(st|kg|h|m2|m²|ea|ltr|day|antal|pris)\b").unwrap())
}

fn amount_pattern_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d .,]*\d|\d").unwrap())
}

/// Groups a page's tokens into rows by Y-band tolerance `min(5pt, 0.02*height)`
/// (spec §4.3). `Row.token_indices` indexes into `page.tokens`; tokens within a
/// row are ordered by X.
pub fn group_rows(page: &Page) -> Vec<Row> {
    if page.tokens.is_empty() {
        return Vec::new();
    }

    let tolerance = (5.0_f64).min(0.02 * page.height);

    let mut indices: Vec<usize> = (0..page.tokens.len()).collect();
    indices.sort_by(|&a, &b| page.tokens[a].bbox.y_center().partial_cmp(&page.tokens[b].bbox.y_center()).unwrap());

    let mut bands: Vec<Vec<usize>> = Vec::new();
    for idx in indices {
        let y = page.tokens[idx].bbox.y_center();
        match bands.last() {
            Some(band) if (y - page.tokens[band[0]].bbox.y_center()).abs() <= tolerance => {
                bands.last_mut().unwrap().push(idx);
            }
            _ => bands.push(vec![idx]),
        }
    }

    bands
        .into_iter()
        .map(|mut band| {
            band.sort_by(|&a, &b| page.tokens[a].bbox.x.partial_cmp(&page.tokens[b].bbox.x).unwrap());
            build_row(page, band)
        })
        .collect()
}

fn build_row(page: &Page, token_indices: Vec<usize>) -> Row {
    let boxes: Vec<BBox> = token_indices.iter().map(|&i| page.tokens[i].bbox).collect();
    let union = BBox::union_all(&boxes);
    let text = token_indices.iter().map(|&i| page.tokens[i].text.as_str()).collect::<Vec<_>>().join(" ");
    Row { token_indices, y_center: union.y_center(), x_start: union.x, x_end: union.right(), text }
}

/// Assigns each row to a [`SegmentKind`] by position with content overrides
/// (spec §4.3: "top 30% = header, middle = items, bottom 30% = footer...
/// rows containing strong total keywords pull into footer; rows containing
/// strong item patterns pull into items"), then groups contiguous same-kind
/// rows into segments.
pub fn identify_segments(page: &Page) -> Vec<Segment> {
    if page.rows.is_empty() {
        return Vec::new();
    }

    let kinds: Vec<SegmentKind> = page
        .rows
        .iter()
        .map(|row| {
            let position_kind = position_default(row.y_center, page.height);
            if total_keyword_regex().is_match(&row.text) {
                SegmentKind::Footer
            } else if item_pattern_regex().is_match(&row.text) && amount_pattern_regex().is_match(&row.text) {
                SegmentKind::Items
            } else {
                position_kind
            }
        })
        .collect();

    let mut segments = Vec::new();
    let mut run_start = 0;
    for i in 1..=kinds.len() {
        if i == kinds.len() || kinds[i] != kinds[run_start] {
            segments.push(build_segment(page, run_start, i, kinds[run_start]));
            run_start = i;
        }
    }
    segments
}

fn position_default(y_center: f64, page_height: f64) -> SegmentKind {
    let fraction = y_center / page_height;
    if fraction < 0.30 {
        SegmentKind::Header
    } else if fraction > 0.70 {
        SegmentKind::Footer
    } else {
        SegmentKind::Items
    }
}

fn build_segment(page: &Page, start: usize, end: usize, kind: SegmentKind) -> Segment {
    let row_indices: Vec<usize> = (start..end).collect();
    let y_top = page.rows[start].y_center;
    let y_bottom = page.rows[end - 1].y_center;
    Segment { kind, row_indices, y_top, y_bottom }
}

/// Whether `candidate` is a wrap continuation of `anchor` (spec §4.3): no
/// amount pattern, and X start within `±0.02 * page.width` of the anchor's
/// description start.
#[must_use]
pub fn is_wrap_row(anchor: &Row, candidate: &Row, page_width: f64) -> bool {
    let x_tolerance = 0.02 * page_width;
    !amount_pattern_regex().is_match(&candidate.text) && (candidate.x_start - anchor.x_start).abs() <= x_tolerance
}

/// Maximum consecutive wrap rows merged into one line item (spec §4.3: "Stop
/// on:... after 3 wraps").
pub const MAX_WRAP_ROWS: usize = 3;

#[cfg(test)]
mod tests {
    use super::*;
    use faktura_core::Token;

    fn page_with_rows(rows_text: &[(&str, f64)], width: f64, height: f64) -> Page {
        let mut page = Page::new(1, width, height);
        for (text, y) in rows_text {
            page.tokens.push(faktura_core::Token {
                text: (*text).to_string(),
                bbox: BBox::new(10.0, *y, 40.0, 10.0),
                confidence: None,
                font_name: None,
                font_size: None,
            });
        }
        page
    }

    #[test]
    fn group_rows_separates_distinct_y_bands() {
        let page = page_with_rows(&[("A", 10.0), ("B", 400.0)], 595.0, 842.0);
        let rows = group_rows(&page);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn group_rows_merges_tokens_in_same_band() {
        let mut page = Page::new(1, 595.0, 842.0);
        page.tokens.push(Token::new("Hello", BBox::new(0.0, 100.0, 40.0, 10.0)));
        page.tokens.push(Token::new("World", BBox::new(50.0, 101.0, 40.0, 10.0)));
        let rows = group_rows(&page);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "Hello World");
    }

    #[test]
    fn position_default_assigns_header_items_footer_by_fraction() {
        assert_eq!(position_default(10.0, 842.0), SegmentKind::Header);
        assert_eq!(position_default(420.0, 842.0), SegmentKind::Items);
        assert_eq!(position_default(800.0, 842.0), SegmentKind::Footer);
    }

    #[test]
    fn total_keyword_overrides_position_into_footer() {
        let page = page_with_rows(&[("Summa att betala 500", 10.0)], 595.0, 842.0);
        let mut page = page;
        page.rows = group_rows(&page);
        let segments = identify_segments(&page);
        assert_eq!(segments[0].kind, SegmentKind::Footer);
    }

    #[test]
    fn is_wrap_row_rejects_rows_with_amounts() {
        let anchor = Row { token_indices: vec![], y_center: 0.0, x_start: 10.0, x_end: 50.0, text: "Widget".into() };
        let candidate = Row { token_indices: vec![], y_center: 10.0, x_start: 10.0, x_end: 50.0, text: "100.00".into() };
        assert!(!is_wrap_row(&anchor, &candidate, 595.0));
    }

    #[test]
    fn is_wrap_row_accepts_aligned_description_continuation() {
        let anchor = Row { token_indices: vec![], y_center: 0.0, x_start: 10.0, x_end: 50.0, text: "Widget".into() };
        let candidate = Row { token_indices: vec![], y_center: 10.0, x_start: 11.0, x_end: 50.0, text: "extra long description".into() };
        assert!(is_wrap_row(&anchor, &candidate, 595.0));
    }
}
