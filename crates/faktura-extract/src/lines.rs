//! Line-Item Parser (spec §4.6): projects rows in the items segment to
//! [`InvoiceLine`]s, merges wrap continuations, and stops at the first hard
//! footer keyword (or a soft keyword carrying a total-like amount).
//!
//! Hot-path constraint (spec §4.6): no O(n²) token-index lookups inside the
//! per-row loop — tokens are sorted by X once per row and indices carried,
//! never re-searched linearly per column.

use std::sync::OnceLock;

use faktura_core::{InvoiceLine, Page, Row, Segment};
use regex::Regex;

use crate::numbers::{looks_like_amount, parse_amount};

fn hard_total_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(summa att betala|att betala|totalt|delsumma|nettobelopp|moms)").unwrap()
    })
}

fn soft_total_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(summa|lista|spec|bifogad|fraktavgift)").unwrap())
}

fn unit_word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(st|kg|h|m2|m²|ea|ltr|day)$").unwrap())
}

/// A row's tokens pre-sorted by X, carried as indices into `page.tokens` —
/// built once per row so downstream column extraction never re-sorts or
/// linearly rescans (spec §4.6 hot-path constraint).
struct SortedRow<'a> {
    token_indices: Vec<usize>,
    page: &'a Page,
}

impl<'a> SortedRow<'a> {
    fn new(page: &'a Page, row: &Row) -> Self {
        let mut indices = row.token_indices.clone();
        indices.sort_by(|&a, &b| page.tokens[a].bbox.x.partial_cmp(&page.tokens[b].bbox.x).unwrap());
        Self { token_indices: indices, page }
    }

    fn text_of(&self, i: usize) -> &str {
        &self.page.tokens[self.token_indices[i]].text
    }

    fn len(&self) -> usize {
        self.token_indices.len()
    }
}

/// Whether `row` should end the items segment per the footer keyword rule
/// (spec §4.6: a hard keyword always ends it; a soft keyword ends it only
/// paired with a total-like amount).
#[must_use]
pub fn ends_items_segment(row_text: &str) -> bool {
    if hard_total_keyword_regex().is_match(row_text) {
        return true;
    }
    soft_total_keyword_regex().is_match(row_text) && looks_like_amount(row_text)
}

/// Parses all rows of an items segment into line items, applying wrap
/// detection via `faktura_layout::is_wrap_row` at the call site (this
/// function receives rows already classified as primary-vs-wrap by the
/// caller to avoid a circular dependency on the layout crate's internals).
#[must_use]
pub fn parse_lines(page: &Page, segment: &Segment, wrap_of: &dyn Fn(usize) -> Option<usize>) -> Vec<InvoiceLine> {
    let mut lines = Vec::new();
    let mut line_number = 0u32;

    for &row_idx in &segment.row_indices {
        if wrap_of(row_idx).is_some() {
            continue;
        }
        let row = &page.rows[row_idx];
        if ends_items_segment(&row.text) {
            break;
        }
        if !looks_like_amount(&row.text) {
            continue;
        }

        line_number += 1;
        let sorted = SortedRow::new(page, row);
        lines.push(build_line(page, &sorted, row_idx, line_number));
    }

    append_wraps(page, segment, wrap_of, &mut lines);
    lines
}

fn build_line(page: &Page, sorted: &SortedRow, row_idx: usize, line_number: u32) -> InvoiceLine {
    let amount_positions: Vec<usize> = (0..sorted.len()).filter(|&i| parse_amount(sorted.text_of(i)).is_some()).collect();

    let line_total = amount_positions.last().and_then(|&i| parse_amount(sorted.text_of(i)));
    let unit_price = if amount_positions.len() >= 2 {
        let idx = amount_positions[amount_positions.len() - 2];
        parse_amount(sorted.text_of(idx))
    } else {
        None
    };

    let quantity = (0..sorted.len())
        .find(|&i| sorted.text_of(i).parse::<f64>().map(|v| v.fract() == 0.0).unwrap_or(false))
        .and_then(|i| sorted.text_of(i).parse::<f64>().ok());

    let unit = (0..sorted.len()).map(|i| sorted.text_of(i)).find(|t| unit_word_regex().is_match(t)).map(str::to_string);

    let amount_col_start = amount_positions.first().copied().unwrap_or(sorted.len());
    let description: String = sorted.token_indices[..amount_col_start.min(sorted.len())]
        .iter()
        .map(|&idx| page.tokens[idx].text.as_str())
        .filter(|t| !unit_word_regex().is_match(t) && parse_amount(t).is_none())
        .collect::<Vec<_>>()
        .join(" ");

    InvoiceLine {
        line_number,
        row_index: row_idx,
        description,
        quantity,
        unit,
        unit_price,
        line_total,
        vat_rate: None,
    }
}

fn append_wraps(page: &Page, segment: &Segment, wrap_of: &dyn Fn(usize) -> Option<usize>, lines: &mut [InvoiceLine]) {
    for &row_idx in &segment.row_indices {
        if let Some(anchor_row_idx) = wrap_of(row_idx) {
            if let Some(line) = lines.iter_mut().find(|l| l.row_index == anchor_row_idx) {
                let extra = &page.rows[row_idx].text;
                line.description = format!("{} {}", line.description, extra).trim().to_string();
            }
        }
    }
}
