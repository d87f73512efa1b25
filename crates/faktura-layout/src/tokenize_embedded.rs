//! Embedded-text tokenizer (spec §4.2, path A): reads a page's content
//! stream in reading order, tracks the text matrix across `Tm`/`Td`/`TD`/`T*`
//! operators, and emits one [`Token`] per text-showing operation's word
//! fragments. Clusters into lines by a dynamic Y threshold derived from
//! median token height, then sorts within a line by X.

use std::collections::BTreeMap;

use faktura_core::{BBox, FakturaError, Result, Token};
use lopdf::content::Content;
use lopdf::{Document as LopdfDocument, Object};

/// A text matrix tracks translation only; rotation/skew PDFs are rare for
/// invoices and the spec scopes this to invoice semantics, not general PDF.
#[derive(Debug, Clone, Copy)]
struct TextState {
    x: f64,
    y: f64,
    font_size: f64,
    line_x: f64,
    line_y: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, font_size: 10.0, line_x: 0.0, line_y: 0.0 }
    }
}

/// Produces tokens for one page, in page-point space with top-left origin.
///
/// # Errors
/// Returns [`FakturaError::PdfRead`] if the page's content stream cannot be
/// decoded.
pub fn tokenize(doc: &LopdfDocument, page_object_id: lopdf::ObjectId, page_height: f64) -> Result<Vec<Token>> {
    let content_data = doc
        .get_page_content(page_object_id)
        .map_err(|e| FakturaError::PdfRead(e.to_string()))?;
    let content = Content::decode(&content_data).map_err(|e| FakturaError::PdfRead(e.to_string()))?;

    let mut state = TextState::default();
    let mut raw_tokens = Vec::new();

    for operation in &content.operations {
        match operation.operator.as_str() {
            "Tf" => {
                if let Some(Object::Real(size)) = operation.operands.get(1) {
                    state.font_size = f64::from(*size);
                } else if let Some(Object::Integer(size)) = operation.operands.get(1) {
                    state.font_size = *size as f64;
                }
            }
            "Td" | "TD" => {
                if let (Some(tx), Some(ty)) = (as_f64(operation.operands.first()), as_f64(operation.operands.get(1))) {
                    state.line_x += tx;
                    state.line_y += ty;
                    state.x = state.line_x;
                    state.y = state.line_y;
                }
            }
            "Tm" => {
                if let (Some(e), Some(f)) = (as_f64(operation.operands.get(4)), as_f64(operation.operands.get(5))) {
                    state.line_x = e;
                    state.line_y = f;
                    state.x = e;
                    state.y = f;
                }
            }
            "T*" => {
                state.line_y -= state.font_size * 1.15;
                state.x = state.line_x;
                state.y = state.line_y;
            }
            "Tj" => {
                if let Some(text) = operation.operands.first() {
                    push_text_run(&mut raw_tokens, text_bytes(text), &mut state, page_height);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operation.operands.first() {
                    for item in items {
                        match item {
                            Object::String(_, _) => push_text_run(&mut raw_tokens, text_bytes(item), &mut state, page_height),
                            Object::Integer(adj) => state.x -= (*adj as f64) / 1000.0 * state.font_size,
                            Object::Real(adj) => state.x -= f64::from(*adj) / 1000.0 * state.font_size,
                            _ => {}
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(group_into_reading_order(raw_tokens))
}

/// A single decoded word before line clustering: raw text plus the cursor
/// position it was emitted at.
struct RawToken {
    text: String,
    x: f64,
    y_top_left: f64,
    font_size: f64,
}

fn push_text_run(out: &mut Vec<RawToken>, bytes: Option<Vec<u8>>, state: &mut TextState, page_height: f64) {
    let Some(bytes) = bytes else { return };
    let text = String::from_utf8_lossy(&bytes).to_string();
    let width_estimate = text.chars().count() as f64 * state.font_size * 0.5;
    for word in text.split_whitespace() {
        out.push(RawToken {
            text: word.to_string(),
            x: state.x,
            y_top_left: page_height - state.y,
            font_size: state.font_size,
        });
    }
    state.x += width_estimate;
}

fn text_bytes(obj: &Object) -> Option<Vec<u8>> {
    match obj {
        Object::String(bytes, _) => Some(bytes.clone()),
        _ => None,
    }
}

fn as_f64(obj: Option<&Object>) -> Option<f64> {
    match obj {
        Some(Object::Real(v)) => Some(f64::from(*v)),
        Some(Object::Integer(v)) => Some(*v as f64),
        _ => None,
    }
}

/// Clusters raw tokens into Y bands using the median font size as tolerance,
/// then orders bands top-to-bottom and tokens within a band left-to-right.
fn group_into_reading_order(mut raw: Vec<RawToken>) -> Vec<Token> {
    if raw.is_empty() {
        return Vec::new();
    }

    let mut font_sizes: Vec<f64> = raw.iter().map(|t| t.font_size).collect();
    font_sizes.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median_font = font_sizes[font_sizes.len() / 2].max(1.0);
    let tolerance = median_font * 0.6;

    raw.sort_by(|a, b| a.y_top_left.partial_cmp(&b.y_top_left).unwrap());

    let mut bands: Vec<Vec<RawToken>> = Vec::new();
    for token in raw {
        match bands.last_mut() {
            Some(band) if (token.y_top_left - band[0].y_top_left).abs() <= tolerance => band.push(token),
            _ => bands.push(vec![token]),
        }
    }

    let mut result = Vec::new();
    for mut band in bands {
        band.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap());
        for token in band {
            let width = token.text.chars().count() as f64 * token.font_size * 0.5;
            result.push(Token::new(token.text, BBox::new(token.x, token.y_top_left - token.font_size, width, token.font_size)));
        }
    }
    result
}

/// Per-page quality metrics used by Compare & Choose (spec §4.11).
#[derive(Debug, Clone, Copy)]
pub struct TextQuality {
    pub score: f64,
    pub token_count: usize,
}

/// A crude but cheap text-quality heuristic for the embedded-text path:
/// fraction of tokens that look like real words (contain at least one letter
/// and no control characters), clamped to `[0, 1]`.
#[must_use]
pub fn text_quality(tokens: &[Token]) -> TextQuality {
    if tokens.is_empty() {
        return TextQuality { score: 0.0, token_count: 0 };
    }
    let plausible = tokens.iter().filter(|t| t.text.chars().any(char::is_alphanumeric)).count();
    TextQuality { score: plausible as f64 / tokens.len() as f64, token_count: tokens.len() }
}

/// Groups page object ids in document order, matching `lopdf`'s page tree
/// traversal (callers need this to iterate pages 1-based in file order).
#[must_use]
pub fn ordered_page_ids(doc: &LopdfDocument) -> Vec<lopdf::ObjectId> {
    let pages: BTreeMap<u32, lopdf::ObjectId> = doc.get_pages().into_iter().map(|(num, id)| (num, id)).collect();
    pages.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_quality_of_empty_is_zero() {
        let q = text_quality(&[]);
        assert_eq!(q.score, 0.0);
        assert_eq!(q.token_count, 0);
    }

    #[test]
    fn text_quality_counts_alphanumeric_tokens() {
        let tokens = vec![
            Token::new("Faktura", BBox::new(0.0, 0.0, 10.0, 10.0)),
            Token::new("123", BBox::new(0.0, 0.0, 10.0, 10.0)),
            Token::new("***", BBox::new(0.0, 0.0, 10.0, 10.0)),
        ];
        let q = text_quality(&tokens);
        assert!((q.score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn group_into_reading_order_sorts_top_to_bottom_left_to_right() {
        let raw = vec![
            RawToken { text: "World".into(), x: 50.0, y_top_left: 0.0, font_size: 10.0 },
            RawToken { text: "Hello".into(), x: 0.0, y_top_left: 0.0, font_size: 10.0 },
            RawToken { text: "Second".into(), x: 0.0, y_top_left: 30.0, font_size: 10.0 },
        ];
        let tokens = group_into_reading_order(raw);
        assert_eq!(tokens[0].text, "Hello");
        assert_eq!(tokens[1].text, "World");
        assert_eq!(tokens[2].text, "Second");
    }
}
