//! External collaborators the layout stage depends on but does not implement:
//! a page renderer and an OCR engine (spec §1 out-of-scope list: "PDF bytes +
//! page render service, OCR service returning tokens with per-word
//! confidence").
//!
//! One trait per capability, mirroring `docling-backend`'s `DocumentBackend`
//! shape: a narrow contract, default methods where a reasonable default
//! exists, nothing else.

use faktura_core::Result;

/// Baseline rasterization DPI (spec §4.1).
pub const BASELINE_DPI: u32 = 300;
/// Retry DPI used once when OCR mean confidence is low (spec §4.1, §4.11).
pub const RETRY_DPI: u32 = 400;

/// An opaque handle to a rasterized page. The concrete pixel buffer lives
/// with whatever implements [`PageRenderer`]; this crate only carries
/// dimensions and a render DPI so downstream code can convert pixel
/// coordinates to page points.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub dpi: u32,
    pub width_px: u32,
    pub height_px: u32,
    pub image_handle: Vec<u8>,
}

impl RenderedPage {
    /// Pixel-to-point scale factor (spec §4.1: `72/dpi`).
    #[must_use]
    pub fn px_to_pt(&self) -> f64 {
        72.0 / f64::from(self.dpi)
    }
}

/// Rasterizes a single page at a requested DPI.
pub trait PageRenderer: Send + Sync {
    /// # Errors
    /// Returns an error if the page cannot be rendered (out-of-range page
    /// index, backend failure).
    fn render(&self, pdf_path: &str, page_index: usize, dpi: u32) -> Result<RenderedPage>;
}

/// One recognized word from an OCR engine, in pixel space.
#[derive(Debug, Clone)]
pub struct OcrWord {
    pub text: String,
    pub x_px: f64,
    pub y_px: f64,
    pub w_px: f64,
    pub h_px: f64,
    /// Confidence on a 0-100 scale. Negative values must never be produced;
    /// [`tokenize_ocr`](crate::tokenize_ocr) discards them defensively anyway.
    pub confidence: f32,
}

/// Recognizes text in a rasterized page.
pub trait OcrEngine: Send + Sync {
    /// # Errors
    /// Returns an error if the OCR backend fails outright (process crash,
    /// model load failure). A page that simply has no text returns `Ok(vec![])`.
    fn recognize(&self, page: &RenderedPage) -> Result<Vec<OcrWord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn px_to_pt_matches_known_dpi() {
        let page = RenderedPage { dpi: 300, width_px: 2550, height_px: 3300, image_handle: vec![] };
        assert!((page.px_to_pt() - 0.24).abs() < 1e-9);
    }
}
