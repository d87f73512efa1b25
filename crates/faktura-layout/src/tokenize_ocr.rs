//! OCR tokenizer (spec §4.2, path B): scales an [`OcrEngine`]'s pixel-space
//! word records to page points and computes the per-page metrics bundle
//! (mean, median, low-confidence fraction) that Compare & Choose and the DPI
//! retry rule (spec §4.11) both depend on.

use faktura_core::{BBox, Token};

use crate::traits::{OcrEngine, OcrWord, RenderedPage};

/// Below this OCR confidence, a token counts toward `low_conf_fraction`.
const LOW_CONFIDENCE_THRESHOLD: f32 = 60.0;

/// Runs OCR on a rendered page and converts words to page-point tokens,
/// discarding negative confidences (spec §3: "negative OCR confidence
/// excluded").
///
/// # Errors
/// Propagates the engine's error; an empty result (no text found) is not an
/// error.
pub fn tokenize(engine: &dyn OcrEngine, page: &RenderedPage) -> faktura_core::Result<Vec<Token>> {
    let words = engine.recognize(page)?;
    let scale = page.px_to_pt();
    Ok(words
        .into_iter()
        .filter(|w| w.confidence >= 0.0)
        .map(|w| word_to_token(&w, scale))
        .collect())
}

fn word_to_token(word: &OcrWord, scale: f64) -> Token {
    let bbox = BBox::new(word.x_px * scale, word.y_px * scale, word.w_px * scale, word.h_px * scale);
    Token::new(word.text.clone(), bbox).with_ocr_confidence(word.confidence)
}

/// Per-page OCR confidence metrics (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcrMetrics {
    pub mean: f32,
    pub median: f32,
    pub low_conf_fraction: f32,
}

/// Computes the metrics bundle over a page's OCR tokens. Tokens without a
/// confidence (should not occur post-tokenization) are ignored.
#[must_use]
pub fn metrics(tokens: &[Token]) -> OcrMetrics {
    let mut confidences: Vec<f32> = tokens.iter().filter_map(|t| t.confidence).collect();
    if confidences.is_empty() {
        return OcrMetrics { mean: 0.0, median: 0.0, low_conf_fraction: 0.0 };
    }
    confidences.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let sum: f32 = confidences.iter().sum();
    let mean = sum / confidences.len() as f32;
    let median = confidences[confidences.len() / 2];
    let low_count = confidences.iter().filter(|&&c| c < LOW_CONFIDENCE_THRESHOLD).count();
    let low_conf_fraction = low_count as f32 / confidences.len() as f32;

    OcrMetrics { mean, median, low_conf_fraction }
}

/// Whether a retry at [`crate::traits::RETRY_DPI`] is warranted (spec §4.11:
/// "if `ocr_mean < 55` re-render... Maximum one retry per page").
const OCR_MEAN_RETRY_THRESHOLD: f32 = 55.0;

#[must_use]
pub fn should_retry_at_higher_dpi(metrics: &OcrMetrics) -> bool {
    metrics.mean < OCR_MEAN_RETRY_THRESHOLD
}
