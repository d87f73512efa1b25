//! Document preparation (spec §4.2-§4.4): builds tokenized, row-grouped,
//! segmented [`Document`]s from a PDF via the embedded-text path and the OCR
//! path, including the one-shot DPI retry when OCR confidence runs low
//! (spec §4.11).

use faktura_core::{Document, FakturaError, Page, Result, Token};
use faktura_layout::{group_rows, identify_segments, ocr_metrics, should_retry_at_higher_dpi, text_quality};

use crate::context::PipelineContext;

/// Output of the embedded-text preparation path: the tokenized document plus
/// each page's text-quality score, aligned by position with `document.pages`.
pub struct EmbeddedPrepared {
    pub document: Document,
    pub page_text_quality: Vec<f32>,
}

/// Re-tokenizes a PDF's embedded text layer on top of the page geometry
/// `faktura_layout::read` already produced, then groups rows and segments.
///
/// # Errors
/// Returns [`FakturaError::PdfRead`] if the file cannot be opened a second
/// time for content-stream parsing.
pub fn prepare_embedded(path: &str) -> Result<EmbeddedPrepared> {
    let mut document = faktura_layout::read(path)?;
    let lopdf_doc = lopdf::Document::load(path).map_err(|e| FakturaError::PdfRead(e.to_string()))?;
    let page_ids = faktura_layout::tokenize_embedded::ordered_page_ids(&lopdf_doc);

    let mut page_text_quality = Vec::with_capacity(document.pages.len());
    for (page, page_id) in document.pages.iter_mut().zip(page_ids.into_iter()) {
        let tokens = faktura_layout::tokenize_embedded::tokenize(&lopdf_doc, page_id, page.height)?;
        page_text_quality.push(text_quality(&tokens).score as f32);
        page.tokens = tokens;
        page.rows = group_rows(page);
        page.segments = identify_segments(page);
    }

    Ok(EmbeddedPrepared { document, page_text_quality })
}

/// One page's OCR outcome: the metrics used for routing decisions plus the
/// rendered image, retained for a possible vision-mode AI fallback
/// (spec §4.12).
pub struct OcrPageQuality {
    pub dpi_used: u32,
    pub mean: f32,
    pub median: f32,
    pub low_conf_fraction: f32,
    pub text_quality: f32,
    pub image_handle: Vec<u8>,
}

pub struct OcrPrepared {
    pub document: Document,
    pub page_quality: Vec<OcrPageQuality>,
}

/// Renders and OCRs every page described by `geometry`, retrying once at
/// `retry_dpi` when the baseline pass's mean confidence is too low, per
/// [`should_retry_at_higher_dpi`] (spec §4.11: "after baseline 300 OCR, if
/// ocr_mean<55 re-render at 400 and re-OCR once; max one retry per page").
///
/// # Errors
/// Returns [`FakturaError::Render`]/[`FakturaError::Ocr`] if no renderer or
/// OCR engine is configured, or if either fails on a page.
pub fn prepare_ocr(path: &str, geometry: &Document, ctx: &PipelineContext) -> Result<OcrPrepared> {
    let renderer = ctx.renderer.as_deref().ok_or_else(|| FakturaError::Render("no page renderer configured".to_string()))?;
    let ocr_engine = ctx.ocr_engine.as_deref().ok_or_else(|| FakturaError::Ocr("no OCR engine configured".to_string()))?;

    let mut pages = Vec::with_capacity(geometry.pages.len());
    let mut page_quality = Vec::with_capacity(geometry.pages.len());

    for geom_page in &geometry.pages {
        let mut page = Page::new(geom_page.index, geom_page.width, geom_page.height);
        let (tokens, quality) = render_and_ocr(renderer, ocr_engine, path, geom_page.index - 1, ctx)?;
        page.tokens = tokens;
        page.rows = group_rows(&page);
        page.segments = identify_segments(&page);
        pages.push(page);
        page_quality.push(quality);
    }

    Ok(OcrPrepared { document: Document::new(path.to_string(), pages), page_quality })
}

fn render_and_ocr(
    renderer: &dyn faktura_layout::PageRenderer,
    ocr_engine: &dyn faktura_layout::OcrEngine,
    path: &str,
    page_index: usize,
    ctx: &PipelineContext,
) -> Result<(Vec<Token>, OcrPageQuality)> {
    let rendered = renderer.render(path, page_index, ctx.config.baseline_dpi)?;
    let tokens = faktura_layout::tokenize_ocr::tokenize(ocr_engine, &rendered)?;
    let metrics = ocr_metrics(&tokens);

    let (final_tokens, final_metrics, final_rendered, dpi_used) = if should_retry_at_higher_dpi(&metrics) {
        let retry_rendered = renderer.render(path, page_index, ctx.config.retry_dpi)?;
        let retry_tokens = faktura_layout::tokenize_ocr::tokenize(ocr_engine, &retry_rendered)?;
        let retry_metrics = ocr_metrics(&retry_tokens);
        (retry_tokens, retry_metrics, retry_rendered, ctx.config.retry_dpi)
    } else {
        (tokens, metrics, rendered, ctx.config.baseline_dpi)
    };

    Ok((
        final_tokens.clone(),
        OcrPageQuality {
            dpi_used,
            mean: final_metrics.mean,
            median: final_metrics.median,
            low_conf_fraction: final_metrics.low_conf_fraction,
            text_quality: text_quality(&final_tokens).score as f32,
            image_handle: final_rendered.image_handle,
        },
    ))
}
