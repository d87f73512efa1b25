//! Compare & Choose (spec §4.11): runs the full per-invoice pipeline once
//! per source (embedded text, OCR) and selects the better result by the
//! three-rule ladder, recording why on both paths.

use faktura_core::{
    CandidateScore, ExtractionDetail, ExtractionSource, InvoiceFooter, InvoiceHeader, InvoiceLine, Status,
    ValidationResult, VirtualInvoice,
};
use faktura_layout::InvoiceRange;

use crate::context::PipelineContext;
use crate::document::{EmbeddedPrepared, OcrPrepared};
use crate::extract::{extract_header, extract_lines};
use crate::reconcile::{assign_status, lines_sum, reconcile, StatusInputs};
use crate::retry::resolve_total;

/// One source path's complete result for one invoice (spec §4.11).
struct PathOutcome {
    source: ExtractionSource,
    header: InvoiceHeader,
    lines: Vec<InvoiceLine>,
    footer: InvoiceFooter,
    validation: ValidationResult,
    tokenization_failed: bool,
    reason_flags: Vec<String>,
    detail: ExtractionDetail,
    top_candidates: Vec<CandidateScore>,
    ai_invocations: u32,
}

fn pages_in_range<'a, T>(range: InvoiceRange, items: &'a [T], document_pages: &[faktura_core::Page]) -> Vec<&'a T> {
    document_pages
        .iter()
        .enumerate()
        .filter(|(_, p)| p.index >= range.page_start && p.index <= range.page_end)
        .map(|(i, _)| &items[i])
        .collect()
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() { 0.0 } else { values.iter().sum::<f32>() / values.len() as f32 }
}

fn footer_page_in_range<'a>(document: &'a faktura_core::Document, range: InvoiceRange) -> Option<&'a faktura_core::Page> {
    document
        .pages
        .iter()
        .filter(|p| p.index >= range.page_start && p.index <= range.page_end)
        .rev()
        .find(|p| p.segments.iter().any(|s| s.kind == faktura_core::SegmentKind::Footer))
}

fn run_embedded_path(
    embedded: &EmbeddedPrepared,
    ocr_text_quality: f32,
    range: InvoiceRange,
    path: &str,
    ctx: &PipelineContext,
) -> PathOutcome {
    let document = &embedded.document;
    let quality_slice = pages_in_range(range, &embedded.page_text_quality, &document.pages);
    let pdf_text_quality = mean(&quality_slice.into_iter().copied().collect::<Vec<_>>());

    let header = extract_header(document, range, ctx);
    let lines = extract_lines(document, range);
    let sum = lines_sum(&lines);

    let token_total: usize = document
        .pages
        .iter()
        .filter(|p| p.index >= range.page_start && p.index <= range.page_end)
        .map(|p| p.tokens.len())
        .sum();

    let Some(footer_page) = footer_page_in_range(document, range) else {
        let footer = empty_footer();
        let validation = reconcile(None, &lines);
        return PathOutcome {
            source: ExtractionSource::EmbeddedText,
            header,
            lines,
            footer,
            validation,
            tokenization_failed: token_total == 0,
            reason_flags: vec!["no_footer_segment".to_string()],
            detail: detail_for(ExtractionSource::EmbeddedText, None, pdf_text_quality, ocr_text_quality, None, None, 0.0, vec!["no_footer_segment".to_string()], None),
            top_candidates: vec![],
            ai_invocations: 0,
        };
    };
    let footer_segment = footer_page.segments.iter().find(|s| s.kind == faktura_core::SegmentKind::Footer).unwrap();

    let resolution = resolve_total(
        footer_page,
        footer_segment,
        sum,
        ExtractionSource::EmbeddedText,
        None,
        pdf_text_quality,
        ocr_text_quality,
        header.supplier_name.as_deref(),
        ctx,
    );

    let mut reason_flags = resolution.reason_flags.clone();
    if pdf_text_quality < ctx.config.text_quality_threshold {
        reason_flags.push(format!("pdf_text_quality<{}", ctx.config.text_quality_threshold));
    }

    let validation = resolution.validation_override.clone().unwrap_or_else(|| reconcile(resolution.footer.total_amount, &lines));

    PathOutcome {
        source: ExtractionSource::EmbeddedText,
        header,
        lines,
        footer: resolution.footer,
        validation,
        tokenization_failed: token_total == 0,
        detail: detail_for(
            ExtractionSource::EmbeddedText,
            None,
            pdf_text_quality,
            ocr_text_quality,
            None,
            None,
            0.0,
            reason_flags.clone(),
            resolution.vision_reason.clone(),
        ),
        reason_flags,
        top_candidates: resolution.top_candidates,
        ai_invocations: resolution.ai_invocations,
    }
    .with_path(path)
}

fn run_ocr_path(ocr: &OcrPrepared, pdf_text_quality: f32, range: InvoiceRange, path: &str, ctx: &PipelineContext) -> PathOutcome {
    let document = &ocr.document;
    let quality_slice = pages_in_range(range, &ocr.page_quality, &document.pages);
    let ocr_text_quality = mean(&quality_slice.iter().map(|q| q.text_quality).collect::<Vec<_>>());
    let ocr_median = mean(&quality_slice.iter().map(|q| q.median).collect::<Vec<_>>());
    let ocr_mean = mean(&quality_slice.iter().map(|q| q.mean).collect::<Vec<_>>());
    let low_conf_fraction = mean(&quality_slice.iter().map(|q| q.low_conf_fraction).collect::<Vec<_>>());
    let dpi_used = quality_slice.first().map(|q| q.dpi_used);

    let header = extract_header(document, range, ctx);
    let lines = extract_lines(document, range);
    let sum = lines_sum(&lines);

    let token_total: usize = document
        .pages
        .iter()
        .filter(|p| p.index >= range.page_start && p.index <= range.page_end)
        .map(|p| p.tokens.len())
        .sum();

    let Some(footer_page) = footer_page_in_range(document, range) else {
        let footer = empty_footer();
        let validation = reconcile(None, &lines);
        return PathOutcome {
            source: ExtractionSource::Ocr,
            header,
            lines,
            footer,
            validation,
            tokenization_failed: token_total == 0,
            reason_flags: vec!["no_footer_segment".to_string()],
            detail: detail_for(ExtractionSource::Ocr, dpi_used, pdf_text_quality, ocr_text_quality, Some(ocr_mean), Some(ocr_median), low_conf_fraction, vec!["no_footer_segment".to_string()], None),
            top_candidates: vec![],
            ai_invocations: 0,
        };
    };
    let footer_segment = footer_page.segments.iter().find(|s| s.kind == faktura_core::SegmentKind::Footer).unwrap();
    let page_image = quality_slice.last().map(|q| q.image_handle.as_slice());

    let resolution = resolve_total(
        footer_page,
        footer_segment,
        sum,
        ExtractionSource::Ocr,
        page_image,
        pdf_text_quality,
        ocr_text_quality,
        header.supplier_name.as_deref(),
        ctx,
    );

    let mut reason_flags = resolution.reason_flags.clone();
    if ocr_median < ctx.config.ocr_median_threshold {
        reason_flags.push(format!("ocr_median_conf<{}", ctx.config.ocr_median_threshold));
    }
    if ocr_text_quality < ctx.config.text_quality_threshold {
        reason_flags.push(format!("ocr_text_quality<{}", ctx.config.text_quality_threshold));
    }

    let validation = resolution.validation_override.clone().unwrap_or_else(|| reconcile(resolution.footer.total_amount, &lines));

    PathOutcome {
        source: ExtractionSource::Ocr,
        header,
        lines,
        footer: resolution.footer,
        validation,
        tokenization_failed: token_total == 0,
        detail: detail_for(
            ExtractionSource::Ocr,
            dpi_used,
            pdf_text_quality,
            ocr_text_quality,
            Some(ocr_mean),
            Some(ocr_median),
            low_conf_fraction,
            reason_flags.clone(),
            resolution.vision_reason.clone(),
        ),
        reason_flags,
        top_candidates: resolution.top_candidates,
        ai_invocations: resolution.ai_invocations,
    }
    .with_path(path)
}

impl PathOutcome {
    fn with_path(self, _path: &str) -> Self {
        self
    }
}

fn empty_footer() -> InvoiceFooter {
    InvoiceFooter {
        total_amount: None,
        total_amount_confidence: 0.0,
        total_amount_trace: None,
        total_amount_source: None,
        subtotal_amount: None,
        vat_amount: None,
        currency: None,
    }
}

#[allow(clippy::too_many_arguments)]
fn detail_for(
    source: ExtractionSource,
    dpi_used: Option<u32>,
    pdf_text_quality: f32,
    ocr_text_quality: f32,
    ocr_mean: Option<f32>,
    ocr_median: Option<f32>,
    low_conf_fraction: f32,
    reason_flags: Vec<String>,
    vision_reason: Option<String>,
) -> ExtractionDetail {
    ExtractionDetail {
        method_used: source,
        dpi_used,
        pdf_text_quality,
        ocr_text_quality,
        ocr_mean,
        ocr_median,
        low_conf_fraction,
        reason_flags,
        vision_reason,
    }
}

/// Final outcome of comparing both source paths for one invoice.
pub struct ComparisonOutcome {
    pub invoice: VirtualInvoice,
    pub detail: ExtractionDetail,
    pub top_candidates: Vec<CandidateScore>,
}

fn critical_confidences_pass(header: &InvoiceHeader, footer: &InvoiceFooter, gate: f32) -> bool {
    header.invoice_number.is_some() && header.invoice_number_confidence >= gate && footer.total_amount.is_some() && footer.total_amount_confidence >= gate
}

/// The invoice-level extraction source (spec §3: `extraction_source`) is the
/// winning path's source, unless the AI fallback actually resolved the total
/// — in which case the invoice is AI-sourced regardless of which path it rode
/// in on (spec §4.14, §6 export column).
fn effective_source(outcome: &PathOutcome) -> ExtractionSource {
    if outcome.footer.total_amount_source == Some(ExtractionSource::Ai) {
        ExtractionSource::Ai
    } else {
        outcome.source
    }
}

/// Selects between the embedded-text and OCR paths by the three-rule ladder
/// (spec §4.11), falling back to embedded when OCR was never run.
fn choose(embedded: PathOutcome, ocr: Option<PathOutcome>, ctx: &PipelineContext) -> PathOutcome {
    let gate = ctx.config.hard_gate_confidence;

    if critical_confidences_pass(&embedded.header, &embedded.footer, gate)
        && embedded.detail.pdf_text_quality >= ctx.config.text_quality_threshold
    {
        return embedded;
    }

    if let Some(ref ocr_outcome) = ocr {
        let ocr_median = ocr_outcome.detail.ocr_median.unwrap_or(0.0);
        if critical_confidences_pass(&ocr_outcome.header, &ocr_outcome.footer, gate)
            && ocr_median >= ctx.config.ocr_median_threshold
            && ocr_outcome.detail.ocr_text_quality >= ctx.config.text_quality_threshold
        {
            return ocr.unwrap();
        }
    }

    let Some(ocr_outcome) = ocr else { return embedded };

    if ocr_outcome.validation.within_tolerance && !embedded.validation.within_tolerance {
        return ocr_outcome;
    }
    if embedded.validation.within_tolerance && !ocr_outcome.validation.within_tolerance {
        return embedded;
    }
    if ocr_outcome.footer.total_amount_confidence > embedded.footer.total_amount_confidence {
        return ocr_outcome;
    }
    if embedded.footer.total_amount_confidence > ocr_outcome.footer.total_amount_confidence {
        return embedded;
    }
    if ocr_outcome.header.invoice_number_confidence > embedded.header.invoice_number_confidence {
        return ocr_outcome;
    }
    embedded
}

/// Runs both paths for one invoice range and selects the better result
/// (spec §4.11). `ocr` is `None` when no renderer/OCR engine is configured.
#[must_use]
pub fn compare_paths(
    embedded: &EmbeddedPrepared,
    ocr: Option<&OcrPrepared>,
    range: InvoiceRange,
    path: &str,
    virtual_id: String,
    ctx: &PipelineContext,
) -> ComparisonOutcome {
    let embedded_quality_slice =
        pages_in_range(range, &embedded.page_text_quality, &embedded.document.pages).into_iter().copied().collect::<Vec<_>>();
    let pdf_text_quality = mean(&embedded_quality_slice);

    let ocr_text_quality = ocr
        .map(|o| mean(&pages_in_range(range, &o.page_quality, &o.document.pages).iter().map(|q| q.text_quality).collect::<Vec<_>>()))
        .unwrap_or(0.0);

    let embedded_outcome = run_embedded_path(embedded, ocr_text_quality, range, path, ctx);
    let ocr_outcome = ocr.map(|o| run_ocr_path(o, pdf_text_quality, range, path, ctx));

    let chosen = choose(embedded_outcome, ocr_outcome, ctx);

    let status_inputs = StatusInputs {
        invoice_number_confidence: chosen.header.invoice_number_confidence,
        invoice_number_present: chosen.header.invoice_number.is_some(),
        total_confidence: chosen.footer.total_amount_confidence,
        total_present: chosen.footer.total_amount.is_some(),
        traceabilities_present: chosen.header.invoice_number_trace.is_some() && chosen.footer.total_amount_trace.is_some(),
        tokenization_failed: chosen.tokenization_failed,
    };

    let (status, status_reasons) = assign_status(&status_inputs, &chosen.validation, ctx.config.hard_gate_confidence);

    let mut detail = chosen.detail;
    detail.reason_flags.extend(status_reasons);

    let invoice = VirtualInvoice {
        virtual_id,
        source_path: path.to_string(),
        page_start: range.page_start,
        page_end: range.page_end,
        header: chosen.header,
        lines: chosen.lines,
        footer: chosen.footer,
        validation: chosen.validation,
        status,
        extraction_source: effective_source(&chosen),
        ai_invocations: chosen.ai_invocations,
    };

    ComparisonOutcome { invoice, detail, top_candidates: chosen.top_candidates }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faktura_core::Document;

    fn empty_embedded(path: &str) -> EmbeddedPrepared {
        EmbeddedPrepared { document: Document::new(path.to_string(), vec![]), page_text_quality: vec![] }
    }

    #[test]
    fn comparison_with_no_pages_fails_with_missing_total() {
        let embedded = empty_embedded("f.pdf");
        let ctx = PipelineContext::new(crate::context::PipelineConfig::default());
        let outcome = compare_paths(&embedded, None, InvoiceRange { page_start: 1, page_end: 1 }, "f.pdf", "f.pdf#1".to_string(), &ctx);
        assert_eq!(outcome.invoice.status, Status::Failed);
    }
}
