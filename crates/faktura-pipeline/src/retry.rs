//! Footer/total resolution, AI routing, and the retry wrapper (spec §4.7
//! "AI trigger"/"post-AI acceptance", §4.10 AI fallback, §4.12 retry/AI
//! routing). `faktura_extract::footer` only produces the heuristic candidate
//! set; everything from pattern boosting onward — calibration, the AI
//! trigger, and the acceptance rule — lives here because it needs the
//! calibration model, pattern store, and AI adapter the extractor crate
//! cannot depend on.

use chrono::Utc;
use faktura_core::{BBox, CandidateScore, ExtractionSource, InvoiceFooter, Page, Segment, Traceability, ValidationResult};
use faktura_extract::{trace_of, FooterCandidate};
use faktura_ai::{top_candidates as ai_top_candidates, AiTotalResult, PageContext, TotalCandidate};
use faktura_learn::{apply_boost, layout_hash, match_pattern, normalize_supplier, record_use};

use crate::context::PipelineContext;

/// Minimum text-quality score, on either source, below which AI routing
/// prefers vision mode over text mode (spec §4.12).
const VISION_ROUTING_TEXT_QUALITY_THRESHOLD: f32 = 0.5;

/// Outcome of resolving the total amount for one invoice on one source path.
pub struct FooterResolution {
    pub footer: InvoiceFooter,
    /// Overrides `reconcile::reconcile`'s normal arithmetic check when the AI
    /// adapter found Σ lines implausible (spec §4.7: "mark validation passed").
    pub validation_override: Option<ValidationResult>,
    pub reason_flags: Vec<String>,
    pub vision_reason: Option<String>,
    pub ai_invocations: u32,
    /// Top-5 calibrated candidates, persisted for the review UI (spec §4.7,
    /// §4.14).
    pub top_candidates: Vec<CandidateScore>,
}

fn footer_signature(page: &Page, segment: &Segment) -> String {
    page.segment_rows(segment).iter().map(|r| r.text.as_str()).collect::<Vec<_>>().join("|")
}

fn apply_pattern_boost(
    page: &Page,
    segment: &Segment,
    candidates: &mut [FooterCandidate],
    supplier_name: Option<&str>,
    ctx: &PipelineContext,
) {
    let Some(store) = ctx.pattern_store.as_deref() else { return };
    let supplier = supplier_name.unwrap_or("");
    let supplier_normalized = normalize_supplier(supplier);
    let signature = footer_signature(page, segment);
    let hash = layout_hash(&supplier_normalized, &signature);

    for candidate in candidates {
        let Some(&bbox) = candidate.matched_bboxes.first() else { continue };
        match match_pattern(store, &supplier_normalized, "total_amount", &bbox, &hash) {
            Ok(Some(m)) => {
                candidate.score = apply_boost(candidate.score, m.boost_weight);
                let _ = record_use(store, m.pattern_id, Utc::now());
            }
            Ok(None) => {}
            Err(e) => log::warn!("pattern store lookup failed, proceeding without boost: {e}"),
        }
    }
}

/// Builds the page-context text handed to the AI adapter (spec §4.10: "built
/// from the last page's segments, ordered by top-Y, joined with segment
/// headers; visibly garbled rows are skipped").
#[must_use]
pub fn build_page_context(page: &Page) -> PageContext {
    let mut segments = page.segments.clone();
    segments.sort_by(|a, b| a.y_top.partial_cmp(&b.y_top).unwrap());
    let text = segments
        .iter()
        .map(|segment| {
            let header = format!("[{:?}]", segment.kind);
            let rows: Vec<&str> =
                page.segment_rows(segment).iter().map(|r| r.text.as_str()).filter(|t| !is_garbled(t)).collect();
            format!("{header}\n{}", rows.join("\n"))
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    PageContext { text }
}

fn is_garbled(text: &str) -> bool {
    !text.is_empty() && text.chars().filter(|c| !c.is_alphanumeric() && !c.is_whitespace()).count() * 2 > text.len()
}

fn implausible_lines_sum(ai_amount: f64, lines_sum: f64) -> bool {
    (ai_amount - lines_sum).abs() > (500.0_f64).max(0.15 * ai_amount) || (lines_sum < 100.0 && ai_amount > 1000.0)
}

/// Applies the post-AI acceptance rule (spec §4.7) against the current
/// heuristic top score. Returns the effective confidence/validation pair to
/// use if the AI result is accepted.
fn accept_ai_result(ai: &AiTotalResult, heuristic_top_score: f32, lines_sum: f64, candidates: &[FooterCandidate]) -> Option<(f32, bool)> {
    let mut confidence = ai.confidence;
    let mut validation_passed = ai.validation_passed;

    if implausible_lines_sum(ai.amount, lines_sum) {
        validation_passed = true;
        confidence = (confidence + 0.10).min(1.0);
        let exact_match = candidates.iter().any(|c| (c.value - ai.amount).abs() < 1e-6);
        if exact_match {
            confidence = (confidence + 0.10).min(1.0);
        }
    }

    let accept = confidence > heuristic_top_score || (validation_passed && (confidence - heuristic_top_score).abs() <= 0.05);
    accept.then_some((confidence, validation_passed))
}

/// Resolves the total amount for one invoice on one source path: scores
/// heuristic candidates, applies any matching pattern boost before
/// calibration (spec §4.9), then triggers and evaluates an AI fallback per
/// the routing and acceptance rules (spec §4.7, §4.12).
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn resolve_total(
    page: &Page,
    footer_segment: &Segment,
    lines_sum: f64,
    source: ExtractionSource,
    image_handle: Option<&[u8]>,
    pdf_text_quality: f32,
    ocr_text_quality: f32,
    supplier_name: Option<&str>,
    ctx: &PipelineContext,
) -> FooterResolution {
    let mut candidates = faktura_extract::score_footer_candidates(page, footer_segment, lines_sum);
    apply_pattern_boost(page, footer_segment, &mut candidates, supplier_name, ctx);
    for c in &mut candidates {
        c.score = ctx.calibrate(c.score);
    }
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());

    let top_candidates: Vec<CandidateScore> =
        candidates.iter().take(5).map(|c| CandidateScore { value: format!("{:.2}", c.value), calibrated_score: c.score }).collect();

    let mut reason_flags = Vec::new();
    let mut vision_reason = None;
    let mut ai_invocations = 0;
    let mut validation_override = None;

    let heuristic_top_score = candidates.first().map_or(0.0, |c| c.score);
    let hard_gate = ctx.config.hard_gate_confidence;

    let mut footer = build_footer_from_heuristic(&candidates, source);

    let ai_should_trigger = ctx.ai_available() && (candidates.is_empty() || heuristic_top_score < hard_gate);

    if ai_should_trigger {
        let page_context = build_page_context(page);
        let use_vision = pdf_text_quality < VISION_ROUTING_TEXT_QUALITY_THRESHOLD
            && ocr_text_quality < VISION_ROUTING_TEXT_QUALITY_THRESHOLD
            && image_handle.is_some();

        let ai_result = if use_vision {
            vision_reason = Some(format!(
                "pdf_text_quality<{VISION_ROUTING_TEXT_QUALITY_THRESHOLD} and ocr_text_quality<{VISION_ROUTING_TEXT_QUALITY_THRESHOLD}"
            ));
            reason_flags.push("vision_triggered".to_string());
            ai_invocations += 1;
            ctx.ai_provider.as_deref().and_then(|p| p.extract_total_vision(image_handle.unwrap(), Some(&page_context)))
        } else {
            reason_flags.push("text_ai_triggered".to_string());
            ai_invocations += 1;
            let footer_text = page_context.text.clone();
            let ai_candidates: Vec<TotalCandidate> = candidates
                .iter()
                .map(|c| TotalCandidate { raw_text: c.excerpt.clone(), amount: c.value, calibrated_score: c.score })
                .collect();
            let trimmed = ai_top_candidates(&ai_candidates);
            ctx.ai_provider.as_deref().and_then(|p| p.extract_total_text(&footer_text, lines_sum, trimmed, &page_context))
        };

        if let Some(ai) = ai_result {
            if let Some((confidence, validation_passed)) = accept_ai_result(&ai, heuristic_top_score, lines_sum, &candidates) {
                footer.total_amount = Some(ai.amount);
                footer.total_amount_confidence = confidence;
                footer.total_amount_source = Some(ExtractionSource::Ai);
                footer.total_amount_trace = Some(Traceability {
                    page_index: page.index,
                    bbox: candidates.first().map_or_else(|| BBox::new(0.0, 0.0, 0.0, 0.0), |c| BBox::union_all(&c.matched_bboxes)),
                    source: ExtractionSource::Ai,
                    raw_text: ai.reasoning.clone().unwrap_or_default(),
                });
                if validation_passed && implausible_lines_sum(ai.amount, lines_sum) {
                    validation_override =
                        Some(ValidationResult { lines_sum, footer_total: Some(ai.amount), difference: Some(ai.amount - lines_sum), within_tolerance: true });
                }
            } else {
                reason_flags.push("ai_result_rejected".to_string());
            }
        } else {
            reason_flags.push("ai_unavailable_or_failed".to_string());
        }
    }

    if heuristic_top_score < hard_gate {
        reason_flags.push(format!("total_confidence<{hard_gate}"));
    }

    FooterResolution { footer, validation_override, reason_flags, vision_reason, ai_invocations, top_candidates }
}

fn build_footer_from_heuristic(candidates: &[FooterCandidate], source: ExtractionSource) -> InvoiceFooter {
    let Some(top) = candidates.first() else {
        return InvoiceFooter {
            total_amount: None,
            total_amount_confidence: 0.0,
            total_amount_trace: None,
            total_amount_source: None,
            subtotal_amount: None,
            vat_amount: None,
            currency: None,
        };
    };

    let mut trace = trace_of(top);
    trace.source = source;

    InvoiceFooter {
        total_amount: Some(top.value),
        total_amount_confidence: top.score,
        total_amount_trace: Some(trace),
        total_amount_source: Some(source),
        subtotal_amount: None,
        vat_amount: None,
        currency: None,
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
    fn resolves_total_from_heuristic_without_ai() {
        let (page, segment) = footer_page(&["Att betala 500,00"]);
        let ctx = PipelineContext::new(crate::context::PipelineConfig::default());
        let resolution = resolve_total(&page, &segment, 500.0, ExtractionSource::EmbeddedText, None, 0.9, 0.0, None, &ctx);
        assert_eq!(resolution.footer.total_amount, Some(500.0));
        assert_eq!(resolution.ai_invocations, 0);
    }

    #[test]
    fn no_candidates_yields_empty_footer() {
        let (page, segment) = footer_page(&[]);
        let ctx = PipelineContext::new(crate::context::PipelineConfig::default());
        let resolution = resolve_total(&page, &segment, 0.0, ExtractionSource::EmbeddedText, None, 0.9, 0.0, None, &ctx);
        assert!(resolution.footer.total_amount.is_none());
    }

    #[test]
    fn implausible_lines_sum_detects_large_relative_gap() {
        assert!(implausible_lines_sum(12_500.0, 50.0));
        assert!(!implausible_lines_sum(12_500.0, 12_480.0));
    }

    #[test]
    fn post_ai_acceptance_prefers_higher_confidence() {
        let ai = AiTotalResult { amount: 500.0, confidence: 0.9, validation_passed: true, reasoning: None };
        let accepted = accept_ai_result(&ai, 0.5, 500.0, &[]);
        assert!(accepted.is_some());
    }

    #[test]
    fn post_ai_acceptance_rejects_lower_confidence_failing_validation() {
        let ai = AiTotalResult { amount: 500.0, confidence: 0.2, validation_passed: false, reasoning: None };
        let accepted = accept_ai_result(&ai, 0.9, 500.0, &[]);
        assert!(accepted.is_none());
    }
}
