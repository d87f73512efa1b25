//! The AI fallback provider trait (spec §4.10): two capabilities, text-mode
//! and vision-mode, both synchronous and both degrading to `None` on any
//! failure so the pipeline can always continue with the heuristic result.

use serde::{Deserialize, Serialize};

/// Context drawn from a candidate's location on the page, passed through to
/// the prompt to help the model disambiguate (spec §4.10: "page_context is
/// built from the last page's segments, ordered by top-Y, joined with
/// segment headers").
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub text: String,
}

/// One amount candidate surfaced to the model, so it can choose among the
/// heuristic scorer's top findings rather than starting from nothing.
#[derive(Debug, Clone, Serialize)]
pub struct TotalCandidate {
    pub raw_text: String,
    pub amount: f64,
    pub calibrated_score: f32,
}

/// The AI adapter's answer for a total-amount extraction attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct AiTotalResult {
    pub amount: f64,
    pub confidence: f32,
    pub validation_passed: bool,
    pub reasoning: Option<String>,
}

/// Abstract AI fallback capability (spec §4.10). Implementors must honor a
/// hard timeout and must never panic on a malformed response — every failure
/// mode collapses to `None`, leaving the caller to retain the heuristic
/// result.
pub trait AiProvider: Send + Sync {
    /// Text-mode extraction: footer text plus the heuristic's own evidence.
    fn extract_total_text(
        &self,
        footer_text: &str,
        lines_sum: f64,
        candidates: &[TotalCandidate],
        page_context: &PageContext,
    ) -> Option<AiTotalResult>;

    /// Vision-mode extraction: a rendered page image, used when text quality
    /// on both embedded and OCR sources falls below threshold (spec §4.12).
    fn extract_total_vision(&self, image_handle: &[u8], page_context: Option<&PageContext>) -> Option<AiTotalResult>;
}

/// Caps the candidate list passed to the provider at 10 (spec §4.7/§4.10:
/// "top-10 candidates").
pub const MAX_CANDIDATES: usize = 10;

/// Trims a candidate list to the first [`MAX_CANDIDATES`] entries, assuming
/// the caller has already sorted by descending score.
#[must_use]
pub fn top_candidates(candidates: &[TotalCandidate]) -> &[TotalCandidate] {
    &candidates[..candidates.len().min(MAX_CANDIDATES)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_candidates_caps_at_ten() {
        let candidates: Vec<TotalCandidate> = (0..15)
            .map(|i| TotalCandidate { raw_text: format!("c{i}"), amount: i as f64, calibrated_score: 0.5 })
            .collect();
        assert_eq!(top_candidates(&candidates).len(), MAX_CANDIDATES);
    }

    #[test]
    fn top_candidates_passes_through_shorter_lists() {
        let candidates = vec![TotalCandidate { raw_text: "c0".into(), amount: 1.0, calibrated_score: 0.9 }];
        assert_eq!(top_candidates(&candidates).len(), 1);
    }
}
