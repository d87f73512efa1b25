//! `PipelineContext`/`PipelineConfig` (spec §9 REDESIGN FLAG: "global
//! mutable state (AI config, calibration cache)" becomes a struct passed by
//! reference through every stage rather than a module-level singleton).

use std::sync::Arc;

use faktura_ai::AiProvider;
use faktura_calibrate::IsotonicModel;
use faktura_layout::{OcrEngine, PageRenderer};
use faktura_learn::PatternStore;

/// Tunable thresholds and knobs that govern pipeline behavior, loaded once
/// at process start (spec §4.11–§4.13 thresholds; §6 CLI flags).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Baseline OCR render DPI (spec §4.11: 300).
    pub baseline_dpi: u32,
    /// Retry render DPI when OCR mean confidence is low (spec §4.11: 400).
    pub retry_dpi: u32,
    /// Calibrated-confidence hard gate for both critical fields (spec §4.13: 0.95).
    pub hard_gate_confidence: f32,
    /// Retry wrapper target confidence (spec §4.12: 0.90).
    pub retry_target_confidence: f32,
    /// Maximum retry attempts for the total-amount wrapper (spec §4.12: 5).
    pub max_retry_attempts: u32,
    /// Whether AI fallback is enabled at all; `false` short-circuits every
    /// AI-trigger check regardless of confidence (spec §4.10: "if AI is
    /// enabled and key present").
    pub ai_enabled: bool,
    /// Number of rayon workers for file-level batch processing; `None` uses
    /// `num_cpus::get()` (spec §5).
    pub worker_count: Option<usize>,
    /// Abort the whole run on the first per-file fatal error instead of
    /// continuing and recording it in the errors sidecar (spec §6 `--strict`).
    pub strict: bool,
    /// Minimum acceptable text-quality score for a source to be trusted
    /// outright (spec §4.11/§4.12: 0.5).
    pub text_quality_threshold: f32,
    /// Minimum OCR median confidence for the OCR path to be accepted
    /// outright (spec §4.11: 70).
    pub ocr_median_threshold: f32,
    /// Maximum longest-side pixel count for an image handed to the vision
    /// fallback (spec §6: 4096).
    pub vision_max_longest_side_px: u32,
    /// Maximum file size, in bytes, for an image handed to the vision
    /// fallback (spec §6: 20 MB).
    pub vision_max_file_size_bytes: u64,
    /// Maximum age, in days, before an unused learned pattern is eligible
    /// for cleanup (spec §4.9: default 90).
    pub pattern_store_max_age_days: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            baseline_dpi: 300,
            retry_dpi: 400,
            hard_gate_confidence: 0.95,
            retry_target_confidence: 0.90,
            max_retry_attempts: 5,
            ai_enabled: false,
            worker_count: None,
            strict: false,
            text_quality_threshold: 0.5,
            ocr_median_threshold: 70.0,
            vision_max_longest_side_px: 4096,
            vision_max_file_size_bytes: 20 * 1024 * 1024,
            pattern_store_max_age_days: 90,
        }
    }
}

/// Everything a pipeline stage needs, passed by shared reference. No stage
/// reaches for global/static state; everything it depends on arrives here.
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub calibration: Option<Arc<IsotonicModel>>,
    pub pattern_store: Option<Arc<PatternStore>>,
    pub ai_provider: Option<Arc<dyn AiProvider>>,
    pub renderer: Option<Arc<dyn PageRenderer>>,
    pub ocr_engine: Option<Arc<dyn OcrEngine>>,
}

impl PipelineContext {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config, calibration: None, pattern_store: None, ai_provider: None, renderer: None, ocr_engine: None }
    }

    #[must_use]
    pub fn with_calibration(mut self, model: Arc<IsotonicModel>) -> Self {
        self.calibration = Some(model);
        self
    }

    #[must_use]
    pub fn with_pattern_store(mut self, store: Arc<PatternStore>) -> Self {
        self.pattern_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_ai_provider(mut self, provider: Arc<dyn AiProvider>) -> Self {
        self.ai_provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    #[must_use]
    pub fn with_ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr_engine = Some(engine);
        self
    }

    /// Whether the OCR path can run at all right now (both a renderer and an
    /// OCR engine are configured).
    #[must_use]
    pub fn ocr_available(&self) -> bool {
        self.renderer.is_some() && self.ocr_engine.is_some()
    }

    /// Calibrates a raw score using the loaded model, or returns it unchanged
    /// if no model is present (spec §4.8: "no component is allowed to fail
    /// due to its absence").
    #[must_use]
    pub fn calibrate(&self, raw_score: f32) -> f32 {
        self.calibration.as_deref().map_or(raw_score, |m| m.calibrate(f64::from(raw_score)) as f32)
    }

    /// Whether AI fallback may be invoked at all right now.
    #[must_use]
    pub fn ai_available(&self) -> bool {
        self.config.ai_enabled && self.ai_provider.is_some()
    }

    /// The effective rayon worker count for batch processing.
    #[must_use]
    pub fn effective_worker_count(&self) -> usize {
        self.config.worker_count.unwrap_or_else(num_cpus::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_thresholds() {
        let config = PipelineConfig::default();
        assert_eq!(config.baseline_dpi, 300);
        assert_eq!(config.retry_dpi, 400);
        assert!((config.hard_gate_confidence - 0.95).abs() < f32::EPSILON);
        assert!((config.retry_target_confidence - 0.90).abs() < f32::EPSILON);
        assert_eq!(config.max_retry_attempts, 5);
    }

    #[test]
    fn calibrate_falls_back_to_identity_without_a_model() {
        let ctx = PipelineContext::new(PipelineConfig::default());
        assert!((ctx.calibrate(0.73) - 0.73).abs() < f32::EPSILON);
    }

    #[test]
    fn ai_unavailable_without_enabled_flag_even_with_provider() {
        struct Stub;
        impl AiProvider for Stub {
            fn extract_total_text(
                &self,
                _: &str,
                _: f64,
                _: &[faktura_ai::TotalCandidate],
                _: &faktura_ai::PageContext,
            ) -> Option<faktura_ai::AiTotalResult> {
                None
            }
            fn extract_total_vision(&self, _: &[u8], _: Option<&faktura_ai::PageContext>) -> Option<faktura_ai::AiTotalResult> {
                None
            }
        }

        let ctx = PipelineContext::new(PipelineConfig::default()).with_ai_provider(Arc::new(Stub));
        assert!(!ctx.ai_available());
    }

    #[test]
    fn effective_worker_count_defaults_to_cpu_count() {
        let ctx = PipelineContext::new(PipelineConfig::default());
        assert_eq!(ctx.effective_worker_count(), num_cpus::get());
    }
}
