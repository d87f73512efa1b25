//! Configuration loading (spec §6): thresholds and paths are read at process
//! start from a TOML profile and environment variables, with CLI flags
//! taking final precedence. Shape grounded on `docling-cli`'s user/project
//! config discovery and merge order (CLI args > project config > user
//! config > built-in defaults) plus env-var overlay in between.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};

/// On-disk configuration shape for `.faktura.toml`. Every field is optional
/// so a profile can set only the knobs it cares about; unset fields fall
/// through to the environment, then to [`RawConfig::default`]'s defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub ai_enabled: Option<bool>,
    pub ai_provider: Option<String>,
    pub ai_model: Option<String>,
    pub ai_endpoint: Option<String>,
    /// Never logged (spec §6: "the AI key, if present, is not logged").
    pub ai_api_key: Option<String>,
    pub calibration_model_path: Option<PathBuf>,
    pub pattern_store_path: Option<PathBuf>,
    pub baseline_dpi: Option<u32>,
    pub retry_dpi: Option<u32>,
    pub text_quality_threshold: Option<f32>,
    pub ocr_median_threshold: Option<f32>,
    pub critical_field_confidence: Option<f32>,
    pub vision_max_longest_side_px: Option<u32>,
    pub vision_max_file_size_bytes: Option<u64>,
    pub pattern_store_max_age_days: Option<i64>,
    pub worker_count: Option<usize>,
    pub strict: Option<bool>,
}

impl RawConfig {
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// `~/.faktura.toml`, loaded best-effort: a missing or unparsable file is
    /// a warning, never a hard failure (a user config should never block a
    /// run that doesn't need it).
    fn load_user() -> Option<Self> {
        let path = dirs::home_dir()?.join(".faktura.toml");
        if !path.exists() {
            return None;
        }
        match Self::load_from_file(&path) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                eprintln!("{} failed to load {}: {e:#}", "warning:".yellow().bold(), path.display());
                None
            }
        }
    }

    /// `./.faktura.toml`, same best-effort policy as [`Self::load_user`].
    fn load_project() -> Option<Self> {
        let path = PathBuf::from(".faktura.toml");
        if !path.exists() {
            return None;
        }
        match Self::load_from_file(&path) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                eprintln!("{} failed to load {}: {e:#}", "warning:".yellow().bold(), path.display());
                None
            }
        }
    }

    /// Merges `other` into `self`, with `other`'s present fields winning.
    /// Used to fold project config over user config, and an explicit
    /// `--config` file over both.
    fn merge_over(mut self, other: Self) -> Self {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }
        take!(ai_enabled);
        take!(ai_provider);
        take!(ai_model);
        take!(ai_endpoint);
        take!(ai_api_key);
        take!(calibration_model_path);
        take!(pattern_store_path);
        take!(baseline_dpi);
        take!(retry_dpi);
        take!(text_quality_threshold);
        take!(ocr_median_threshold);
        take!(critical_field_confidence);
        take!(vision_max_longest_side_px);
        take!(vision_max_file_size_bytes);
        take!(pattern_store_max_age_days);
        take!(worker_count);
        take!(strict);
        self
    }

    /// Overlays environment variables (`FAKTURA_*`) on top of whatever the
    /// config files supplied. Env vars sit between config files and CLI
    /// flags in precedence (spec §6: "read at process start from
    /// environment variables or a configuration profile").
    fn overlay_env(mut self) -> Self {
        if let Ok(v) = std::env::var("FAKTURA_AI_ENABLED") {
            self.ai_enabled = v.parse().ok().or(self.ai_enabled);
        }
        if let Ok(v) = std::env::var("FAKTURA_AI_PROVIDER") {
            self.ai_provider = Some(v);
        }
        if let Ok(v) = std::env::var("FAKTURA_AI_MODEL") {
            self.ai_model = Some(v);
        }
        if let Ok(v) = std::env::var("FAKTURA_AI_ENDPOINT") {
            self.ai_endpoint = Some(v);
        }
        if let Ok(v) = std::env::var("FAKTURA_AI_API_KEY") {
            self.ai_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("FAKTURA_CALIBRATION_MODEL") {
            self.calibration_model_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("FAKTURA_PATTERN_STORE") {
            self.pattern_store_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("FAKTURA_BASELINE_DPI") {
            self.baseline_dpi = v.parse().ok().or(self.baseline_dpi);
        }
        if let Ok(v) = std::env::var("FAKTURA_RETRY_DPI") {
            self.retry_dpi = v.parse().ok().or(self.retry_dpi);
        }
        if let Ok(v) = std::env::var("FAKTURA_TEXT_QUALITY_THRESHOLD") {
            self.text_quality_threshold = v.parse().ok().or(self.text_quality_threshold);
        }
        if let Ok(v) = std::env::var("FAKTURA_OCR_MEDIAN_THRESHOLD") {
            self.ocr_median_threshold = v.parse().ok().or(self.ocr_median_threshold);
        }
        if let Ok(v) = std::env::var("FAKTURA_CRITICAL_FIELD_CONFIDENCE") {
            self.critical_field_confidence = v.parse().ok().or(self.critical_field_confidence);
        }
        if let Ok(v) = std::env::var("FAKTURA_VISION_MAX_LONGEST_SIDE_PX") {
            self.vision_max_longest_side_px = v.parse().ok().or(self.vision_max_longest_side_px);
        }
        if let Ok(v) = std::env::var("FAKTURA_VISION_MAX_FILE_SIZE_BYTES") {
            self.vision_max_file_size_bytes = v.parse().ok().or(self.vision_max_file_size_bytes);
        }
        if let Ok(v) = std::env::var("FAKTURA_PATTERN_STORE_MAX_AGE_DAYS") {
            self.pattern_store_max_age_days = v.parse().ok().or(self.pattern_store_max_age_days);
        }
        if let Ok(v) = std::env::var("FAKTURA_WORKERS") {
            self.worker_count = v.parse().ok().or(self.worker_count);
        }
        if let Ok(v) = std::env::var("FAKTURA_STRICT") {
            self.strict = v.parse().ok().or(self.strict);
        }
        self
    }
}

/// The fully resolved configuration a `faktura` invocation runs with: every
/// field defaulted, ready to build a [`faktura_pipeline::PipelineConfig`]
/// and the AI/pattern-store/calibration handles that sit alongside it.
#[derive(Debug, Clone)]
pub struct Config {
    pub ai_enabled: bool,
    pub ai_provider: String,
    pub ai_model: String,
    pub ai_endpoint: Option<String>,
    pub ai_api_key: Option<String>,
    pub calibration_model_path: Option<PathBuf>,
    pub pattern_store_path: PathBuf,
    pub baseline_dpi: u32,
    pub retry_dpi: u32,
    pub text_quality_threshold: f32,
    pub ocr_median_threshold: f32,
    pub critical_field_confidence: f32,
    pub vision_max_longest_side_px: u32,
    pub vision_max_file_size_bytes: u64,
    pub pattern_store_max_age_days: i64,
    pub worker_count: Option<usize>,
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        let defaults = faktura_pipeline::PipelineConfig::default();
        Self {
            ai_enabled: false,
            ai_provider: "openai".to_string(),
            ai_model: "gpt-4o-mini".to_string(),
            ai_endpoint: None,
            ai_api_key: None,
            calibration_model_path: None,
            pattern_store_path: PathBuf::from("faktura-patterns.db"),
            baseline_dpi: defaults.baseline_dpi,
            retry_dpi: defaults.retry_dpi,
            text_quality_threshold: defaults.text_quality_threshold,
            ocr_median_threshold: defaults.ocr_median_threshold,
            critical_field_confidence: defaults.hard_gate_confidence,
            vision_max_longest_side_px: defaults.vision_max_longest_side_px,
            vision_max_file_size_bytes: defaults.vision_max_file_size_bytes,
            pattern_store_max_age_days: defaults.pattern_store_max_age_days,
            worker_count: None,
            strict: false,
        }
    }
}

impl Config {
    /// Discovers and merges `~/.faktura.toml`, `./.faktura.toml`, an
    /// explicit `--config` path, and `FAKTURA_*` env vars, in ascending
    /// precedence, then fills anything still unset from built-in defaults.
    pub fn resolve(explicit_path: Option<&Path>) -> Result<Self> {
        let mut raw = RawConfig::default();
        if let Some(user) = RawConfig::load_user() {
            raw = raw.merge_over(user);
        }
        if let Some(project) = RawConfig::load_project() {
            raw = raw.merge_over(project);
        }
        if let Some(path) = explicit_path {
            let explicit = RawConfig::load_from_file(path)?;
            raw = raw.merge_over(explicit);
        }
        raw = raw.overlay_env();

        let defaults = Self::default();
        Ok(Self {
            ai_enabled: raw.ai_enabled.unwrap_or(defaults.ai_enabled),
            ai_provider: raw.ai_provider.unwrap_or(defaults.ai_provider),
            ai_model: raw.ai_model.unwrap_or(defaults.ai_model),
            ai_endpoint: raw.ai_endpoint.or(defaults.ai_endpoint),
            ai_api_key: raw.ai_api_key.or(defaults.ai_api_key),
            calibration_model_path: raw.calibration_model_path.or(defaults.calibration_model_path),
            pattern_store_path: raw.pattern_store_path.unwrap_or(defaults.pattern_store_path),
            baseline_dpi: raw.baseline_dpi.unwrap_or(defaults.baseline_dpi),
            retry_dpi: raw.retry_dpi.unwrap_or(defaults.retry_dpi),
            text_quality_threshold: raw.text_quality_threshold.unwrap_or(defaults.text_quality_threshold),
            ocr_median_threshold: raw.ocr_median_threshold.unwrap_or(defaults.ocr_median_threshold),
            critical_field_confidence: raw.critical_field_confidence.unwrap_or(defaults.critical_field_confidence),
            vision_max_longest_side_px: raw.vision_max_longest_side_px.unwrap_or(defaults.vision_max_longest_side_px),
            vision_max_file_size_bytes: raw.vision_max_file_size_bytes.unwrap_or(defaults.vision_max_file_size_bytes),
            pattern_store_max_age_days: raw.pattern_store_max_age_days.unwrap_or(defaults.pattern_store_max_age_days),
            worker_count: raw.worker_count.or(defaults.worker_count),
            strict: raw.strict.unwrap_or(defaults.strict),
        })
    }

    /// Builds the [`faktura_pipeline::PipelineConfig`] half of this
    /// configuration (everything the pipeline stages see directly).
    #[must_use]
    pub fn pipeline_config(&self, strict_override: bool) -> faktura_pipeline::PipelineConfig {
        faktura_pipeline::PipelineConfig {
            baseline_dpi: self.baseline_dpi,
            retry_dpi: self.retry_dpi,
            hard_gate_confidence: self.critical_field_confidence,
            ai_enabled: self.ai_enabled,
            worker_count: self.worker_count,
            strict: strict_override || self.strict,
            text_quality_threshold: self.text_quality_threshold,
            ocr_median_threshold: self.ocr_median_threshold,
            vision_max_longest_side_px: self.vision_max_longest_side_px,
            vision_max_file_size_bytes: self.vision_max_file_size_bytes,
            pattern_store_max_age_days: self.pattern_store_max_age_days,
            ..faktura_pipeline::PipelineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_defaults() {
        let config = Config::default();
        let pipeline_defaults = faktura_pipeline::PipelineConfig::default();
        assert_eq!(config.baseline_dpi, pipeline_defaults.baseline_dpi);
        assert_eq!(config.retry_dpi, pipeline_defaults.retry_dpi);
        assert!((config.critical_field_confidence - pipeline_defaults.hard_gate_confidence).abs() < f32::EPSILON);
    }

    #[test]
    fn merge_over_prefers_the_incoming_fields() {
        let base = RawConfig { baseline_dpi: Some(300), ..RawConfig::default() };
        let incoming = RawConfig { baseline_dpi: Some(450), retry_dpi: Some(600), ..RawConfig::default() };
        let merged = base.merge_over(incoming);
        assert_eq!(merged.baseline_dpi, Some(450));
        assert_eq!(merged.retry_dpi, Some(600));
    }

    #[test]
    fn merge_over_keeps_base_when_incoming_is_unset() {
        let base = RawConfig { baseline_dpi: Some(300), ..RawConfig::default() };
        let incoming = RawConfig::default();
        let merged = base.merge_over(incoming);
        assert_eq!(merged.baseline_dpi, Some(300));
    }

    #[test]
    fn pipeline_config_carries_strict_override() {
        let config = Config::default();
        assert!(config.pipeline_config(true).strict);
        assert!(!config.pipeline_config(false).strict);
    }
}
