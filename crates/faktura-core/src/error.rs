//! Error types shared across the invoice extraction pipeline.
//!
//! The taxonomy mirrors spec §7: a handful of variants that are fatal to the
//! current file, one that is fatal only to a single page, and a catch-all for the
//! ambient I/O and serialization layer. Nothing in this enum represents a
//! *validation* outcome — `PARTIAL`/`REVIEW`/`FAILED` are [`crate::invoice::Status`]
//! values, not errors.

use thiserror::Error;

/// Errors that can occur while ingesting or processing a single invoice file.
#[derive(Error, Debug)]
pub enum FakturaError {
    /// The PDF file could not be opened or its page table could not be read.
    #[error("PDF read error: {0}")]
    PdfRead(String),

    /// A page could not be rasterized at the requested DPI.
    #[error("render error: {0}")]
    Render(String),

    /// The configured OCR engine failed on a page.
    #[error("OCR error: {0}")]
    Ocr(String),

    /// A specific page produced zero tokens from either tokenizer. The page is
    /// skipped; the invoice may still succeed from other pages.
    #[error("page {0} produced no tokens")]
    TokenizationEmpty(usize),

    /// The AI fallback adapter failed (timeout, provider error, malformed
    /// response, network error). Never fatal to the pipeline: callers convert
    /// this into `None` and continue with the heuristic result.
    #[error("AI fallback error: {0}")]
    Ai(String),

    /// The pattern store could not be read or written. Non-fatal: the pipeline
    /// proceeds without pattern boosts.
    #[error("pattern store error: {0}")]
    PatternStore(String),

    /// A configuration value was missing or invalid at process start.
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying file I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Convenience alias for `Result<T, FakturaError>`.
pub type Result<T> = std::result::Result<T, FakturaError>;

/// Identifies which pipeline stage an error occurred in, for the per-file errors
/// sidecar report (spec §6/§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Read,
    Render,
    Ocr,
    Tokenize,
    Layout,
    Boundary,
    Header,
    Lines,
    Footer,
    Calibrate,
    Learn,
    Ai,
    Reconcile,
    Report,
}

impl std::fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Render => "render",
            Self::Ocr => "ocr",
            Self::Tokenize => "tokenize",
            Self::Layout => "layout",
            Self::Boundary => "boundary",
            Self::Header => "header",
            Self::Lines => "lines",
            Self::Footer => "footer",
            Self::Calibrate => "calibrate",
            Self::Learn => "learn",
            Self::Ai => "ai",
            Self::Reconcile => "reconcile",
            Self::Report => "report",
        };
        write!(f, "{s}")
    }
}

/// One entry in the errors sidecar report (spec §6: "On fatal per-file errors, a
/// sidecar errors report listing file path, stage, kind, message").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FileError {
    pub file_path: String,
    pub stage: ErrorStage,
    pub kind: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_read_display() {
        let e = FakturaError::PdfRead("no pages".into());
        assert_eq!(e.to_string(), "PDF read error: no pages");
    }

    #[test]
    fn tokenization_empty_display() {
        let e = FakturaError::TokenizationEmpty(3);
        assert_eq!(e.to_string(), "page 3 produced no tokens");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: FakturaError = io_err.into();
        assert!(matches!(err, FakturaError::Io(_)));
    }

    #[test]
    fn error_stage_display_roundtrip() {
        for stage in [
            ErrorStage::Read,
            ErrorStage::Render,
            ErrorStage::Ocr,
            ErrorStage::Tokenize,
            ErrorStage::Layout,
            ErrorStage::Boundary,
            ErrorStage::Header,
            ErrorStage::Lines,
            ErrorStage::Footer,
            ErrorStage::Calibrate,
            ErrorStage::Learn,
            ErrorStage::Ai,
            ErrorStage::Reconcile,
            ErrorStage::Report,
        ] {
            assert!(!stage.to_string().is_empty());
        }
    }
}
