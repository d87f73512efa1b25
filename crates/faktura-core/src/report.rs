//! The run report: the single serialized document a run emits, consumed by a
//! review UI for targeted manual validation (spec §4.14).
//!
//! Shape mirrors `docling-quality-verifier`'s `QualityReport` (a top-level
//! report wrapping per-item findings plus a review-oriented queue), scoped to
//! this pipeline's per-file/per-invoice structure instead of per-document-item.

use serde::{Deserialize, Serialize};

use crate::error::FileError;
use crate::invoice::{ExtractionSource, Status};

/// Per-page (or per-path) extraction method detail, one of the two things that
/// make a run report useful for debugging a misfire (spec §4.14).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionDetail {
    pub method_used: ExtractionSource,
    pub dpi_used: Option<u32>,
    pub pdf_text_quality: f32,
    pub ocr_text_quality: f32,
    pub ocr_mean: Option<f32>,
    pub ocr_median: Option<f32>,
    pub low_conf_fraction: f32,
    pub reason_flags: Vec<String>,
    pub vision_reason: Option<String>,
}

/// One calibrated candidate value, kept for the validation queue's top-5 list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub value: String,
    pub calibrated_score: f32,
}

/// Quality scores attached to one finalized invoice: calibrated confidences
/// for the fields the hard gate checks, plus the reconciliation difference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScores {
    pub invoice_number_confidence: f32,
    pub total_amount_confidence: f32,
    pub lines_sum: f64,
    pub diff: Option<f64>,
}

/// One finalized invoice as it appears in the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceReportEntry {
    pub invoice_number: Option<String>,
    pub supplier: Option<String>,
    pub status: Status,
    pub quality_scores: QualityScores,
    pub extraction_source: ExtractionSource,
    pub extraction_detail: ExtractionDetail,
}

/// All invoices found in one input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file_path: String,
    pub invoices: Vec<InvoiceReportEntry>,
}

/// One entry in the top-level validation queue: everything a reviewer needs to
/// adjudicate a REVIEW invoice without opening the PDF first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationQueueEntry {
    pub pdf_path: String,
    /// Prefers the extracted invoice number; falls back to a synthetic id
    /// (`"{file}#{page_start}"`) when extraction produced no number at all.
    pub invoice_id: String,
    pub supplier: Option<String>,
    pub top_candidates: Vec<CandidateScore>,
    pub selected_source: ExtractionSource,
}

/// The full per-run document (spec §4.14).
///
/// `validation` mirrors `validation_queue[0]` for backward-compatible
/// consumers that expect a single-invoice validation blob; it is `None` iff
/// the queue is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub files: Vec<FileOutcome>,
    pub validation_queue: Vec<ValidationQueueEntry>,
    pub validation: Option<ValidationQueueEntry>,
    pub errors: Vec<FileError>,
}

impl RunReport {
    #[must_use]
    pub fn new(files: Vec<FileOutcome>, validation_queue: Vec<ValidationQueueEntry>, errors: Vec<FileError>) -> Self {
        let validation = validation_queue.first().cloned();
        Self { files, validation_queue, validation, errors }
    }

    #[must_use]
    pub fn total_invoices(&self) -> usize {
        self.files.iter().map(|f| f.invoices.len()).sum()
    }

    #[must_use]
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for file in &self.files {
            for inv in &file.invoices {
                match inv.status {
                    Status::Ok => counts.ok += 1,
                    Status::Partial => counts.partial += 1,
                    Status::Review => counts.review += 1,
                    Status::Failed => counts.failed += 1,
                }
            }
        }
        counts
    }
}

/// Convenience tally used by the CLI summary line.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub ok: usize,
    pub partial: usize,
    pub review: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(status: Status) -> InvoiceReportEntry {
        InvoiceReportEntry {
            invoice_number: Some("INV-1".into()),
            supplier: Some("Acme AB".into()),
            status,
            quality_scores: QualityScores {
                invoice_number_confidence: 0.97,
                total_amount_confidence: 0.98,
                lines_sum: 100.0,
                diff: Some(0.0),
            },
            extraction_source: ExtractionSource::EmbeddedText,
            extraction_detail: ExtractionDetail {
                method_used: ExtractionSource::EmbeddedText,
                dpi_used: None,
                pdf_text_quality: 0.9,
                ocr_text_quality: 0.0,
                ocr_mean: None,
                ocr_median: None,
                low_conf_fraction: 0.0,
                reason_flags: vec![],
                vision_reason: None,
            },
        }
    }

    #[test]
    fn validation_mirrors_first_queue_entry() {
        let queue = vec![ValidationQueueEntry {
            pdf_path: "a.pdf".into(),
            invoice_id: "INV-1".into(),
            supplier: Some("Acme AB".into()),
            top_candidates: vec![],
            selected_source: ExtractionSource::Ocr,
        }];
        let report = RunReport::new(vec![], queue.clone(), vec![]);
        assert_eq!(report.validation.unwrap().invoice_id, queue[0].invoice_id);
    }

    #[test]
    fn validation_is_none_on_empty_queue() {
        let report = RunReport::new(vec![], vec![], vec![]);
        assert!(report.validation.is_none());
    }

    #[test]
    fn status_counts_tally_correctly() {
        let file = FileOutcome {
            file_path: "a.pdf".into(),
            invoices: vec![sample_entry(Status::Ok), sample_entry(Status::Review), sample_entry(Status::Ok)],
        };
        let report = RunReport::new(vec![file], vec![], vec![]);
        let counts = report.status_counts();
        assert_eq!(counts.ok, 2);
        assert_eq!(counts.review, 1);
        assert_eq!(counts.partial, 0);
        assert_eq!(report.total_invoices(), 3);
    }
}
