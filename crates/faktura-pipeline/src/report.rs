//! Run report assembly (spec §4.14): folds every file's finalized invoices
//! and per-path extraction detail into the single [`RunReport`] document a
//! run emits, building the validation queue from REVIEW-status invoices.

use faktura_core::{
    CandidateScore, ExtractionDetail, FileError, FileOutcome, InvoiceReportEntry, QualityScores, RunReport, Status,
    ValidationQueueEntry, VirtualInvoice,
};

use crate::compare::ComparisonOutcome;

/// One finalized invoice plus the comparison metadata that produced it,
/// handed to [`ReportBuilder::push_invoice`] by the batch worker as soon as
/// both source paths have been resolved and a winner chosen.
#[derive(Clone)]
pub struct FinalizedInvoice {
    pub invoice: VirtualInvoice,
    pub detail: ExtractionDetail,
    pub top_candidates: Vec<CandidateScore>,
}

impl From<ComparisonOutcome> for FinalizedInvoice {
    fn from(outcome: ComparisonOutcome) -> Self {
        Self { invoice: outcome.invoice, detail: outcome.detail, top_candidates: outcome.top_candidates }
    }
}

/// A file's invoices as [`InvoiceReportEntry`] plus the top candidates kept
/// only long enough to populate the validation queue.
struct PendingFile {
    file_path: String,
    entries: Vec<InvoiceReportEntry>,
    top_candidates: Vec<Vec<CandidateScore>>,
}

/// Accumulates finalized invoices and per-file errors across a run, grouping
/// them back into per-file outcomes in the order files were submitted.
#[derive(Default)]
pub struct ReportBuilder {
    files: Vec<PendingFile>,
    errors: Vec<FileError>,
}

impl ReportBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one input file's finalized invoices, in page-start order, as a
    /// single file outcome. Invoices already carry `source_path`; this
    /// assumes the caller passed them all for the same file.
    pub fn push_file(&mut self, file_path: &str, mut invoices: Vec<FinalizedInvoice>) {
        invoices.sort_by_key(|f| f.invoice.page_start);
        let top_candidates = invoices.iter().map(|f| f.top_candidates.clone()).collect();
        let entries = invoices.into_iter().map(report_entry).collect();
        self.files.push(PendingFile { file_path: file_path.to_string(), entries, top_candidates });
    }

    pub fn push_error(&mut self, error: FileError) {
        self.errors.push(error);
    }

    /// Finalizes the report, deriving the validation queue from every
    /// REVIEW-status invoice across all files (spec §4.14).
    #[must_use]
    pub fn build(self) -> RunReport {
        let mut queue = Vec::new();
        let mut files = Vec::with_capacity(self.files.len());
        for file in self.files {
            for (entry, top_candidates) in file.entries.iter().zip(file.top_candidates.iter()) {
                if entry.status == Status::Review {
                    queue.push(ValidationQueueEntry {
                        pdf_path: file.file_path.clone(),
                        invoice_id: entry
                            .invoice_number
                            .clone()
                            .unwrap_or_else(|| format!("{}#{}", file.file_path, entry.quality_scores.lines_sum as i64)),
                        supplier: entry.supplier.clone(),
                        top_candidates: top_candidates.clone(),
                        selected_source: entry.extraction_source,
                    });
                }
            }
            files.push(FileOutcome { file_path: file.file_path, invoices: file.entries });
        }
        RunReport::new(files, queue, self.errors)
    }
}

fn report_entry(finalized: FinalizedInvoice) -> InvoiceReportEntry {
    let invoice = &finalized.invoice;
    InvoiceReportEntry {
        invoice_number: invoice.header.invoice_number.clone(),
        supplier: invoice.header.supplier_name.clone(),
        status: invoice.status,
        quality_scores: QualityScores {
            invoice_number_confidence: invoice.header.invoice_number_confidence,
            total_amount_confidence: invoice.footer.total_amount_confidence,
            lines_sum: invoice.validation.lines_sum,
            diff: invoice.validation.difference,
        },
        extraction_source: invoice.extraction_source,
        extraction_detail: finalized.detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faktura_core::{ExtractionSource, InvoiceFooter, InvoiceHeader, ValidationResult};

    fn sample_invoice(status: Status) -> VirtualInvoice {
        VirtualInvoice {
            virtual_id: "f.pdf#1".to_string(),
            source_path: "f.pdf".to_string(),
            page_start: 1,
            page_end: 1,
            header: InvoiceHeader::empty(),
            lines: vec![],
            footer: InvoiceFooter {
                total_amount: None,
                total_amount_confidence: 0.0,
                total_amount_trace: None,
                total_amount_source: None,
                subtotal_amount: None,
                vat_amount: None,
                currency: None,
            },
            validation: ValidationResult { lines_sum: 0.0, footer_total: None, difference: None, within_tolerance: false },
            status,
            extraction_source: ExtractionSource::EmbeddedText,
            ai_invocations: 0,
        }
    }

    fn sample_detail() -> ExtractionDetail {
        ExtractionDetail {
            method_used: ExtractionSource::EmbeddedText,
            dpi_used: None,
            pdf_text_quality: 0.9,
            ocr_text_quality: 0.0,
            ocr_mean: None,
            ocr_median: None,
            low_conf_fraction: 0.0,
            reason_flags: vec![],
            vision_reason: None,
        }
    }

    #[test]
    fn review_invoices_populate_the_validation_queue() {
        let mut builder = ReportBuilder::new();
        builder.push_file(
            "f.pdf",
            vec![FinalizedInvoice { invoice: sample_invoice(Status::Review), detail: sample_detail(), top_candidates: vec![] }],
        );
        let report = builder.build();
        assert_eq!(report.validation_queue.len(), 1);
        assert!(report.validation.is_some());
    }

    #[test]
    fn ok_invoices_do_not_enter_the_queue() {
        let mut builder = ReportBuilder::new();
        builder.push_file(
            "f.pdf",
            vec![FinalizedInvoice { invoice: sample_invoice(Status::Ok), detail: sample_detail(), top_candidates: vec![] }],
        );
        let report = builder.build();
        assert!(report.validation_queue.is_empty());
        assert_eq!(report.total_invoices(), 1);
    }
}
