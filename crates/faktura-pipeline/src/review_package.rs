//! Review package assembly (spec §6 Outputs): for each REVIEW invoice, bundle
//! the original PDF, the run report, the invoice's validation queue entry, and
//! the traceability snippets behind its gated fields into one directory a
//! reviewer can open without re-running the pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use faktura_core::{Result, RunReport, Traceability, ValidationQueueEntry};

use crate::report::FinalizedInvoice;

/// One traceability snippet copied into a review package, tagged with the
/// field it backs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TraceSnippet {
    pub field: &'static str,
    pub trace: Traceability,
}

/// Traceability behind an invoice's gated fields (invoice number, total
/// amount), in the order a reviewer checks them.
#[must_use]
pub fn trace_snippets(finalized: &FinalizedInvoice) -> Vec<TraceSnippet> {
    let invoice = &finalized.invoice;
    let mut snippets = Vec::new();
    if let Some(trace) = &invoice.header.invoice_number_trace {
        snippets.push(TraceSnippet { field: "invoice_number", trace: trace.clone() });
    }
    if let Some(trace) = &invoice.footer.total_amount_trace {
        snippets.push(TraceSnippet { field: "total_amount", trace: trace.clone() });
    }
    snippets
}

/// Writes one REVIEW invoice's package to `out_dir/<virtual_id>/`: a copy of
/// the source PDF, the full run report, the invoice's validation queue entry,
/// and its traceability snippets.
///
/// # Errors
/// Returns an error if the source PDF cannot be read or any package file
/// cannot be written.
pub fn write_review_package(
    out_dir: &Path,
    finalized: &FinalizedInvoice,
    validation: &ValidationQueueEntry,
    run_report: &RunReport,
) -> Result<PathBuf> {
    let safe_id: String = finalized
        .invoice
        .virtual_id
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    let package_dir = out_dir.join(safe_id);
    fs::create_dir_all(&package_dir)?;

    let source = Path::new(&finalized.invoice.source_path);
    if let Some(file_name) = source.file_name() {
        fs::copy(source, package_dir.join(file_name))?;
    }

    fs::write(package_dir.join("run-report.json"), serde_json::to_string_pretty(run_report)?)?;
    fs::write(package_dir.join("validation.json"), serde_json::to_string_pretty(validation)?)?;
    fs::write(package_dir.join("traceability.json"), serde_json::to_string_pretty(&trace_snippets(finalized))?)?;

    Ok(package_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faktura_core::{ExtractionSource, InvoiceFooter, InvoiceHeader, InvoiceLine, Status, VirtualInvoice};
    use faktura_core::{BBox, ExtractionDetail, FileOutcome, QualityScores, ValidationResult};

    fn sample_finalized() -> FinalizedInvoice {
        let mut header = InvoiceHeader::empty();
        header.invoice_number = Some("INV-42".into());
        header.invoice_number_confidence = 0.97;
        header.invoice_number_trace =
            Some(Traceability { page_index: 0, bbox: BBox::new(1.0, 2.0, 3.0, 4.0), source: ExtractionSource::EmbeddedText, raw_text: "INV-42".into() });

        let footer = InvoiceFooter {
            total_amount: Some(500.0),
            total_amount_confidence: 0.96,
            total_amount_trace: Some(Traceability {
                page_index: 0,
                bbox: BBox::new(5.0, 6.0, 7.0, 8.0),
                source: ExtractionSource::EmbeddedText,
                raw_text: "500.00".into(),
            }),
            total_amount_source: Some(ExtractionSource::EmbeddedText),
            subtotal_amount: None,
            vat_amount: None,
            currency: Some("SEK".into()),
        };

        FinalizedInvoice {
            invoice: VirtualInvoice {
                virtual_id: "dir/a.pdf#1".into(),
                source_path: "dir/a.pdf".into(),
                page_start: 1,
                page_end: 1,
                header,
                lines: Vec::<InvoiceLine>::new(),
                footer,
                validation: ValidationResult { lines_sum: 500.0, footer_total: Some(500.0), difference: Some(0.0), within_tolerance: true },
                status: Status::Review,
                extraction_source: ExtractionSource::EmbeddedText,
                ai_invocations: 0,
            },
            detail: ExtractionDetail {
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
            top_candidates: vec![],
        }
    }

    #[test]
    fn trace_snippets_collects_header_and_footer_traces() {
        let finalized = sample_finalized();
        let snippets = trace_snippets(&finalized);
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].field, "invoice_number");
        assert_eq!(snippets[1].field, "total_amount");
    }

    #[test]
    fn write_review_package_creates_expected_files() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf_path = tmp.path().join("a.pdf");
        fs::write(&pdf_path, b"%PDF-1.4 fake").unwrap();

        let mut finalized = sample_finalized();
        finalized.invoice.source_path = pdf_path.to_string_lossy().to_string();
        finalized.invoice.virtual_id = "a.pdf#1".into();

        let validation = ValidationQueueEntry {
            pdf_path: pdf_path.to_string_lossy().to_string(),
            invoice_id: "INV-42".into(),
            supplier: None,
            top_candidates: vec![],
            selected_source: ExtractionSource::EmbeddedText,
        };
        let run_report = RunReport::new(
            vec![FileOutcome { file_path: pdf_path.to_string_lossy().to_string(), invoices: vec![] }],
            vec![validation.clone()],
            vec![],
        );

        let out_dir = tmp.path().join("review");
        let package_dir = write_review_package(&out_dir, &finalized, &validation, &run_report).unwrap();

        assert!(package_dir.join("a.pdf").is_file());
        assert!(package_dir.join("run-report.json").is_file());
        assert!(package_dir.join("validation.json").is_file());
        assert!(package_dir.join("traceability.json").is_file());
    }
}
