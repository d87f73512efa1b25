//! Row-per-line-item tabular export (spec §6 Outputs): the system hands a
//! normalized record stream to an external writer. The writer itself (Excel,
//! a spreadsheet UI) is out of scope; this module only produces the rows.

use faktura_core::{ExtractionSource, Status};

use crate::report::FinalizedInvoice;

/// One output row: a single invoice line annotated with its invoice's header
/// facts, calibrated critical-field confidences, and trust status (spec §3,
/// §6). `extraction_source` is populated whenever compare mode selected a
/// source for this invoice (always, in this pipeline — compare mode is the
/// default per spec §4.1).
#[derive(Debug, Clone)]
pub struct ExportRow {
    pub source_path: String,
    pub invoice_number: Option<String>,
    pub supplier: Option<String>,
    pub date: Option<String>,
    pub reference: Option<String>,
    pub line_number: u32,
    pub description: String,
    pub line_total: Option<f64>,
    pub invoice_number_confidence: f32,
    pub total_amount_confidence: f32,
    pub status: Status,
    pub lines_sum: f64,
    pub diff: Option<f64>,
    pub extraction_source: ExtractionSource,
}

/// Expands one finalized invoice into one [`ExportRow`] per line item. An
/// invoice with no parsed lines still yields a single row (so it is not
/// silently dropped from the export) with an empty description and no
/// `line_total`.
#[must_use]
pub fn invoice_rows(finalized: &FinalizedInvoice) -> Vec<ExportRow> {
    let invoice = &finalized.invoice;
    let header = &invoice.header;

    let base = |line_number: u32, description: String, line_total: Option<f64>| ExportRow {
        source_path: invoice.source_path.clone(),
        invoice_number: header.invoice_number.clone(),
        supplier: header.supplier_name.clone(),
        date: header.invoice_date.map(|d| d.to_string()),
        reference: header.ocr_reference.clone(),
        line_number,
        description,
        line_total,
        invoice_number_confidence: header.invoice_number_confidence,
        total_amount_confidence: invoice.footer.total_amount_confidence,
        status: invoice.status,
        lines_sum: invoice.validation.lines_sum,
        diff: invoice.validation.difference,
        extraction_source: invoice.extraction_source,
    };

    if invoice.lines.is_empty() {
        return vec![base(0, String::new(), None)];
    }

    invoice
        .lines
        .iter()
        .map(|line| base(line.line_number, line.description.clone(), line.line_total))
        .collect()
}

/// Expands every finalized invoice in a file into its export rows, in
/// invoice page-start order (spec §5 ordering guarantees).
#[must_use]
pub fn rows_for_file(invoices: &[FinalizedInvoice]) -> Vec<ExportRow> {
    let mut sorted: Vec<&FinalizedInvoice> = invoices.iter().collect();
    sorted.sort_by_key(|f| f.invoice.page_start);
    sorted.into_iter().flat_map(invoice_rows).collect()
}
