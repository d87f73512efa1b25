//! Invoice-domain types: the extracted header, line items, traceability
//! evidence, and the learned-pattern/correction records that feed back into
//! extraction on future runs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::BBox;

/// Where a field's value came from, in order of how much it should be trusted
/// once present (spec §4.11 Compare & Choose; §4.13 reconciliation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    /// Read from the PDF's embedded text layer.
    EmbeddedText,
    /// Read from a rasterized page via OCR.
    Ocr,
    /// Boosted or supplied by a supplier-scoped learned pattern.
    Pattern,
    /// Supplied by the AI fallback adapter after heuristic extraction failed.
    Ai,
}

/// The outcome status assigned to a processed invoice (spec §4.13).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Both critical fields met the calibrated-confidence gate and reconciliation held.
    Ok,
    /// At least one field was extracted but the hard gate or reconciliation failed.
    Partial,
    /// Extraction succeeded but a human should confirm before the invoice is used downstream.
    Review,
    /// No usable header/footer could be produced for this file.
    Failed,
}

/// Keyword classification used by the footer/total extractor to distinguish
/// "total" labels from subtotal/tax/discount labels (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordClass {
    /// "Att betala", "Summa att betala", "Slutsumma", "Inkl. moms" — a total
    /// phrase that names VAT inclusion explicitly. Outranks `Generic`.
    WithVat,
    /// "Totalt", "Total" — a bare total keyword with no VAT qualifier.
    Generic,
    /// "Delsumma", "Subtotal" — pre-tax subtotal.
    Subtotal,
    /// "Moms", "VAT" — tax line.
    Tax,
    /// "Rabatt" — a discount/deduction line.
    Discount,
    /// Did not match any known keyword family.
    Unknown,
}

/// Points back to the tokens that produced a field, for audit and debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Traceability {
    pub page_index: usize,
    pub bbox: BBox,
    pub source: ExtractionSource,
    /// Raw matched text before normalization/parsing.
    pub raw_text: String,
}

/// The extracted invoice header (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceHeader {
    pub invoice_number: Option<String>,
    pub invoice_number_confidence: f32,
    pub invoice_number_trace: Option<Traceability>,

    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,

    pub supplier_name: Option<String>,
    pub supplier_org_number: Option<String>,

    pub ocr_reference: Option<String>,
}

impl InvoiceHeader {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            invoice_number: None,
            invoice_number_confidence: 0.0,
            invoice_number_trace: None,
            invoice_date: None,
            due_date: None,
            supplier_name: None,
            supplier_org_number: None,
            ocr_reference: None,
        }
    }
}

/// One parsed line item (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    /// 1-based position among the lines of its invoice (spec §3).
    pub line_number: u32,
    pub row_index: usize,
    pub description: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub unit_price: Option<f64>,
    pub line_total: Option<f64>,
    pub vat_rate: Option<f64>,
}

/// The extracted footer/totals block (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceFooter {
    pub total_amount: Option<f64>,
    pub total_amount_confidence: f32,
    pub total_amount_trace: Option<Traceability>,
    pub total_amount_source: Option<ExtractionSource>,

    pub subtotal_amount: Option<f64>,
    pub vat_amount: Option<f64>,
    pub currency: Option<String>,
}

/// Result of reconciling line items against the footer total (spec §4.13).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub lines_sum: f64,
    pub footer_total: Option<f64>,
    pub difference: Option<f64>,
    pub within_tolerance: bool,
}

/// One fully processed invoice: header, lines, footer, validation, and status.
///
/// A `VirtualInvoice` is the logical invoice delimited by the boundary
/// detector inside one PDF file (spec §3: "a logical invoice within one
/// PDF"); `page_start`/`page_end` are 1-based and inclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualInvoice {
    pub virtual_id: String,
    pub source_path: String,
    pub page_start: usize,
    pub page_end: usize,
    pub header: InvoiceHeader,
    pub lines: Vec<InvoiceLine>,
    pub footer: InvoiceFooter,
    pub validation: ValidationResult,
    pub status: Status,
    pub extraction_source: ExtractionSource,
    pub ai_invocations: u32,
}

/// A learned, supplier-scoped extraction hint produced by consolidating
/// corrections (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: i64,
    pub supplier_name: String,
    pub layout_hash: String,
    pub field_name: String,
    /// Relative bbox anchor (offset from a stable layout landmark), used for
    /// centroid-distance matching against new documents of the same supplier.
    pub anchor_bbox: BBox,
    pub sample_count: u32,
    pub boost_weight: f32,
}

/// A single human correction recorded for future pattern learning (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
    pub supplier_name: String,
    pub layout_hash: String,
    pub field_name: String,
    pub corrected_value: String,
    pub bbox: BBox,
    pub page_index: usize,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_header_has_no_trace() {
        let h = InvoiceHeader::empty();
        assert!(h.invoice_number.is_none());
        assert!(h.invoice_number_trace.is_none());
        assert_eq!(h.invoice_number_confidence, 0.0);
    }

    #[test]
    fn status_serializes_uppercase() {
        let s = serde_json::to_string(&Status::Ok).unwrap();
        assert_eq!(s, "\"OK\"");
        let s = serde_json::to_string(&Status::Partial).unwrap();
        assert_eq!(s, "\"PARTIAL\"");
    }

    #[test]
    fn extraction_source_roundtrips() {
        for src in [
            ExtractionSource::EmbeddedText,
            ExtractionSource::Ocr,
            ExtractionSource::Pattern,
            ExtractionSource::Ai,
        ] {
            let json = serde_json::to_string(&src).unwrap();
            let back: ExtractionSource = serde_json::from_str(&json).unwrap();
            assert_eq!(src, back);
        }
    }
}
