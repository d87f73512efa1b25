//! Reconciliation & Status Assigner (spec §4.13): arithmetic reconciliation
//! of line items against the extracted total, and the `OK`/`PARTIAL`/
//! `REVIEW`/`FAILED` status rules that key off it and the two critical-field
//! hard gates.

use faktura_core::{InvoiceLine, Status, ValidationResult};
use faktura_extract::validation_tolerance;

/// Sums every line's `line_total`, skipping lines with no parsed total
/// (spec §8 invariant: "`lines_sum` equals Σ(line.total)").
#[must_use]
pub fn lines_sum(lines: &[InvoiceLine]) -> f64 {
    lines.iter().filter_map(|l| l.line_total).sum()
}

/// Reconciles a resolved total against the summed line items (spec §4.13).
/// `within_tolerance` is `false` whenever no total was resolved at all —
/// there is nothing to reconcile against.
#[must_use]
pub fn reconcile(total: Option<f64>, lines: &[InvoiceLine]) -> ValidationResult {
    let sum = lines_sum(lines);
    match total {
        Some(t) => {
            let diff = t - sum;
            let tolerance = validation_tolerance(t);
            ValidationResult { lines_sum: sum, footer_total: Some(t), difference: Some(diff), within_tolerance: diff.abs() <= tolerance }
        }
        None => ValidationResult { lines_sum: sum, footer_total: None, difference: None, within_tolerance: false },
    }
}

/// Inputs to status assignment: everything the hard gate and the FAILED
/// minimum-fields rule need (spec §4.13).
#[derive(Debug, Clone, Copy)]
pub struct StatusInputs {
    pub invoice_number_confidence: f32,
    pub invoice_number_present: bool,
    pub total_confidence: f32,
    pub total_present: bool,
    pub traceabilities_present: bool,
    /// Set when the page(s) backing this invoice produced no tokens at all
    /// on either source (spec §4.13: "page couldn't be tokenized at all").
    pub tokenization_failed: bool,
}

/// Assigns the final [`Status`] and the reasons contributing to it (spec
/// §4.13). Reason strings are stable identifiers, not prose, so the run
/// report and the UI can filter/group on them.
#[must_use]
pub fn assign_status(inputs: &StatusInputs, validation: &ValidationResult, hard_gate: f32) -> (Status, Vec<String>) {
    let mut reasons = Vec::new();

    if inputs.tokenization_failed {
        reasons.push("tokenization_failed".to_string());
        return (Status::Failed, reasons);
    }
    if !inputs.total_present {
        reasons.push("total_missing".to_string());
        return (Status::Failed, reasons);
    }

    let invoice_number_gate = inputs.invoice_number_present && inputs.invoice_number_confidence >= hard_gate;
    let total_gate = inputs.total_present && inputs.total_confidence >= hard_gate;

    if !invoice_number_gate {
        reasons.push(format!("invoice_number_confidence<{hard_gate}"));
    }
    if !total_gate {
        reasons.push(format!("total_confidence<{hard_gate}"));
    }
    if !inputs.traceabilities_present {
        reasons.push("traceability_missing".to_string());
    }

    let header_gates_pass = invoice_number_gate && total_gate && inputs.traceabilities_present;

    if !header_gates_pass {
        return (Status::Review, reasons);
    }

    if validation.within_tolerance {
        (Status::Ok, reasons)
    } else {
        reasons.push("reconciliation_failed".to_string());
        (Status::Partial, reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faktura_core::InvoiceLine;

    fn line(total: Option<f64>) -> InvoiceLine {
        InvoiceLine {
            line_number: 1,
            row_index: 0,
            description: String::new(),
            quantity: None,
            unit: None,
            unit_price: None,
            line_total: total,
            vat_rate: None,
        }
    }

    #[test]
    fn lines_sum_skips_missing_totals() {
        let lines = vec![line(Some(10.0)), line(None), line(Some(5.0))];
        assert_eq!(lines_sum(&lines), 15.0);
    }

    #[test]
    fn reconcile_within_tolerance() {
        let lines = vec![line(Some(100.0))];
        let result = reconcile(Some(100.50), &lines);
        assert!(result.within_tolerance);
        assert_eq!(result.difference, Some(0.50));
    }

    #[test]
    fn reconcile_outside_tolerance() {
        let lines = vec![line(Some(100.0))];
        let result = reconcile(Some(150.0), &lines);
        assert!(!result.within_tolerance);
    }

    #[test]
    fn reconcile_with_missing_total_is_never_within_tolerance() {
        let lines = vec![line(Some(100.0))];
        let result = reconcile(None, &lines);
        assert!(!result.within_tolerance);
        assert_eq!(result.footer_total, None);
    }

    fn gated_inputs(conf: f32) -> StatusInputs {
        StatusInputs {
            invoice_number_confidence: conf,
            invoice_number_present: conf >= 0.95,
            total_confidence: conf,
            total_present: true,
            traceabilities_present: conf >= 0.95,
            tokenization_failed: false,
        }
    }

    #[test]
    fn ok_requires_both_gates_and_tolerance() {
        let validation = ValidationResult { lines_sum: 100.0, footer_total: Some(100.0), difference: Some(0.0), within_tolerance: true };
        let (status, reasons) = assign_status(&gated_inputs(0.97), &validation, 0.95);
        assert_eq!(status, Status::Ok);
        assert!(reasons.is_empty());
    }

    #[test]
    fn partial_when_gates_pass_but_reconciliation_fails() {
        let validation = ValidationResult { lines_sum: 80.0, footer_total: Some(100.0), difference: Some(20.0), within_tolerance: false };
        let (status, _) = assign_status(&gated_inputs(0.97), &validation, 0.95);
        assert_eq!(status, Status::Partial);
    }

    #[test]
    fn review_when_hard_gate_fails() {
        let validation = ValidationResult { lines_sum: 100.0, footer_total: Some(100.0), difference: Some(0.0), within_tolerance: true };
        let (status, reasons) = assign_status(&gated_inputs(0.80), &validation, 0.95);
        assert_eq!(status, Status::Review);
        assert!(!reasons.is_empty());
    }

    #[test]
    fn failed_when_total_missing() {
        let validation = reconcile(None, &[]);
        let mut inputs = gated_inputs(0.97);
        inputs.total_present = false;
        let (status, reasons) = assign_status(&inputs, &validation, 0.95);
        assert_eq!(status, Status::Failed);
        assert!(reasons.contains(&"total_missing".to_string()));
    }

    #[test]
    fn failed_when_tokenization_failed_overrides_everything() {
        let validation = reconcile(None, &[]);
        let mut inputs = gated_inputs(0.97);
        inputs.tokenization_failed = true;
        let (status, _) = assign_status(&inputs, &validation, 0.95);
        assert_eq!(status, Status::Failed);
    }
}
