//! Candidate generation and multi-factor scoring for the invoice header
//! (invoice number, supplier, date, reference), line items, and footer total.

pub mod footer;
pub mod header;
pub mod lines;
pub mod numbers;

pub use footer::{classify_keyword, math_validation_score, score_candidates as score_footer_candidates, trace_of, validation_tolerance, FooterCandidate};
pub use header::{
    extract_reference, extract_supplier_name, parse_swedish_date, repair_prefix, score_candidates as score_header_candidates,
    select, InvoiceNumberCandidate, SelectedInvoiceNumber, HARD_GATE_CONFIDENCE, TIE_BREAK_DELTA,
};
pub use lines::{ends_items_segment, parse_lines};
pub use numbers::{looks_like_amount, parse_amount};
