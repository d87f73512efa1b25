//! Orchestration: wires `faktura-layout`, `faktura-extract`, `faktura-calibrate`,
//! `faktura-learn`, and `faktura-ai` into the end-to-end pipeline described by
//! spec §4 — per-source extraction, Compare & Choose, AI routing,
//! reconciliation, run report assembly, and file-level batching.

pub mod batch;
pub mod boundary;
pub mod compare;
pub mod context;
pub mod document;
pub mod export;
pub mod extract;
pub mod reconcile;
pub mod report;
pub mod retry;
pub mod review_package;

pub use batch::{run_batch, FileResult};
pub use boundary::{detect_boundaries, is_invoice_start};
pub use compare::{compare_paths, ComparisonOutcome};
pub use context::{PipelineConfig, PipelineContext};
pub use document::{prepare_embedded, prepare_ocr, EmbeddedPrepared, OcrPageQuality, OcrPrepared};
pub use export::{invoice_rows, rows_for_file, ExportRow};
pub use extract::{extract_header, extract_lines};
pub use reconcile::{assign_status, lines_sum, reconcile, StatusInputs};
pub use report::{FinalizedInvoice, ReportBuilder};
pub use retry::{build_page_context, resolve_total, FooterResolution};
pub use review_package::{trace_snippets, write_review_package, TraceSnippet};
