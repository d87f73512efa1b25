//! Core data model shared by every stage of the invoice extraction pipeline:
//! page geometry, the invoice domain types, error taxonomy, and run report
//! serialization.
//!
//! Nothing in this crate touches a PDF, an OCR engine, or an AI provider —
//! those are the external collaborators the rest of the workspace wraps.

pub mod error;
pub mod invoice;
pub mod report;
pub mod serializer;
pub mod types;

pub use error::{ErrorStage, FakturaError, FileError, Result};
pub use invoice::{
    Correction, ExtractionSource, InvoiceFooter, InvoiceHeader, InvoiceLine, KeywordClass, Pattern, Status,
    Traceability, ValidationResult, VirtualInvoice,
};
pub use report::{CandidateScore, ExtractionDetail, FileOutcome, InvoiceReportEntry, QualityScores, RunReport, StatusCounts, ValidationQueueEntry};
pub use types::{BBox, Document, Page, Row, Segment, SegmentKind, Token};
