//! PDF reading, tokenization (embedded-text and OCR), row/segment layout
//! analysis, and multi-invoice boundary detection.

pub mod boundary;
pub mod layout;
pub mod reader;
pub mod tokenize_embedded;
pub mod tokenize_ocr;
pub mod traits;

pub use boundary::{has_fallback_boundary_signal, row_has_date_and_amount, row_has_faktura_keyword, InvoiceRange};
pub use layout::{group_rows, identify_segments, is_wrap_row, MAX_WRAP_ROWS};
pub use reader::{classify, read, PageClass};
pub use tokenize_embedded::{text_quality, TextQuality};
pub use tokenize_ocr::{metrics as ocr_metrics, should_retry_at_higher_dpi, OcrMetrics};
pub use traits::{OcrEngine, OcrWord, PageRenderer, RenderedPage, BASELINE_DPI, RETRY_DPI};
