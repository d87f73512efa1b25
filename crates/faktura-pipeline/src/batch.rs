//! File-level worker pool (spec §5): each input file is prepared, boundary-
//! detected, and compared independently; files run in parallel via rayon
//! while each file's invoices are processed sequentially. Grounded on
//! `docling-cli`'s `batch_command` parallel/sequential dispatch and
//! fail-fast `should_stop` flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use faktura_core::{ErrorStage, FileError};
use rayon::prelude::*;

use crate::boundary::detect_boundaries;
use crate::compare::compare_paths;
use crate::context::PipelineContext;
use crate::document::{prepare_embedded, prepare_ocr};
use crate::report::FinalizedInvoice;

/// Outcome of processing one input file: either its finalized invoices, or
/// the error that stopped processing (spec §6 errors sidecar).
pub struct FileResult {
    pub file_path: String,
    pub invoices: Vec<FinalizedInvoice>,
    pub error: Option<FileError>,
}

/// Processes one file end to end: embedded-text preparation (always),
/// OCR preparation (only when the context has a renderer/OCR engine),
/// boundary detection on the embedded geometry, then Compare & Choose per
/// detected invoice range.
fn process_file(path: &str, ctx: &PipelineContext) -> FileResult {
    let embedded = match prepare_embedded(path) {
        Ok(e) => e,
        Err(err) => {
            return FileResult {
                file_path: path.to_string(),
                invoices: vec![],
                error: Some(FileError { file_path: path.to_string(), stage: ErrorStage::Read, kind: "pdf_read".to_string(), message: err.to_string() }),
            };
        }
    };

    let ocr = if ctx.ocr_available() {
        match prepare_ocr(path, &embedded.document, ctx) {
            Ok(o) => Some(o),
            Err(err) => {
                log::warn!("OCR preparation failed for {path}, continuing with embedded text only: {err}");
                None
            }
        }
    } else {
        None
    };

    let ranges = detect_boundaries(&embedded.document, ctx);

    let invoices = ranges
        .into_iter()
        .enumerate()
        .map(|(i, range)| {
            let virtual_id = format!("{path}#{i}");
            FinalizedInvoice::from(compare_paths(&embedded, ocr.as_ref(), range, path, virtual_id, ctx))
        })
        .collect();

    FileResult { file_path: path.to_string(), invoices, error: None }
}

/// Runs the batch over every input path, in parallel across files up to
/// [`PipelineContext::effective_worker_count`] workers. In `strict` mode, the
/// first file error sets a cooperative stop flag: files already dispatched
/// finish, but no new file starts processing (spec §5: "cancellation is
/// cooperative and takes effect at file boundaries, not mid-file").
#[must_use]
pub fn run_batch(paths: &[String], ctx: &PipelineContext, strict: bool) -> Vec<FileResult> {
    let should_stop = Arc::new(AtomicBool::new(false));
    let workers = ctx.effective_worker_count();

    let dispatch = |path: &String| -> FileResult {
        if strict && should_stop.load(Ordering::SeqCst) {
            return FileResult {
                file_path: path.clone(),
                invoices: vec![],
                error: Some(FileError {
                    file_path: path.clone(),
                    stage: ErrorStage::Read,
                    kind: "skipped".to_string(),
                    message: "skipped after a previous file failed in strict mode".to_string(),
                }),
            };
        }
        let result = process_file(path, ctx);
        if strict && result.error.is_some() {
            should_stop.store(true, Ordering::SeqCst);
        }
        result
    };

    if workers > 1 {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build();
        match pool {
            Ok(pool) => pool.install(|| paths.par_iter().map(dispatch).collect()),
            Err(e) => {
                log::warn!("failed to build a {workers}-thread pool, falling back to the global pool: {e}");
                paths.par_iter().map(dispatch).collect()
            }
        }
    } else {
        paths.iter().map(dispatch).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PipelineConfig;

    #[test]
    fn missing_file_produces_a_read_error_not_a_panic() {
        let ctx = PipelineContext::new(PipelineConfig { worker_count: Some(1), ..PipelineConfig::default() });
        let results = run_batch(&["/nonexistent/path/does-not-exist.pdf".to_string()], &ctx, false);
        assert_eq!(results.len(), 1);
        assert!(results[0].error.is_some());
        assert!(results[0].invoices.is_empty());
    }

    #[test]
    fn strict_mode_skips_files_after_a_failure() {
        let ctx = PipelineContext::new(PipelineConfig { worker_count: Some(1), ..PipelineConfig::default() });
        let paths = vec!["/nonexistent/a.pdf".to_string(), "/nonexistent/b.pdf".to_string()];
        let results = run_batch(&paths, &ctx, true);
        assert_eq!(results.len(), 2);
        assert!(results[1].error.as_ref().unwrap().kind == "skipped" || results[1].error.as_ref().unwrap().kind == "pdf_read");
    }
}
