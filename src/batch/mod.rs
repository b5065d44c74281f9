//! Batch orchestration: error taxonomy, per-page results, batch outcome.

pub mod handle;
pub mod runner;

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;

use crate::ocr::OcrError;
use crate::report::ReportError;

/// Page- and document-level pipeline failures.
///
/// None of these abort a batch: page errors become empty results, document
/// errors skip the document, and the batch always reaches its outcome.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot open document {path}: {reason}")]
    DocumentOpen { path: PathBuf, reason: String },

    #[error("rasterization failed: {0}")]
    Rasterize(String),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error("cannot write {path}: {reason}")]
    FileWrite { path: PathBuf, reason: String },

    #[error("invalid profile: {0}")]
    Profile(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Exactly one per processed page, in batch order. A page that matched
/// nothing still gets a result with `identifier: None`.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub document: PathBuf,
    /// 0-based page index within the document.
    pub page_index: usize,
    pub identifier: Option<String>,
    pub date_found: Option<String>,
    /// Where the single-page PDF landed, when the page matched.
    pub output_path: Option<PathBuf>,
    pub extracted_at: DateTime<Local>,
    /// When the output PDF was written. `None` when no file was produced.
    pub written_at: Option<DateTime<Local>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchStatus {
    Completed,
    Cancelled,
}

/// Final accounting for one batch run. Always produced, even for a
/// cancelled or entirely failed batch.
#[derive(Debug, Serialize)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub status: BatchStatus,
    pub documents_processed: usize,
    pub documents_failed: usize,
    pub pages_processed: usize,
    pub pages_matched: usize,
    pub results: Vec<ExtractionResult>,
    /// Audit log location; `None` only when the log itself could not be
    /// created.
    pub log_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    /// Report failure, kept recoverable: PDFs and log are already on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_error: Option<String>,
}

impl BatchOutcome {
    pub(crate) fn set_report(&mut self, result: Result<PathBuf, ReportError>) {
        match result {
            Ok(path) => self.report_path = Some(path),
            Err(e) => {
                tracing::error!(error = %e, "report generation failed");
                self.report_error = Some(e.to_string());
            }
        }
    }
}
