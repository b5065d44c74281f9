//! The batch runner: one profile, one folder, sequential page loop.
//!
//! Documents are processed in sorted order, pages within a document in
//! order. One page is in flight at a time; its image is released before the
//! next page starts, which keeps memory flat regardless of document size.
//! Every failure is contained at the smallest scope that can absorb it: a
//! page failure produces an empty result, a document failure skips the
//! document, and the batch always returns an outcome.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;

use super::{BatchOutcome, BatchStatus, ExtractionResult, PipelineError};
use crate::audit::{self, AuditLog};
use crate::extract::PageExtractor;
use crate::naming;
use crate::ocr::{BackendKind, BackendPool};
use crate::pdf::{EmbeddedScanRasterizer, PageRasterizer, SourceDocument};
use crate::preprocess;
use crate::profile::ExtractionProfile;
use crate::report;

/// Progress callback, 0.0–100.0, invoked after every page.
pub type ProgressFn = dyn Fn(f32) + Send;

/// Enumerate the batch's input documents: `.pdf` files directly in
/// `input_dir`, optionally filtered by a case-insensitive filename
/// substring, sorted by name for deterministic batch order.
pub fn collect_documents(
    input_dir: &Path,
    filename_filter: Option<&str>,
) -> std::io::Result<Vec<PathBuf>> {
    let filter = filename_filter.map(str::to_lowercase);
    let mut documents = Vec::new();

    for entry in std::fs::read_dir(input_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_pdf = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if !is_pdf {
            continue;
        }
        if let Some(filter) = &filter {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if !name.contains(filter) {
                continue;
            }
        }
        documents.push(path);
    }

    documents.sort();
    Ok(documents)
}

pub struct BatchRunner {
    profile: ExtractionProfile,
    extractor: PageExtractor,
    rasterizer: Box<dyn PageRasterizer>,
    pool: Arc<BackendPool>,
    output_root: PathBuf,
    log_dir: PathBuf,
}

impl BatchRunner {
    pub fn new(
        profile: ExtractionProfile,
        pool: Arc<BackendPool>,
        output_root: PathBuf,
        log_dir: PathBuf,
    ) -> Result<Self, PipelineError> {
        let extractor = PageExtractor::new(profile.clone())
            .map_err(|e| PipelineError::Profile(format!("bad pattern: {e}")))?;
        Ok(Self {
            profile,
            extractor,
            rasterizer: Box::new(EmbeddedScanRasterizer),
            pool,
            output_root,
            log_dir,
        })
    }

    /// Substitute the page rasterizer. Tests use this to feed synthetic
    /// pages through the full loop.
    pub fn with_rasterizer(mut self, rasterizer: Box<dyn PageRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// Run the batch to completion or cancellation. Cancellation is honored
    /// at page boundaries only; output written so far stays valid.
    pub fn run(
        &self,
        documents: &[PathBuf],
        cancel: &AtomicBool,
        progress: Option<&ProgressFn>,
    ) -> BatchOutcome {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let batch_started = Local::now();
        let total_docs = documents.len();

        tracing::info!(
            batch_id = %batch_id,
            profile = %self.profile.id,
            documents = total_docs,
            "batch started"
        );

        match audit::clean_old_logs(&self.log_dir) {
            Ok(n) if n > 0 => tracing::info!(removed = n, "removed expired logs"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "log housekeeping failed"),
        }

        let log = match AuditLog::create(&self.log_dir, &self.profile.id) {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::error!(error = %e, "cannot create audit log, continuing without it");
                None
            }
        };

        let mut outcome = BatchOutcome {
            batch_id,
            status: BatchStatus::Completed,
            documents_processed: 0,
            documents_failed: 0,
            pages_processed: 0,
            pages_matched: 0,
            results: Vec::new(),
            log_path: log.as_ref().map(|l| l.path().to_path_buf()),
            report_path: None,
            report_error: None,
        };

        'documents: for (doc_idx, path) in documents.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                outcome.status = BatchStatus::Cancelled;
                break;
            }

            let doc_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            let document = match SourceDocument::open(path) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::error!(document = %doc_name, error = %e, "skipping document");
                    log_error(&log, &doc_name, &e.to_string());
                    outcome.documents_failed += 1;
                    // A skipped document still advances progress; otherwise
                    // a batch ending in a bad file never reaches 100.
                    if let Some(progress) = progress {
                        progress((doc_idx + 1) as f32 / total_docs as f32 * 100.0);
                    }
                    continue;
                }
            };

            let output_dir = self.output_root.join(doc_stem(path));
            let page_count = document.page_count();

            for page_index in 0..page_count {
                if cancel.load(Ordering::SeqCst) {
                    outcome.status = BatchStatus::Cancelled;
                    break 'documents;
                }

                let result = match self.process_page(&document, page_index, &output_dir) {
                    Ok(result) => result,
                    Err(e) => {
                        let context = format!("{doc_name} - Page {}", page_index + 1);
                        tracing::error!(context = %context, error = %e, "page failed");
                        log_error(&log, &context, &e.to_string());
                        ExtractionResult {
                            document: path.clone(),
                            page_index,
                            identifier: None,
                            date_found: None,
                            output_path: None,
                            extracted_at: Local::now(),
                            written_at: None,
                        }
                    }
                };

                if let Some(log) = &log {
                    let logged = match (&result.identifier, &result.output_path) {
                        (Some(id), Some(out)) => {
                            log.record_match(&doc_name, page_index + 1, id, out)
                        }
                        _ => log.record_no_match(&doc_name, page_index + 1),
                    };
                    if let Err(e) = logged {
                        tracing::warn!(error = %e, "audit log write failed");
                    }
                }

                outcome.pages_processed += 1;
                if result.output_path.is_some() {
                    outcome.pages_matched += 1;
                }
                outcome.results.push(result);

                if let Some(progress) = progress {
                    let fraction = (page_index + 1) as f32 / page_count as f32;
                    progress((doc_idx as f32 + fraction) / total_docs as f32 * 100.0);
                }
            }

            outcome.documents_processed += 1;
        }

        outcome.set_report(report::write_report(
            &self.output_root,
            &self.profile.id,
            batch_started,
            &outcome.results,
        ));

        tracing::info!(
            batch_id = %outcome.batch_id,
            status = ?outcome.status,
            pages = outcome.pages_processed,
            matched = outcome.pages_matched,
            failed_documents = outcome.documents_failed,
            "batch finished"
        );
        outcome
    }

    /// One page, start to finish: rasterize, preprocess, OCR, extract, and
    /// (on a match) write the named single-page PDF.
    fn process_page(
        &self,
        document: &SourceDocument,
        page_index: usize,
        output_dir: &Path,
    ) -> Result<ExtractionResult, PipelineError> {
        let image = self
            .rasterizer
            .rasterize(document.document(), page_index, self.profile.dpi)?;
        let prepared = match self.profile.backend {
            BackendKind::Structured => preprocess::for_structured(&image),
            BackendKind::Resilient => preprocess::for_resilient(&image),
        };
        drop(image);

        let text = self.pool.recognize(self.profile.backend, &prepared)?;
        drop(prepared);

        let fields = self.extractor.extract(&text);
        let extracted_at = Local::now();

        let mut output_path = None;
        let mut written_at = None;
        if let Some(identifier) = &fields.identifier {
            std::fs::create_dir_all(output_dir)?;
            let base = self
                .profile
                .output_basename(identifier, fields.notice.as_deref());
            let dest = naming::reserve(output_dir, &base, "pdf");
            document.write_single_page(page_index, &dest)?;
            written_at = Some(Local::now());
            output_path = Some(dest);
        }

        Ok(ExtractionResult {
            document: document.path().to_path_buf(),
            page_index,
            identifier: fields.identifier,
            date_found: fields.date,
            output_path,
            extracted_at,
            written_at,
        })
    }
}

fn doc_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

fn log_error(log: &Option<AuditLog>, context: &str, message: &str) {
    if let Some(log) = log {
        if let Err(e) = log.record_error(context, message) {
            tracing::warn!(error = %e, "audit log write failed");
        }
    }
}
