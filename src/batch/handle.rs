//! Background batch execution.
//!
//! One dedicated worker thread per batch keeps the caller (CLI or embedding
//! UI) responsive. The handle owns a cancel flag checked at page boundaries
//! and the worker's join handle; dropping the handle cancels the batch and
//! waits for the worker so no thread outlives its owner.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::runner::{collect_documents, BatchRunner};
use super::{BatchOutcome, PipelineError};
use crate::ocr::BackendPool;
use crate::profile::ExtractionProfile;

/// Everything needed to start one batch.
pub struct BatchRequest {
    pub input_dir: PathBuf,
    pub output_root: PathBuf,
    pub log_dir: PathBuf,
    pub profile: ExtractionProfile,
    /// Overrides the profile's default filename filter when set.
    pub filename_filter: Option<String>,
}

impl BatchRequest {
    fn effective_filter(&self) -> Option<String> {
        self.filename_filter
            .clone()
            .or_else(|| self.profile.filename_filter.clone())
    }
}

#[derive(Debug)]
pub struct BatchHandle {
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<BatchOutcome>>,
}

impl BatchHandle {
    /// Request cancellation. The batch stops at the next page boundary;
    /// output written so far remains valid.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Wait for the batch and take its outcome. `None` if the worker
    /// panicked.
    pub fn join(mut self) -> Option<BatchOutcome> {
        self.worker.take().and_then(|worker| worker.join().ok())
    }
}

impl Drop for BatchHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.cancel.store(true, Ordering::SeqCst);
            let _ = worker.join();
        }
    }
}

/// Validate the request, enumerate its documents, and start the worker
/// thread. Fails fast (before spawning) on an unreadable input folder or an
/// invalid profile pattern.
pub fn start_batch(
    request: BatchRequest,
    pool: Arc<BackendPool>,
    progress: Option<Box<dyn Fn(f32) + Send>>,
) -> Result<BatchHandle, PipelineError> {
    let documents = collect_documents(&request.input_dir, request.effective_filter().as_deref())?;
    let runner = BatchRunner::new(
        request.profile,
        pool,
        request.output_root,
        request.log_dir,
    )?;

    let cancel = Arc::new(AtomicBool::new(false));
    let worker_cancel = cancel.clone();
    let worker = std::thread::spawn(move || {
        runner.run(&documents, &worker_cancel, progress.as_deref())
    });

    Ok(BatchHandle {
        cancel,
        worker: Some(worker),
    })
}
