//! OCR backends.
//!
//! Two backends with different failure characteristics:
//!
//! - **Structured** ([`tesseract::TesseractBackend`]): wraps the tesseract
//!   CLI. Fast, preserves line layout well, the right choice for clean
//!   machine-printed scans.
//! - **Resilient** ([`onnx::OnnxBackend`]): detection + recognition ONNX
//!   models. Slower but tolerant of skew and noise, and it recovers from
//!   accelerator memory exhaustion by falling back to CPU sessions.
//!
//! Backends are expensive to build, so [`BackendPool`] initializes each one
//! lazily on first use and reuses it for the rest of the process. The pool is
//! built once by the host and injected into the batch runner; it is not
//! designed for concurrent batches.

pub mod onnx;
pub mod tesseract;

use std::path::PathBuf;
use std::sync::Mutex;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    /// Backend could not be constructed (missing binary, missing model).
    #[error("OCR backend initialization failed: {0}")]
    Init(String),

    /// Invalid backend configuration.
    #[error("OCR configuration error: {0}")]
    Config(String),

    /// Recognition of one page image failed.
    #[error("OCR processing failed: {0}")]
    Process(String),

    /// The accelerator ran out of memory; the page may succeed on CPU.
    #[error("OCR resource exhaustion: {0}")]
    ResourceExhausted(String),
}

/// Which OCR backend a profile wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    Structured,
    Resilient,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Structured => f.write_str("structured"),
            BackendKind::Resilient => f.write_str("resilient"),
        }
    }
}

/// One OCR backend: page image in, recognized text out.
///
/// `&mut self` because ONNX inference sessions require exclusive access;
/// backends live behind the pool's mutexes.
pub trait OcrBackend: Send {
    fn recognize(&mut self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Backend construction settings, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Tesseract binary; `None` = resolve `tesseract` from PATH.
    pub tesseract_binary: Option<String>,
    /// Tesseract language pack.
    pub lang: String,
    /// Tesseract page segmentation mode.
    pub psm: u32,
    /// Detection model (ONNX).
    pub det_model: PathBuf,
    /// Recognition model (ONNX).
    pub rec_model: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        let model_dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("casesplit")
            .join("models");
        Self {
            tesseract_binary: None,
            lang: "eng".to_string(),
            psm: 3,
            det_model: model_dir.join("det.onnx"),
            rec_model: model_dir.join("rec.onnx"),
        }
    }
}

/// Lazily-initialized, process-wide backend holder.
///
/// Each backend is built on first request and kept for subsequent pages.
/// Initialization failure is returned to the caller and retried on the next
/// request rather than cached.
pub struct BackendPool {
    config: OcrConfig,
    structured: Mutex<Option<Box<dyn OcrBackend>>>,
    resilient: Mutex<Option<Box<dyn OcrBackend>>>,
}

impl BackendPool {
    pub fn new(config: OcrConfig) -> Self {
        Self {
            config,
            structured: Mutex::new(None),
            resilient: Mutex::new(None),
        }
    }

    /// Pool with pre-built backends. Lets tests and embedders substitute
    /// their own [`OcrBackend`] implementations.
    pub fn with_backends(
        structured: Box<dyn OcrBackend>,
        resilient: Box<dyn OcrBackend>,
    ) -> Self {
        Self {
            config: OcrConfig::default(),
            structured: Mutex::new(Some(structured)),
            resilient: Mutex::new(Some(resilient)),
        }
    }

    /// Run OCR on one page image with the requested backend, initializing it
    /// first if this is its first use.
    pub fn recognize(
        &self,
        kind: BackendKind,
        image: &DynamicImage,
    ) -> Result<String, OcrError> {
        let slot = match kind {
            BackendKind::Structured => &self.structured,
            BackendKind::Resilient => &self.resilient,
        };
        let mut guard = slot
            .lock()
            .map_err(|_| OcrError::Process("backend mutex poisoned".into()))?;

        if guard.is_none() {
            tracing::info!(backend = %kind, "initializing OCR backend");
            *guard = Some(self.build(kind)?);
        }
        match guard.as_mut() {
            Some(backend) => backend.recognize(image),
            None => Err(OcrError::Init("backend slot empty after init".into())),
        }
    }

    fn build(&self, kind: BackendKind) -> Result<Box<dyn OcrBackend>, OcrError> {
        match kind {
            BackendKind::Structured => Ok(Box::new(tesseract::TesseractBackend::new(
                self.config.tesseract_binary.as_deref(),
                &self.config.lang,
                self.config.psm,
            )?)),
            BackendKind::Resilient => Ok(Box::new(onnx::OnnxBackend::new(
                &self.config.det_model,
                &self.config.rec_model,
            )?)),
        }
    }
}
