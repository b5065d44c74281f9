//! Resilient backend: ONNX detection + recognition pipeline.
//!
//! Detection finds text regions on the page, each region is cropped and
//! recognized separately, and region texts are reassembled into lines top to
//! bottom. Sessions are built against the accelerator first; when inference
//! dies with a memory-exhaustion error, the backend rebuilds CPU-only
//! sessions and retries the page once. Noisy scans that defeat tesseract
//! usually survive this pipeline.

pub mod det;
pub mod rec;
pub mod tensor;

use std::path::{Path, PathBuf};

use image::DynamicImage;
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::SessionBuilder;
use ort::session::Session;

use super::{OcrBackend, OcrError};
use det::{TextDetector, TextRegion};
use rec::TextRecognizer;

const INTRA_THREADS: usize = 4;

/// Map an inference failure to the error that drives the retry decision.
/// Accelerator allocators report exhaustion with wording that varies by
/// provider and driver version, so this matches loosely.
pub(crate) fn classify_inference_error(stage: &str, msg: &str) -> OcrError {
    let lower = msg.to_lowercase();
    if lower.contains("out of memory") || lower.contains("oom") || lower.contains("alloc") {
        OcrError::ResourceExhausted(format!("{stage}: {msg}"))
    } else {
        OcrError::Process(format!("{stage} inference failed: {msg}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionMode {
    Accelerated,
    CpuOnly,
}

/// The det+rec stages behind the backend. Split out so the retry policy in
/// [`OnnxBackend`] can be exercised without model files.
pub trait InferencePipeline: Send {
    fn run_page(&mut self, image: &DynamicImage) -> Result<String, OcrError>;

    /// Tear down the current sessions and rebuild without the accelerator.
    fn rebuild_cpu_only(&mut self) -> Result<(), OcrError>;
}

/// Real pipeline: detection and recognition sessions over the model files.
pub struct OnnxStages {
    det_model: PathBuf,
    rec_model: PathBuf,
    detector: TextDetector,
    recognizer: TextRecognizer,
}

impl OnnxStages {
    fn new(det_model: &Path, rec_model: &Path) -> Result<Self, OcrError> {
        let (detector, recognizer) =
            build_sessions(det_model, rec_model, SessionMode::Accelerated)?;
        Ok(Self {
            det_model: det_model.to_path_buf(),
            rec_model: rec_model.to_path_buf(),
            detector,
            recognizer,
        })
    }
}

impl InferencePipeline for OnnxStages {
    fn run_page(&mut self, image: &DynamicImage) -> Result<String, OcrError> {
        let (det_input, _input_w, _input_h) = tensor::prepare_det_input(image);
        let regions = self
            .detector
            .detect(det_input, image.width(), image.height())?;
        tracing::debug!(regions = regions.len(), "text detection complete");

        let mut recognized = Vec::with_capacity(regions.len());
        for region in &regions {
            let crop = crop_region(image, region);
            let rec_input = tensor::prepare_rec_input(&crop);
            let rec = self.recognizer.recognize(rec_input)?;
            if !rec.text.trim().is_empty() {
                recognized.push((*region, rec.text));
            }
        }

        Ok(assemble_lines(&recognized))
    }

    fn rebuild_cpu_only(&mut self) -> Result<(), OcrError> {
        let (detector, recognizer) =
            build_sessions(&self.det_model, &self.rec_model, SessionMode::CpuOnly)?;
        self.detector = detector;
        self.recognizer = recognizer;
        Ok(())
    }
}

pub struct OnnxBackend<P: InferencePipeline = OnnxStages> {
    pipeline: P,
    mode: SessionMode,
}

impl OnnxBackend<OnnxStages> {
    pub fn new(det_model: &Path, rec_model: &Path) -> Result<Self, OcrError> {
        Ok(Self {
            pipeline: OnnxStages::new(det_model, rec_model)?,
            mode: SessionMode::Accelerated,
        })
    }
}

#[cfg(test)]
impl<P: InferencePipeline> OnnxBackend<P> {
    fn with_pipeline(pipeline: P) -> Self {
        Self {
            pipeline,
            mode: SessionMode::Accelerated,
        }
    }
}

impl<P: InferencePipeline> OcrBackend for OnnxBackend<P> {
    /// One-way fallback: once a page has exhausted the accelerator the rest
    /// of the batch stays on CPU rather than thrashing, and a page is
    /// retried at most once.
    fn recognize(&mut self, image: &DynamicImage) -> Result<String, OcrError> {
        match self.pipeline.run_page(image) {
            Err(OcrError::ResourceExhausted(msg)) if self.mode == SessionMode::Accelerated => {
                tracing::warn!(error = %msg, "accelerator exhausted, retrying page on CPU");
                self.pipeline.rebuild_cpu_only()?;
                self.mode = SessionMode::CpuOnly;
                self.pipeline.run_page(image)
            }
            other => other,
        }
    }
}

fn build_sessions(
    det_model: &Path,
    rec_model: &Path,
    mode: SessionMode,
) -> Result<(TextDetector, TextRecognizer), OcrError> {
    let det = build_session(det_model, mode)?;
    let rec = build_session(rec_model, mode)?;
    Ok((TextDetector::new(det), TextRecognizer::new(rec)))
}

fn build_session(model: &Path, mode: SessionMode) -> Result<Session, OcrError> {
    let mut builder = session_builder()?;
    if mode == SessionMode::Accelerated {
        // Registration failure (no GPU, no driver) falls through to CPU at
        // runtime; exhaustion mid-batch is handled by the retry above.
        builder = builder
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .map_err(|e| OcrError::Init(e.to_string()))?;
    }
    builder
        .commit_from_file(model)
        .map_err(|e| OcrError::Init(format!("cannot load model {}: {e}", model.display())))
}

fn session_builder() -> Result<SessionBuilder, OcrError> {
    Session::builder()
        .and_then(|b| b.with_intra_threads(INTRA_THREADS))
        .map_err(|e| OcrError::Init(e.to_string()))
}

fn crop_region(image: &DynamicImage, region: &TextRegion) -> DynamicImage {
    let x = region.x.min(image.width().saturating_sub(1));
    let y = region.y.min(image.height().saturating_sub(1));
    let w = region.w.min(image.width() - x).max(1);
    let h = region.h.min(image.height() - y).max(1);
    image.crop_imm(x, y, w, h)
}

/// Join region texts into lines: regions whose vertical centers fall within
/// the previous region's height belong to the same line, ordered left to
/// right; lines are joined top to bottom with newlines.
fn assemble_lines(recognized: &[(TextRegion, String)]) -> String {
    let mut lines: Vec<Vec<&(TextRegion, String)>> = Vec::new();
    for entry in recognized {
        let (region, _) = entry;
        let center = region.y + region.h / 2;
        match lines.last_mut() {
            Some(line) => {
                let (anchor, _) = line[0];
                if center >= anchor.y && center < anchor.y + anchor.h {
                    line.push(entry);
                } else {
                    lines.push(vec![entry]);
                }
            }
            None => lines.push(vec![entry]),
        }
    }

    let mut out = String::new();
    for line in &mut lines {
        line.sort_by_key(|(region, _)| region.x);
        let joined = line
            .iter()
            .map(|(_, text)| text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&joined);
    }
    out
}
