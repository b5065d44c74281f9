//! casesplit: batch splitter for scanned legal PDFs.
//!
//! Given a folder of scanned, multi-page PDFs, the pipeline rasterizes each
//! page, runs OCR, locates a document-type-specific identifier (case number,
//! file number) next to a known anchor keyword, and writes each matched page
//! out as an individually named single-page PDF. Every run produces an
//! append-only audit log and a spreadsheet report.
//!
//! The pipeline is parameterized by an [`ExtractionProfile`]: one generic
//! extraction algorithm driven by per-document-type configuration (keyword
//! variants, token validation, OCR backend choice, naming template) instead
//! of one hard-coded routine per document type.

pub mod audit;
pub mod batch;
pub mod extract;
pub mod naming;
pub mod ocr;
pub mod pdf;
pub mod preprocess;
pub mod profile;
pub mod report;

pub use batch::handle::{start_batch, BatchHandle, BatchRequest};
pub use batch::runner::collect_documents;
pub use batch::{BatchOutcome, BatchStatus, ExtractionResult, PipelineError};
pub use extract::PageExtractor;
pub use ocr::{BackendKind, BackendPool, OcrError};
pub use profile::{AnchorStrategy, ExtractionProfile, Matcher, NoticeTerm, TokenRule};
