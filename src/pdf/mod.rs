//! PDF input/output: source document access and page rasterization.
//!
//! Scanned legal PDFs are, in practice, one full-page image per page. The
//! rasterizer therefore extracts the embedded scan image rather than running
//! a full PDF renderer; [`rasterize::PageRasterizer`] is the seam for
//! swapping in a real renderer later.

pub mod document;
pub mod rasterize;

pub use document::SourceDocument;
pub use rasterize::{EmbeddedScanRasterizer, PageRasterizer};
