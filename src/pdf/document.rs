//! Read-only access to a source PDF plus single-page output writing.

use std::path::{Path, PathBuf};

use lopdf::Document;

use crate::batch::PipelineError;

/// One input PDF, parsed once at batch start and held read-only for the
/// duration of the document's page loop.
#[derive(Debug)]
pub struct SourceDocument {
    path: PathBuf,
    doc: Document,
    page_count: usize,
}

impl SourceDocument {
    /// Parse the PDF at `path`. Corrupt or unreadable files fail here, before
    /// any page work starts, so the batch can skip the whole document.
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let doc = Document::load(path).map_err(|e| PipelineError::DocumentOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let page_count = doc.page_iter().count();
        Ok(Self {
            path: path.to_path_buf(),
            doc,
            page_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Write page `page_index` (0-based) as a standalone one-page PDF at
    /// `dest`. The source document is never modified; the page is carved out
    /// of a clone and unreferenced objects are pruned before saving.
    pub fn write_single_page(&self, page_index: usize, dest: &Path) -> Result<(), PipelineError> {
        if page_index >= self.page_count {
            return Err(PipelineError::FileWrite {
                path: dest.to_path_buf(),
                reason: format!(
                    "page {} out of range ({} pages)",
                    page_index + 1,
                    self.page_count
                ),
            });
        }

        let mut single = self.doc.clone();
        // lopdf page numbers are 1-based.
        let keep = page_index as u32 + 1;
        let delete: Vec<u32> = (1..=self.page_count as u32).filter(|p| *p != keep).collect();
        if !delete.is_empty() {
            single.delete_pages(&delete);
        }
        single.prune_objects();
        single.save(dest).map_err(|e| PipelineError::FileWrite {
            path: dest.to_path_buf(),
            reason: e.to_string(),
        })?;

        tracing::debug!(page = page_index + 1, dest = %dest.display(), "wrote single-page PDF");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object, Stream};
    use tempfile::tempdir;

    /// Minimal text PDF with `n` pages, one marker line per page.
    fn make_pdf(path: &Path, n: usize) {
        let mut doc = Document::with_version("1.4");
        let font_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Font".to_vec()),
            "Subtype" => Object::Name(b"Type1".to_vec()),
            "BaseFont" => Object::Name(b"Helvetica".to_vec()),
        });

        let mut kids = Vec::new();
        for i in 0..n {
            let content = Stream::new(
                dictionary! {},
                format!("BT /F1 12 Tf 100 700 Td (Page {i}) Tj ET").into_bytes(),
            );
            let content_id = doc.add_object(Object::Stream(content));
            let page_id = doc.add_object(dictionary! {
                "Type" => Object::Name(b"Page".to_vec()),
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => Object::Reference(content_id),
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => Object::Reference(font_id) },
                },
            });
            kids.push(Object::Reference(page_id));
        }

        let pages_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Kids" => kids.clone(),
            "Count" => Object::Integer(n as i64),
        });
        for kid in &kids {
            if let Object::Reference(id) = kid {
                if let Ok(Object::Dictionary(ref mut dict)) = doc.get_object_mut(*id) {
                    dict.set("Parent", Object::Reference(pages_id));
                }
            }
        }
        let catalog_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Catalog".to_vec()),
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc.save(path).unwrap();
    }

    #[test]
    fn open_reports_page_count() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("in.pdf");
        make_pdf(&src, 3);
        let doc = SourceDocument::open(&src).unwrap();
        assert_eq!(doc.page_count(), 3);
    }

    #[test]
    fn open_missing_file_is_document_open_error() {
        let err = SourceDocument::open(Path::new("/no/such/file.pdf")).unwrap_err();
        assert!(matches!(err, PipelineError::DocumentOpen { .. }));
    }

    #[test]
    fn single_page_output_has_one_page() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("in.pdf");
        make_pdf(&src, 3);
        let doc = SourceDocument::open(&src).unwrap();

        let out = dir.path().join("page2.pdf");
        doc.write_single_page(1, &out).unwrap();

        let written = Document::load(&out).unwrap();
        assert_eq!(written.page_iter().count(), 1);
        // Source is untouched.
        assert_eq!(doc.page_count(), 3);
    }

    #[test]
    fn out_of_range_page_is_rejected() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("in.pdf");
        make_pdf(&src, 1);
        let doc = SourceDocument::open(&src).unwrap();
        let err = doc
            .write_single_page(4, &dir.path().join("out.pdf"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::FileWrite { .. }));
    }
}
