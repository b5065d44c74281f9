//! End-to-end batch tests: fixture scanned PDFs in, named single-page PDFs,
//! audit log, and report out. OCR is scripted so the pipeline around it is
//! exercised deterministically.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use image::DynamicImage;
use lopdf::{dictionary, Document, Object, Stream};
use tempfile::tempdir;

use casesplit::batch::runner::BatchRunner;
use casesplit::ocr::{BackendPool, OcrBackend, OcrError};
use casesplit::{start_batch, BatchRequest, BatchStatus, ExtractionProfile};

/// Returns one scripted reply per page, in batch order.
struct ScriptedBackend {
    script: Arc<Mutex<VecDeque<Result<String, String>>>>,
}

impl OcrBackend for ScriptedBackend {
    fn recognize(&mut self, _image: &DynamicImage) -> Result<String, OcrError> {
        let mut script = self.script.lock().unwrap();
        match script.pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(OcrError::Process(msg)),
            None => Ok(String::new()),
        }
    }
}

fn scripted_pool(replies: Vec<Result<String, String>>) -> Arc<BackendPool> {
    let script = Arc::new(Mutex::new(VecDeque::from(replies)));
    Arc::new(BackendPool::with_backends(
        Box::new(ScriptedBackend {
            script: script.clone(),
        }),
        Box::new(ScriptedBackend { script }),
    ))
}

fn make_jpeg() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(200, 300, image::Rgb([128u8, 128, 128]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

/// Scanned-PDF fixture: `pages` pages, each carrying one JPEG XObject.
fn make_scanned_pdf(path: &Path, pages: usize) {
    let jpeg = make_jpeg();
    let mut doc = Document::with_version("1.4");

    let mut kids = Vec::new();
    for _ in 0..pages {
        let mut img_stream = Stream::new(
            dictionary! {
                "Type" => Object::Name(b"XObject".to_vec()),
                "Subtype" => Object::Name(b"Image".to_vec()),
                "Width" => Object::Integer(200),
                "Height" => Object::Integer(300),
                "ColorSpace" => Object::Name(b"DeviceRGB".to_vec()),
                "BitsPerComponent" => Object::Integer(8),
                "Filter" => Object::Name(b"DCTDecode".to_vec()),
                "Length" => Object::Integer(jpeg.len() as i64),
            },
            jpeg.clone(),
        );
        img_stream.allows_compression = false;
        let img_id = doc.add_object(Object::Stream(img_stream));

        let content = Stream::new(dictionary! {}, b"q 612 0 0 792 0 0 cm /Img1 Do Q".to_vec());
        let content_id = doc.add_object(Object::Stream(content));

        let page_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Page".to_vec()),
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Img1" => Object::Reference(img_id) },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let pages_id = doc.add_object(dictionary! {
        "Type" => Object::Name(b"Pages".to_vec()),
        "Kids" => kids.clone(),
        "Count" => Object::Integer(pages as i64),
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

fn lien_profile() -> ExtractionProfile {
    let mut profile = ExtractionProfile::builtin("lien").unwrap();
    // The builtin filter would hide fixture files named scan*.pdf.
    profile.filename_filter = None;
    profile
}

#[test]
fn batch_splits_matched_pages_and_reports() {
    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    make_scanned_pdf(&input.path().join("scan_a.pdf"), 3);
    make_scanned_pdf(&input.path().join("scan_b.pdf"), 1);

    // scan_a: match, no match, duplicate match; scan_b: match.
    let pool = scripted_pool(vec![
        Ok("Case No: AB1234\nrest of page".into()),
        Ok("nothing relevant here".into()),
        Ok("Case No: AB1234".into()),
        Ok("Case No: XY987".into()),
    ]);

    let request = BatchRequest {
        input_dir: input.path().to_path_buf(),
        output_root: out.path().to_path_buf(),
        log_dir: out.path().join("logs"),
        profile: lien_profile(),
        filename_filter: None,
    };
    let outcome = start_batch(request, pool, None).unwrap().join().unwrap();

    assert_eq!(outcome.status, BatchStatus::Completed);
    assert_eq!(outcome.documents_processed, 2);
    assert_eq!(outcome.documents_failed, 0);
    assert_eq!(outcome.pages_processed, 4);
    assert_eq!(outcome.pages_matched, 3);
    assert_eq!(outcome.results.len(), 4);

    // One result per page, in document-then-page order.
    assert_eq!(outcome.results[0].identifier.as_deref(), Some("AB1234"));
    assert_eq!(outcome.results[1].identifier, None);
    assert_eq!(outcome.results[3].identifier.as_deref(), Some("XY987"));

    // Duplicate identifier within a document gets the copy suffix.
    assert!(out.path().join("scan_a/AB1234.pdf").exists());
    assert!(out.path().join("scan_a/AB1234_copy1.pdf").exists());
    assert!(out.path().join("scan_b/XY987.pdf").exists());

    // Outputs are one-page PDFs.
    let split = Document::load(out.path().join("scan_a/AB1234.pdf")).unwrap();
    assert_eq!(split.page_iter().count(), 1);

    // Audit log accounts for every page.
    let log = std::fs::read_to_string(outcome.log_path.unwrap()).unwrap();
    assert!(log.contains("[scan_a.pdf - Page 1]"));
    assert!(log.contains("Extracted ID found: AB1234"));
    assert!(log.contains("No ID extracted on this page."));
    assert!(log.contains("[scan_b.pdf - Page 1]"));

    // Report written next to the outputs.
    let report = outcome.report_path.unwrap();
    assert!(report.exists());
    assert!(report
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("lien_general_report_"));
}

#[test]
fn page_and_document_failures_do_not_stop_the_batch() {
    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    make_scanned_pdf(&input.path().join("a_good.pdf"), 2);
    std::fs::write(input.path().join("b_corrupt.pdf"), b"not a pdf").unwrap();
    make_scanned_pdf(&input.path().join("c_good.pdf"), 1);

    // First page of a_good fails OCR; everything else succeeds.
    let pool = scripted_pool(vec![
        Err("simulated OCR crash".into()),
        Ok("Case No: AB1234".into()),
        Ok("Case No: CD5678".into()),
    ]);

    let request = BatchRequest {
        input_dir: input.path().to_path_buf(),
        output_root: out.path().to_path_buf(),
        log_dir: out.path().join("logs"),
        profile: lien_profile(),
        filename_filter: None,
    };
    let outcome = start_batch(request, pool, None).unwrap().join().unwrap();

    assert_eq!(outcome.status, BatchStatus::Completed);
    assert_eq!(outcome.documents_processed, 2);
    assert_eq!(outcome.documents_failed, 1);
    assert_eq!(outcome.pages_processed, 3);
    assert_eq!(outcome.pages_matched, 2);

    // The failed page still produced a result, with no identifier.
    assert_eq!(outcome.results[0].identifier, None);
    assert!(outcome.results[0].output_path.is_none());

    let log = std::fs::read_to_string(outcome.log_path.unwrap()).unwrap();
    assert!(log.contains("ERROR in a_good.pdf - Page 1:"));
    assert!(log.contains("ERROR in b_corrupt.pdf:"));
    assert!(out.path().join("c_good/CD5678.pdf").exists());
}

#[test]
fn progress_reaches_one_hundred_percent() {
    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    make_scanned_pdf(&input.path().join("scan_a.pdf"), 2);
    make_scanned_pdf(&input.path().join("scan_b.pdf"), 2);

    let pool = scripted_pool(vec![Ok("".into()); 4]);
    let seen = Arc::new(Mutex::new(Vec::<f32>::new()));
    let sink = seen.clone();
    let progress = Box::new(move |p: f32| sink.lock().unwrap().push(p));

    let request = BatchRequest {
        input_dir: input.path().to_path_buf(),
        output_root: out.path().to_path_buf(),
        log_dir: out.path().join("logs"),
        profile: lien_profile(),
        filename_filter: None,
    };
    start_batch(request, pool, Some(progress))
        .unwrap()
        .join()
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {seen:?}");
    assert!((seen[0] - 25.0).abs() < 0.01);
    assert!((seen[3] - 100.0).abs() < 0.01);
}

#[test]
fn progress_completes_when_last_document_fails_to_open() {
    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    make_scanned_pdf(&input.path().join("a_good.pdf"), 1);
    // Sorts after a_good, so the batch ends on a document that is skipped.
    std::fs::write(input.path().join("z_bad.pdf"), b"not a pdf").unwrap();

    let pool = scripted_pool(vec![Ok("".into())]);
    let seen = Arc::new(Mutex::new(Vec::<f32>::new()));
    let sink = seen.clone();
    let progress = Box::new(move |p: f32| sink.lock().unwrap().push(p));

    let request = BatchRequest {
        input_dir: input.path().to_path_buf(),
        output_root: out.path().to_path_buf(),
        log_dir: out.path().join("logs"),
        profile: lien_profile(),
        filename_filter: None,
    };
    let outcome = start_batch(request, pool, Some(progress))
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(outcome.documents_failed, 1);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2, "skipped document must emit progress: {seen:?}");
    assert!((seen[0] - 50.0).abs() < 0.01);
    assert!((seen[1] - 100.0).abs() < 0.01);
}

#[test]
fn cancelled_batch_stops_at_a_page_boundary() {
    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    make_scanned_pdf(&input.path().join("scan_a.pdf"), 2);

    let runner = BatchRunner::new(
        lien_profile(),
        scripted_pool(vec![Ok("Case No: AB1234".into()); 2]),
        out.path().to_path_buf(),
        out.path().join("logs"),
    )
    .unwrap();

    let cancel = AtomicBool::new(true);
    let documents = vec![input.path().join("scan_a.pdf")];
    let outcome = runner.run(&documents, &cancel, None);

    assert_eq!(outcome.status, BatchStatus::Cancelled);
    assert_eq!(outcome.pages_processed, 0);
    // Cancellation still yields the log and report artifacts.
    assert!(outcome.log_path.is_some());
    assert!(outcome.report_path.is_some());
}

#[test]
fn dropping_the_handle_cancels_and_joins() {
    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    make_scanned_pdf(&input.path().join("scan_a.pdf"), 1);

    let request = BatchRequest {
        input_dir: input.path().to_path_buf(),
        output_root: out.path().to_path_buf(),
        log_dir: out.path().join("logs"),
        profile: lien_profile(),
        filename_filter: None,
    };
    let handle = start_batch(request, scripted_pool(vec![Ok("".into())]), None).unwrap();
    handle.cancel();
    drop(handle);
    // Nothing to assert beyond "drop returned": the worker was joined.
}
