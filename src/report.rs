//! Spreadsheet report, one row per processed page.
//!
//! The report mirrors the result collection in batch order, so a row with an
//! empty Case Number is a page that matched nothing. Report failure is
//! recoverable: the split PDFs and the audit log already exist on disk, so
//! the error travels back in the batch outcome instead of failing the run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use thiserror::Error;

use crate::batch::ExtractionResult;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("workbook error: {0}")]
    Workbook(#[from] XlsxError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

const HEADERS: [&str; 5] = [
    "Case Number",
    "Date Found",
    "Current Datestamp",
    "PDF Modified Date",
    "Source Path",
];

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Write `<dir>/<profile>_general_report_<YYYY-MM-DD_HH-MM-SS>.xlsx` and
/// return its path.
pub fn write_report(
    dir: &Path,
    profile_id: &str,
    batch_started: DateTime<Local>,
    results: &[ExtractionResult],
) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(dir)?;
    let stamp = batch_started.format("%Y-%m-%d_%H-%M-%S");
    let path = dir.join(format!("{profile_id}_general_report_{stamp}.xlsx"));

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }

    let started = batch_started.format(TS_FORMAT).to_string();
    for (i, result) in results.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, result.identifier.as_deref().unwrap_or(""))?;
        sheet.write_string(row, 1, result.date_found.as_deref().unwrap_or(""))?;
        sheet.write_string(row, 2, &started)?;
        let modified = result
            .written_at
            .map(|t| t.format(TS_FORMAT).to_string())
            .unwrap_or_default();
        sheet.write_string(row, 3, &modified)?;
        sheet.write_string(row, 4, &result.document.display().to_string())?;
    }

    workbook.save(&path)?;
    tracing::info!(path = %path.display(), rows = results.len(), "report written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn result(identifier: Option<&str>) -> ExtractionResult {
        ExtractionResult {
            document: PathBuf::from("/in/scan042.pdf"),
            page_index: 0,
            identifier: identifier.map(str::to_string),
            date_found: None,
            output_path: identifier.map(|id| PathBuf::from(format!("/out/{id}.pdf"))),
            extracted_at: Local::now(),
            written_at: identifier.map(|_| Local::now()),
        }
    }

    #[test]
    fn report_file_is_named_after_profile_and_start_time() {
        let dir = tempdir().unwrap();
        let started = Local::now();
        let path = write_report(dir.path(), "lien", started, &[result(Some("24-1234"))]).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("lien_general_report_"));
        assert!(name.ends_with(".xlsx"));
        assert!(path.exists());
    }

    #[test]
    fn empty_batch_still_produces_a_report() {
        let dir = tempdir().unwrap();
        let path = write_report(dir.path(), "lien", Local::now(), &[]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn unmatched_pages_get_rows_too() {
        let dir = tempdir().unwrap();
        let results = vec![result(Some("24-1234")), result(None)];
        let path = write_report(dir.path(), "lien", Local::now(), &results).unwrap();
        // xlsx is a zip container; just check it is non-trivial.
        assert!(std::fs::metadata(&path).unwrap().len() > 500);
    }
}
