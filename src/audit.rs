//! Append-only batch audit log.
//!
//! This is a pipeline *output*, not diagnostics: the operators file the log
//! alongside the split PDFs, so the entry formats are part of the external
//! contract and stay stable. Diagnostics go through `tracing` instead.
//!
//! Entry formats:
//!
//! ```text
//! [2025-04-25 14:02:11] [scan042.pdf - Page 3]
//! Extracted ID found: 24-001234
//! Renamed and saved as: /out/scan042/24-001234.pdf
//!
//! [2025-04-25 14:02:13] [scan042.pdf - Page 4]
//! No ID extracted on this page.
//!
//! [2025-04-25 14:02:14] ERROR in scan043.pdf:
//! cannot open document
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Local;

/// How long finished batch logs are kept before housekeeping removes them.
const LOG_RETENTION_DAYS: u64 = 30;

pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Create the log file for one batch:
    /// `<dir>/<profile>_<YYYY-MM-DD_HH-MM-SS>_log.txt`.
    pub fn create(dir: &Path, profile_id: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let path = dir.join(format!("{profile_id}_{stamp}_log.txt"));
        fs::File::create(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A page whose identifier was extracted and whose PDF was written.
    pub fn record_match(
        &self,
        document: &str,
        page_number: usize,
        identifier: &str,
        saved_as: &Path,
    ) -> io::Result<()> {
        self.append(&format!(
            "[{}] [{document} - Page {page_number}]\nExtracted ID found: {identifier}\nRenamed and saved as: {}\n\n",
            timestamp(),
            saved_as.display()
        ))
    }

    /// A page that yielded no identifier. Normal outcome, still logged so
    /// the operator can account for every page.
    pub fn record_no_match(&self, document: &str, page_number: usize) -> io::Result<()> {
        self.append(&format!(
            "[{}] [{document} - Page {page_number}]\nNo ID extracted on this page.\n\n",
            timestamp()
        ))
    }

    /// A page or document failure. The batch continues; the log explains the
    /// gap.
    pub fn record_error(&self, context: &str, message: &str) -> io::Result<()> {
        self.append(&format!(
            "[{}] ERROR in {context}:\n{message}\n\n",
            timestamp()
        ))
    }

    fn append(&self, entry: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(entry.as_bytes())
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Delete batch logs older than the retention window. Returns how many were
/// removed. Called at batch start; failure here never blocks the batch.
pub fn clean_old_logs(dir: &Path) -> io::Result<usize> {
    let cutoff = SystemTime::now() - Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);
    let mut removed = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.ends_with("_log.txt") {
            continue;
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => continue,
        };
        if modified < cutoff {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "could not remove old log");
                }
            }
        }
    }
    Ok(removed)
}
