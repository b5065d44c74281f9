//! Structured backend: tesseract CLI wrapper.
//!
//! Shells out to the system `tesseract` binary with plain-text stdout
//! output. Line structure in the output comes straight from tesseract's
//! layout analysis, which is what the line-scoped extraction profiles rely
//! on.

use std::process::Command;

use image::DynamicImage;

use super::{OcrBackend, OcrError};

#[derive(Debug)]
pub struct TesseractBackend {
    binary: String,
    lang: String,
    psm: u32,
}

impl TesseractBackend {
    /// Verify the binary runs before accepting it. A missing tesseract
    /// install should fail the first structured page with a clear message,
    /// not a cryptic spawn error mid-recognition.
    pub fn new(binary: Option<&str>, lang: &str, psm: u32) -> Result<Self, OcrError> {
        let binary = binary.unwrap_or("tesseract").to_string();
        let version = tesseract_version(&binary)?;
        tracing::info!(binary = %binary, version = %version, "tesseract backend ready");
        Ok(Self {
            binary,
            lang: lang.to_string(),
            psm,
        })
    }
}

impl OcrBackend for TesseractBackend {
    fn recognize(&mut self, image: &DynamicImage) -> Result<String, OcrError> {
        let input = tempfile::Builder::new()
            .prefix("casesplit_ocr_")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Process(format!("cannot create temp image: {e}")))?;
        image
            .save(input.path())
            .map_err(|e| OcrError::Process(format!("cannot write temp image: {e}")))?;

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("--psm")
            .arg(self.psm.to_string())
            .output()
            .map_err(|e| OcrError::Process(format!("cannot run {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Process(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Version string from `tesseract --version`, first line. Also serves as the
/// availability probe.
fn tesseract_version(binary: &str) -> Result<String, OcrError> {
    let output = Command::new(binary)
        .arg("--version")
        .output()
        .map_err(|e| OcrError::Init(format!("tesseract not available ({binary}): {e}")))?;

    if !output.status.success() {
        return Err(OcrError::Init(format!(
            "{binary} --version failed with {}",
            output.status
        )));
    }

    // tesseract prints its version banner on stderr on some platforms.
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    for line in combined.lines() {
        if line.contains("tesseract") {
            if let Some(version) = line.split_whitespace().nth(1) {
                return Ok(version.trim_start_matches('v').to_string());
            }
        }
    }
    Ok("unknown".to_string())
}
