//! Unique output-name reservation.
//!
//! Two pages extracting the same identifier must never overwrite each other:
//! the second gets a `_copy1` suffix, the third `_copy2`, and so on. The
//! check-then-use is race-free because the batch runs on a single worker
//! thread and nothing else writes to the output directory during a run.

use std::path::{Path, PathBuf};

/// Characters that are invalid or troublesome in output file names on the
/// platforms the output folders get shared to.
const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// First available path for `base.ext` in `dir`.
///
/// Tries `base.ext`, then `base_copy1.ext`, `base_copy2.ext`, … and returns
/// the first path that does not yet exist. Does not create the file.
pub fn reserve(dir: &Path, base: &str, ext: &str) -> PathBuf {
    let base = sanitize(base);
    let candidate = dir.join(format!("{base}.{ext}"));
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{base}_copy{n}.{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Replace filesystem-hostile characters so an OCR'd identifier can always
/// become a file name.
fn sanitize(base: &str) -> String {
    base.chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect()
}
