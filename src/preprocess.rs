//! Image preprocessing between rasterization and OCR.
//!
//! The two backends want opposite things from the page image. The structured
//! backend (tesseract) benefits from contrast stretching and sharpening; the
//! resilient backend runs neural detection on the GPU and needs the input
//! bounded in size far more than it needs it cleaned up.

use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};

/// Center-weighted 3x3 sharpen kernel, roughly a sharpness factor of 2.
const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

/// Preprocess for the structured (tesseract) backend:
/// grayscale, autocontrast, sharpen.
pub fn for_structured(image: &DynamicImage) -> DynamicImage {
    let gray = autocontrast(&image.to_luma8());
    DynamicImage::ImageLuma8(gray).filter3x3(&SHARPEN_KERNEL)
}

/// Preprocess for the resilient (ONNX) backend: halve both dimensions with
/// Lanczos3. 350 DPI pages are far larger than the detector needs and the
/// downscale keeps accelerator memory bounded.
pub fn for_resilient(image: &DynamicImage) -> DynamicImage {
    let w = (image.width() / 2).max(1);
    let h = (image.height() / 2).max(1);
    image.resize_exact(w, h, FilterType::Lanczos3)
}

/// Stretch the intensity histogram so the darkest pixel maps to 0 and the
/// lightest to 255. No cutoff percentile; scanned pages already have near-full
/// range and a cutoff can eat faint strokes.
fn autocontrast(gray: &GrayImage) -> GrayImage {
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for Luma([v]) in gray.pixels() {
        min = min.min(*v);
        max = max.max(*v);
    }
    if min >= max {
        return gray.clone();
    }
    let range = (max - min) as f32;
    let mut out = gray.clone();
    for Luma([v]) in out.pixels_mut() {
        *v = (((*v - min) as f32 / range) * 255.0).round() as u8;
    }
    out
}
