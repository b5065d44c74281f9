//! Image-to-tensor preparation for the detection and recognition models.

use image::{imageops::FilterType, DynamicImage, ImageBuffer, Rgb, RgbImage};
use ndarray::{Array3, Array4, Axis};

/// Longest side fed to the detection model.
pub const DET_LIMIT_SIDE: u32 = 960;
/// Shortest side fed to the detection model.
pub const DET_LIMIT_MIN: u32 = 32;

/// Recognition model input geometry.
pub const REC_HEIGHT: u32 = 48;
pub const REC_WIDTH: u32 = 320;

// PaddleOCR normalization: (x/255 - 0.5) / 0.5, channels in BGR order.
const MEAN: [f32; 3] = [0.5, 0.5, 0.5];
const STD: [f32; 3] = [0.5, 0.5, 0.5];

/// Resize for detection (dimensions snapped to multiples of 32) and
/// normalize into an NCHW batch of one. Returns the tensor plus the input
/// dimensions actually used, needed to map boxes back to page coordinates.
pub fn prepare_det_input(img: &DynamicImage) -> (Array4<f32>, u32, u32) {
    let rgb = img.to_rgb8();
    let (orig_w, orig_h) = (rgb.width(), rgb.height());

    let max_side = orig_w.max(orig_h) as f32;
    let min_side = orig_w.min(orig_h) as f32;
    let mut ratio = 1.0f32;
    if max_side > DET_LIMIT_SIDE as f32 {
        ratio = DET_LIMIT_SIDE as f32 / max_side;
    }
    if min_side * ratio < DET_LIMIT_MIN as f32 {
        ratio = DET_LIMIT_MIN as f32 / min_side;
    }

    let new_w = ((orig_w as f32 * ratio) as u32 / 32 * 32).max(DET_LIMIT_MIN);
    let new_h = ((orig_h as f32 * ratio) as u32 / 32 * 32).max(DET_LIMIT_MIN);
    let resized = image::imageops::resize(&rgb, new_w, new_h, FilterType::Lanczos3);

    let batch = normalize(&resized).insert_axis(Axis(0));
    (batch, new_w, new_h)
}

/// Scale one cropped text region to the recognition model's fixed input
/// size, padding the right edge with gray.
pub fn prepare_rec_input(region: &DynamicImage) -> Array4<f32> {
    let rgb = region.to_rgb8();
    let (w, h) = (rgb.width().max(1), rgb.height().max(1));

    let ratio = REC_HEIGHT as f32 / h as f32;
    let new_w = ((w as f32 * ratio) as u32).clamp(1, REC_WIDTH);
    let resized = image::imageops::resize(&rgb, new_w, REC_HEIGHT, FilterType::Lanczos3);

    let mut padded: RgbImage = ImageBuffer::from_pixel(REC_WIDTH, REC_HEIGHT, Rgb([127, 127, 127]));
    image::imageops::overlay(&mut padded, &resized, 0, 0);

    normalize(&padded).insert_axis(Axis(0))
}

/// RGB image → normalized CHW tensor, BGR channel order as the PaddleOCR
/// models expect.
fn normalize(img: &RgbImage) -> Array3<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut tensor = Array3::<f32>::zeros((3, h, w));
    for y in 0..h {
        for x in 0..w {
            let pixel = img.get_pixel(x as u32, y as u32);
            tensor[[0, y, x]] = (pixel[2] as f32 / 255.0 - MEAN[0]) / STD[0];
            tensor[[1, y, x]] = (pixel[1] as f32 / 255.0 - MEAN[1]) / STD[1];
            tensor[[2, y, x]] = (pixel[0] as f32 / 255.0 - MEAN[2]) / STD[2];
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])))
    }

    #[test]
    fn det_input_dims_are_multiples_of_32() {
        let (tensor, w, h) = prepare_det_input(&page(1700, 2200));
        assert_eq!(w % 32, 0);
        assert_eq!(h % 32, 0);
        assert!(w <= DET_LIMIT_SIDE && h <= DET_LIMIT_SIDE);
        assert_eq!(tensor.shape(), &[1, 3, h as usize, w as usize]);
    }

    #[test]
    fn det_input_small_image_is_padded_up() {
        let (_, w, h) = prepare_det_input(&page(20, 20));
        assert!(w >= DET_LIMIT_MIN && h >= DET_LIMIT_MIN);
    }

    #[test]
    fn rec_input_has_fixed_geometry() {
        let tensor = prepare_rec_input(&page(500, 40));
        assert_eq!(
            tensor.shape(),
            &[1, 3, REC_HEIGHT as usize, REC_WIDTH as usize]
        );
    }

    #[test]
    fn white_pixel_normalizes_to_one() {
        let tensor = prepare_rec_input(&page(REC_WIDTH, REC_HEIGHT));
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
    }
}
