//! Text detection: DBNet-style probability map → axis-aligned text regions.

use ndarray::{Array2, Array4, ArrayViewD};
use ort::session::Session;
use ort::value::Tensor;

use super::{classify_inference_error, OcrError};

const THRESH: f32 = 0.3;
const BOX_THRESH: f32 = 0.5;
const MIN_SIZE: f32 = 3.0;
/// Detected regions hug the text core; expand them a little so ascenders and
/// descenders survive the crop.
const UNCLIP_RATIO: f32 = 1.6;

/// One detected text region in original page coordinates.
#[derive(Debug, Clone, Copy)]
pub struct TextRegion {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub score: f32,
}

pub struct TextDetector {
    session: Session,
}

impl TextDetector {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Run detection on a prepared input tensor. `orig_w`/`orig_h` are the
    /// page dimensions the regions get scaled back to.
    pub fn detect(
        &mut self,
        input: Array4<f32>,
        orig_w: u32,
        orig_h: u32,
    ) -> Result<Vec<TextRegion>, OcrError> {
        let input_h = input.shape()[2] as u32;
        let input_w = input.shape()[3] as u32;

        let input_tensor =
            Tensor::from_array(input).map_err(|e| OcrError::Process(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| classify_inference_error("detection", &e.to_string()))?;

        let view = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| OcrError::Process(e.to_string()))?;
        let prob_map = view.to_owned();
        drop(outputs);

        Ok(find_regions(&prob_map.view(), input_w, input_h, orig_w, orig_h))
    }
}

/// Threshold the probability map and flood-fill connected components into
/// axis-aligned regions, sorted top to bottom.
fn find_regions(
    prob_map: &ArrayViewD<f32>,
    input_w: u32,
    input_h: u32,
    orig_w: u32,
    orig_h: u32,
) -> Vec<TextRegion> {
    let shape = prob_map.shape();
    let (h, w) = match shape.len() {
        4 => (shape[2], shape[3]),
        3 => (shape[1], shape[2]),
        _ => return Vec::new(),
    };
    let prob = |y: usize, x: usize| -> f32 {
        if shape.len() == 4 {
            prob_map[[0, 0, y, x]]
        } else {
            prob_map[[0, y, x]]
        }
    };

    let mut visited = Array2::<bool>::from_elem((h, w), false);
    let mut regions = Vec::new();

    for start_y in 0..h {
        for start_x in 0..w {
            if prob(start_y, start_x) <= THRESH || visited[[start_y, start_x]] {
                continue;
            }

            let mut min_x = start_x;
            let mut max_x = start_x;
            let mut min_y = start_y;
            let mut max_y = start_y;
            let mut score_sum = 0.0f32;
            let mut count = 0u32;
            let mut queue = vec![(start_x, start_y)];
            visited[[start_y, start_x]] = true;

            while let Some((x, y)) = queue.pop() {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
                score_sum += prob(y, x);
                count += 1;

                for (dx, dy) in [(0i32, -1i32), (0, 1), (-1, 0), (1, 0)] {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx >= 0 && nx < w as i32 && ny >= 0 && ny < h as i32 {
                        let (nx, ny) = (nx as usize, ny as usize);
                        if prob(ny, nx) > THRESH && !visited[[ny, nx]] {
                            visited[[ny, nx]] = true;
                            queue.push((nx, ny));
                        }
                    }
                }
            }

            let box_w = (max_x - min_x) as f32;
            let box_h = (max_y - min_y) as f32;
            if box_w < MIN_SIZE || box_h < MIN_SIZE {
                continue;
            }
            let avg_score = score_sum / count as f32;
            if avg_score < BOX_THRESH {
                continue;
            }

            let expand_w = box_w * (UNCLIP_RATIO - 1.0) / 2.0;
            let expand_h = box_h * (UNCLIP_RATIO - 1.0) / 2.0;
            let x0 = (min_x as f32 - expand_w).max(0.0);
            let y0 = (min_y as f32 - expand_h).max(0.0);
            let x1 = (max_x as f32 + expand_w).min(w as f32 - 1.0);
            let y1 = (max_y as f32 + expand_h).min(h as f32 - 1.0);

            let scale_x = orig_w as f32 / input_w as f32;
            let scale_y = orig_h as f32 / input_h as f32;

            regions.push(TextRegion {
                x: (x0 * scale_x) as u32,
                y: (y0 * scale_y) as u32,
                w: (((x1 - x0) * scale_x) as u32).max(1),
                h: (((y1 - y0) * scale_y) as u32).max(1),
                score: avg_score,
            });
        }
    }

    regions.sort_by(|a, b| a.y.cmp(&b.y).then(a.x.cmp(&b.x)));
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4 as A4;

    fn map_with_blob(h: usize, w: usize, y0: usize, y1: usize, x0: usize, x1: usize) -> A4<f32> {
        let mut map = A4::<f32>::zeros((1, 1, h, w));
        for y in y0..y1 {
            for x in x0..x1 {
                map[[0, 0, y, x]] = 0.9;
            }
        }
        map
    }

    #[test]
    fn blob_becomes_one_region() {
        let map = map_with_blob(64, 64, 10, 20, 5, 40);
        let view = map.view().into_dyn();
        let regions = find_regions(&view, 64, 64, 640, 640);
        assert_eq!(regions.len(), 1);
        let r = regions[0];
        // Scaled x10, with the unclip expansion around it.
        assert!(r.x < 50 && r.x + r.w > 390, "region {r:?} misses the blob");
        assert!(r.y < 100 && r.y + r.h > 190, "region {r:?} misses the blob");
    }

    #[test]
    fn tiny_blobs_are_discarded() {
        let map = map_with_blob(64, 64, 10, 12, 5, 7);
        let view = map.view().into_dyn();
        assert!(find_regions(&view, 64, 64, 640, 640).is_empty());
    }

    #[test]
    fn regions_come_out_top_to_bottom() {
        let mut map = map_with_blob(64, 64, 40, 50, 5, 40);
        for y in 5..15 {
            for x in 5..40 {
                map[[0, 0, y, x]] = 0.9;
            }
        }
        let view = map.view().into_dyn();
        let regions = find_regions(&view, 64, 64, 64, 64);
        assert_eq!(regions.len(), 2);
        assert!(regions[0].y < regions[1].y);
    }

    #[test]
    fn empty_map_yields_no_regions() {
        let map = A4::<f32>::zeros((1, 1, 32, 32));
        let view = map.view().into_dyn();
        assert!(find_regions(&view, 32, 32, 320, 320).is_empty());
    }
}
