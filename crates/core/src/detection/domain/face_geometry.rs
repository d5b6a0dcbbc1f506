use image::imageops::{self, FilterType};

use crate::shared::constants::ROI_PADDING;
use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;
use crate::shared::tensor::FaceTensor;

/// Crops `region` plus [`ROI_PADDING`] pixels of context on every side.
///
/// The padded rectangle is clamped so it never leaves the frame.
pub fn extract_roi(frame: &Frame, region: &FaceRegion) -> Frame {
    let (fw, fh) = frame.bounds();
    let x = (region.x - ROI_PADDING).max(0);
    let y = (region.y - ROI_PADDING).max(0);
    let w = (region.width + 2 * ROI_PADDING).min(fw - x);
    let h = (region.height + 2 * ROI_PADDING).min(fh - y);
    frame.crop(x, y, w, h)
}

/// Resizes an ROI to the classifier input size and scales it to `[0, 1]`.
///
/// Returns a single-item NHWC batch, or `None` when the ROI is empty or
/// not RGB.
pub fn preprocess(roi: &Frame, input_size: (u32, u32)) -> Option<FaceTensor> {
    if roi.is_empty() || input_size.0 == 0 || input_size.1 == 0 {
        return None;
    }
    let image = roi.to_rgb_image()?;
    let (w, h) = input_size;
    let resized = if image.dimensions() == (w, h) {
        image
    } else {
        imageops::resize(&image, w, h, FilterType::Triangle)
    };

    let mut tensor = FaceTensor::zeros((1, h as usize, w as usize, 3));
    for (x, y, px) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = px[c] as f32 / 255.0;
        }
    }
    Some(tensor)
}
