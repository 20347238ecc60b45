//! Box and score helpers shared by the decoders.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};

use crate::error::{ModelError, Result};
use crate::results::Mask;

/// Greedy non-maximum suppression.
///
/// Returns indices of kept boxes, highest score first. With
/// `include_boundaries` box sizes are computed inclusively (`x2 - x1 + 1`).
pub fn nms(
    boxes: &[[f32; 4]],
    scores: &[f32],
    threshold: f32,
    include_boundaries: bool,
    keep_top_k: Option<usize>,
) -> Vec<usize> {
    let b = if include_boundaries { 1.0 } else { 0.0 };
    let area = |bbox: &[f32; 4]| (bbox[2] - bbox[0] + b) * (bbox[3] - bbox[1] + b);

    let mut order: Vec<usize> = (0..boxes.len().min(scores.len())).collect();
    // Stable sort keeps equal scores in output order.
    order.sort_by(|&i, &j| {
        scores[j]
            .partial_cmp(&scores[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if let Some(k) = keep_top_k {
        order.truncate(k);
    }

    let mut keep = Vec::new();
    while let Some((&i, rest)) = order.split_first() {
        keep.push(i);
        let current = &boxes[i];

        order = rest
            .iter()
            .copied()
            .filter(|&j| {
                let other = &boxes[j];
                let w = (current[2].min(other[2]) - current[0].max(other[0]) + b).max(0.0);
                let h = (current[3].min(other[3]) - current[1].max(other[1]) + b).max(0.0);
                let intersection = w * h;
                let union = area(current) + area(other) - intersection;
                let overlap = if union != 0.0 { intersection / union } else { 0.0 };
                overlap <= threshold
            })
            .collect();
    }

    keep
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|v| v / sum).collect()
}

/// Indices of the `k` largest scores, largest first. Ties keep index order.
pub fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&i, &j| {
        scores[j]
            .partial_cmp(&scores[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(k);
    order
}

/// Class id from a label tensor value.
pub fn class_id(value: f32) -> Result<usize> {
    if value.is_finite() && value >= 0.0 {
        Ok(value as usize)
    } else {
        Err(ModelError::Postprocess(format!("invalid class id {}", value)))
    }
}

/// Round box corners to whole pixels and clamp them to the image.
pub fn clip_box(bbox: [f32; 4], width: u32, height: u32) -> [f32; 4] {
    let (w, h) = (width as f32, height as f32);
    [
        bbox[0].round().clamp(0.0, w),
        bbox[1].round().clamp(0.0, h),
        bbox[2].round().clamp(0.0, w),
        bbox[3].round().clamp(0.0, h),
    ]
}

/// Resize a soft mask to `width` x `height` and binarise it at `threshold`.
pub fn resize_mask(
    probabilities: Vec<f32>,
    (src_w, src_h): (u32, u32),
    (width, height): (u32, u32),
    threshold: f32,
) -> Option<Mask> {
    let soft: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_raw(src_w, src_h, probabilities)?;
    let (width, height) = (width.max(1), height.max(1));
    let resized = imageops::resize(&soft, width, height, FilterType::Triangle);

    Some(Mask {
        width,
        height,
        data: resized
            .pixels()
            .map(|p| u8::from(p[0] > threshold))
            .collect(),
    })
}
