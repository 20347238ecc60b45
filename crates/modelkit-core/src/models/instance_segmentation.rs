//! Mask R-CNN-style instance segmentation.

use image::DynamicImage;
use tracing::debug;

use modelkit_inference::OutputTensor;

use super::{family_model, find_output, ImageMeta, ModelBase, ModelFamily};
use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::results::{DetectedObject, InstanceSegmentationResult, SegmentedObject};
use crate::utils::{class_id, clip_box, resize_mask};

const MASK_THRESHOLD: f32 = 0.5;

/// Instance segmentation with `boxes` `[N, 5]`, `labels` `[N]` and
/// per-detection soft `masks` `[N, H, W]`.
#[derive(Debug)]
pub struct MaskRcnnModel {
    pub(super) base: ModelBase,
}

family_model!(MaskRcnnModel, ModelFamily::InstanceSegmentation);

impl MaskRcnnModel {
    /// Segment objects in one image.
    pub fn infer(&self, image: &DynamicImage) -> Result<InstanceSegmentationResult> {
        let (outputs, meta) = self.base.run(image)?;
        let objects = decode(&outputs, &meta, &self.base.config)?;
        debug!("Segmented {} objects", objects.len());

        Ok(InstanceSegmentationResult {
            objects,
            image_size: meta.original,
        })
    }
}

fn required<'a>(outputs: &'a [(String, OutputTensor)], key: &str) -> Result<&'a OutputTensor> {
    find_output(outputs, key).ok_or_else(|| ModelError::Postprocess(format!("missing '{}' output", key)))
}

pub(crate) fn decode(
    outputs: &[(String, OutputTensor)],
    meta: &ImageMeta,
    config: &ModelConfig,
) -> Result<Vec<SegmentedObject>> {
    let boxes = required(outputs, "boxes")?;
    let labels = required(outputs, "labels")?;
    let masks = required(outputs, "masks")?;

    let mask_shape = masks.shape();
    if boxes.shape().last() != Some(&5) || mask_shape.len() < 3 {
        return Err(ModelError::Postprocess(format!(
            "unexpected output shapes: boxes {:?}, masks {:?}",
            boxes.shape(),
            mask_shape
        )));
    }
    let (mask_h, mask_w) = (mask_shape[mask_shape.len() - 2], mask_shape[mask_shape.len() - 1]);
    let mask_len = mask_h * mask_w;

    let boxes: Vec<f32> = boxes.to_f32().iter().cloned().collect();
    let labels: Vec<f32> = labels.to_f32().iter().cloned().collect();
    let masks: Vec<f32> = masks.to_f32().iter().cloned().collect();

    let count = boxes.len() / 5;
    if labels.len() < count || masks.len() < count * mask_len {
        return Err(ModelError::Postprocess(format!(
            "{} boxes but {} labels and {} masks",
            count,
            labels.len(),
            masks.len() / mask_len.max(1)
        )));
    }

    let (width, height) = meta.original;
    let mut objects = Vec::new();

    for (i, row) in boxes.chunks_exact(5).enumerate() {
        let score = row[4];
        if score <= config.confidence_threshold {
            continue;
        }

        let bbox = clip_box(meta.box_to_source([row[0], row[1], row[2], row[3]]), width, height);
        let label_id = class_id(labels[i])?;
        let object = DetectedObject::from_corners(bbox, label_id, config.label(label_id), score);

        let soft = masks[i * mask_len..(i + 1) * mask_len].to_vec();
        let mask = resize_mask(
            soft,
            (mask_w as u32, mask_h as u32),
            (object.width as u32, object.height as u32),
            MASK_THRESHOLD,
        )
        .ok_or_else(|| ModelError::Postprocess(format!("mask {} has the wrong size", i)))?;

        objects.push(SegmentedObject { object, mask });
    }

    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};
    use pretty_assertions::assert_eq;

    fn tensor(shape: &[usize], data: Vec<f32>) -> OutputTensor {
        OutputTensor::Float32(ArrayD::from_shape_vec(IxDyn(shape), data).unwrap())
    }

    fn meta() -> ImageMeta {
        ImageMeta {
            original: (100, 100),
            input: (50, 50),
            scale_x: 0.5,
            scale_y: 0.5,
            pad_x: 0.0,
            pad_y: 0.0,
        }
    }

    #[test]
    fn test_decode_masks() {
        let outputs = vec![
            (
                "boxes".to_string(),
                tensor(&[2, 5], vec![
                    5.0, 5.0, 25.0, 15.0, 0.9, //
                    0.0, 0.0, 10.0, 10.0, 0.1,
                ]),
            ),
            ("labels".to_string(), tensor(&[2], vec![3.0, 4.0])),
            ("masks".to_string(), tensor(&[2, 2, 2], vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])),
        ];

        let objects = decode(&outputs, &meta(), &ModelConfig::default()).unwrap();

        assert_eq!(objects.len(), 1);
        let object = &objects[0];
        assert_eq!(object.object.corners(), [10.0, 10.0, 50.0, 30.0]);
        assert_eq!(object.object.label_id, 3);
        assert_eq!((object.mask.width, object.mask.height), (40, 20));
        // Top half of the box is foreground.
        assert_eq!(object.mask.data[0], 1);
        assert_eq!(object.mask.data[object.mask.data.len() - 1], 0);
    }

    #[test]
    fn test_decode_rejects_negative_labels() {
        let outputs = vec![
            ("boxes".to_string(), tensor(&[1, 5], vec![5.0, 5.0, 25.0, 15.0, 0.9])),
            ("labels".to_string(), tensor(&[1], vec![-2.0])),
            ("masks".to_string(), tensor(&[1, 2, 2], vec![1.0; 4])),
        ];

        let err = decode(&outputs, &meta(), &ModelConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::Postprocess(_)));
    }

    #[test]
    fn test_decode_requires_masks() {
        let outputs = vec![
            ("boxes".to_string(), tensor(&[1, 5], vec![0.0, 0.0, 1.0, 1.0, 0.9])),
            ("labels".to_string(), tensor(&[1], vec![1.0])),
        ];
        let err = decode(&outputs, &meta(), &ModelConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::Postprocess(_)));
    }

    #[test]
    fn test_decode_rejects_short_masks() {
        let outputs = vec![
            ("boxes".to_string(), tensor(&[2, 5], vec![0.0; 10])),
            ("labels".to_string(), tensor(&[2], vec![1.0, 1.0])),
            ("masks".to_string(), tensor(&[1, 2, 2], vec![0.0; 4])),
        ];
        let err = decode(&outputs, &meta(), &ModelConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::Postprocess(_)));
    }
}
