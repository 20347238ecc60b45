//! SSD-style object detection.

use std::collections::HashSet;

use image::DynamicImage;
use tracing::debug;

use modelkit_inference::OutputTensor;

use super::{family_model, find_output, ImageMeta, ModelBase, ModelFamily};
use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::results::{DetectedObject, DetectionResult};
use crate::utils::{class_id, clip_box, nms};

/// Detector producing axis-aligned boxes.
///
/// Two output layouts are understood:
/// - a single `[1, 1, N, 7]` tensor of
///   `[image_id, label, score, xmin, ymin, xmax, ymax]` rows with
///   coordinates normalised to the input, terminated by `image_id < 0`
/// - `boxes` `[N, 5]` (`xmin, ymin, xmax, ymax, score` in input pixels) plus
///   `labels` `[N]`
#[derive(Debug)]
pub struct DetectionModel {
    pub(super) base: ModelBase,
}

family_model!(DetectionModel, ModelFamily::Detection);

impl DetectionModel {
    /// Detect objects in one image.
    pub fn infer(&self, image: &DynamicImage) -> Result<DetectionResult> {
        let (outputs, meta) = self.base.run(image)?;
        let objects = decode(&outputs, &meta, &self.base.config)?;
        debug!("Detected {} objects", objects.len());

        Ok(DetectionResult {
            objects,
            image_size: meta.original,
        })
    }
}

/// A raw candidate: source-pixel box, label id and score.
type Candidate = ([f32; 4], usize, f32);

pub(crate) fn decode(
    outputs: &[(String, OutputTensor)],
    meta: &ImageMeta,
    config: &ModelConfig,
) -> Result<Vec<DetectedObject>> {
    let candidates = match (find_output(outputs, "boxes"), find_output(outputs, "labels")) {
        (Some(boxes), Some(labels)) => decode_boxes_labels(boxes, labels, meta, config)?,
        _ => {
            let output = outputs
                .first()
                .map(|(_, t)| t)
                .ok_or_else(|| ModelError::Postprocess("model produced no outputs".to_string()))?;
            decode_detection_out(output, meta, config)?
        }
    };

    let (width, height) = meta.original;
    let mut candidates: Vec<Candidate> = candidates
        .into_iter()
        .map(|(bbox, label, score)| (clip_box(bbox, width, height), label, score))
        .collect();

    if config.apply_nms {
        candidates = suppress_per_class(candidates, config.iou_threshold);
    }

    Ok(candidates
        .into_iter()
        .map(|(bbox, label, score)| DetectedObject::from_corners(bbox, label, config.label(label), score))
        .collect())
}

fn decode_boxes_labels(
    boxes: &OutputTensor,
    labels: &OutputTensor,
    meta: &ImageMeta,
    config: &ModelConfig,
) -> Result<Vec<Candidate>> {
    if boxes.shape().last() != Some(&5) {
        return Err(ModelError::Postprocess(format!(
            "expected boxes with 5 values per row, got shape {:?}",
            boxes.shape()
        )));
    }

    let boxes: Vec<f32> = boxes.to_f32().iter().cloned().collect();
    let labels: Vec<f32> = labels.to_f32().iter().cloned().collect();
    let count = boxes.len() / 5;
    if labels.len() < count {
        return Err(ModelError::Postprocess(format!(
            "{} boxes but only {} labels",
            count,
            labels.len()
        )));
    }

    boxes
        .chunks_exact(5)
        .zip(labels)
        .filter(|(row, _)| row[4] > config.confidence_threshold)
        .map(|(row, label)| {
            let bbox = meta.box_to_source([row[0], row[1], row[2], row[3]]);
            Ok((bbox, class_id(label)?, row[4]))
        })
        .collect()
}

fn decode_detection_out(output: &OutputTensor, meta: &ImageMeta, config: &ModelConfig) -> Result<Vec<Candidate>> {
    if output.shape().last() != Some(&7) {
        return Err(ModelError::Postprocess(format!(
            "expected detections with 7 values per row, got shape {:?}",
            output.shape()
        )));
    }

    let data: Vec<f32> = output.to_f32().iter().cloned().collect();
    let mut candidates = Vec::new();

    for row in data.chunks_exact(7) {
        if row[0] < 0.0 {
            break;
        }
        let score = row[2];
        if score <= config.confidence_threshold {
            continue;
        }
        let bbox = meta.normalized_box_to_source([row[3], row[4], row[5], row[6]]);
        candidates.push((bbox, class_id(row[1])?, score));
    }

    Ok(candidates)
}

/// Per-class NMS that keeps survivors in their original order.
fn suppress_per_class(candidates: Vec<Candidate>, threshold: f32) -> Vec<Candidate> {
    let classes: HashSet<usize> = candidates.iter().map(|c| c.1).collect();
    let mut keep = HashSet::new();

    for class in classes {
        let members: Vec<usize> = (0..candidates.len())
            .filter(|&i| candidates[i].1 == class)
            .collect();
        let boxes: Vec<[f32; 4]> = members.iter().map(|&i| candidates[i].0).collect();
        let scores: Vec<f32> = members.iter().map(|&i| candidates[i].2).collect();

        keep.extend(nms(&boxes, &scores, threshold, false, None).into_iter().map(|k| members[k]));
    }

    candidates
        .into_iter()
        .enumerate()
        .filter(|(i, _)| keep.contains(i))
        .map(|(_, c)| c)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::{adapter, Scripted};
    use ndarray::{ArrayD, IxDyn};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tensor(shape: &[usize], data: Vec<f32>) -> OutputTensor {
        OutputTensor::Float32(ArrayD::from_shape_vec(IxDyn(shape), data).unwrap())
    }

    fn meta() -> ImageMeta {
        ImageMeta {
            original: (640, 480),
            input: (300, 300),
            scale_x: 300.0 / 640.0,
            scale_y: 300.0 / 480.0,
            pad_x: 0.0,
            pad_y: 0.0,
        }
    }

    #[test]
    fn test_decode_detection_out() {
        let output = tensor(
            &[1, 1, 4, 7],
            vec![
                0.0, 1.0, 0.9, 0.1, 0.1, 0.5, 0.5, //
                0.0, 3.0, 0.3, 0.2, 0.2, 0.4, 0.4, //
                0.0, 2.0, 0.8, -0.1, 0.5, 1.2, 1.0, //
                -1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            ],
        );
        let config = ModelConfig {
            labels: vec!["bg".to_string(), "person".to_string(), "car".to_string()],
            ..ModelConfig::default()
        };

        let objects = decode(&[("detection_out".to_string(), output)], &meta(), &config).unwrap();

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].label, "person");
        assert_eq!(objects[0].corners(), [64.0, 48.0, 320.0, 240.0]);
        // Out-of-image coordinates are clipped.
        assert_eq!(objects[1].label, "car");
        assert_eq!(objects[1].corners(), [0.0, 240.0, 640.0, 480.0]);
    }

    #[test]
    fn test_decode_boxes_labels() {
        let outputs = vec![
            (
                "boxes".to_string(),
                tensor(&[3, 5], vec![
                    30.0, 30.0, 150.0, 150.0, 0.95, //
                    0.0, 0.0, 10.0, 10.0, 0.2, //
                    150.0, 150.0, 300.0, 300.0, 0.6,
                ]),
            ),
            (
                "labels".to_string(),
                OutputTensor::Int64(ArrayD::from_shape_vec(IxDyn(&[3]), vec![5, 1, 7]).unwrap()),
            ),
        ];

        let objects = decode(&outputs, &meta(), &ModelConfig::default()).unwrap();

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].label_id, 5);
        assert_eq!(objects[0].corners(), [64.0, 48.0, 320.0, 240.0]);
        assert_eq!(objects[0].width, 256.0);
        assert_eq!(objects[1].label_id, 7);
        assert_eq!(objects[1].score, 0.6);
    }

    #[test]
    fn test_decode_rejects_bad_layout() {
        let err = decode(
            &[("out".to_string(), tensor(&[1, 4], vec![0.0; 4]))],
            &meta(),
            &ModelConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::Postprocess(_)));

        let err = decode(&[], &meta(), &ModelConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::Postprocess(_)));
    }

    #[test]
    fn test_decode_rejects_negative_labels() {
        let output = tensor(&[1, 1, 1, 7], vec![0.0, -3.0, 0.9, 0.1, 0.1, 0.5, 0.5]);
        let err = decode(&[("detection_out".to_string(), output)], &meta(), &ModelConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::Postprocess(_)));

        let outputs = vec![
            ("boxes".to_string(), tensor(&[1, 5], vec![10.0, 10.0, 50.0, 50.0, 0.9])),
            ("labels".to_string(), tensor(&[1], vec![-1.0])),
        ];
        let err = decode(&outputs, &meta(), &ModelConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::Postprocess(_)));
    }

    #[test]
    fn test_per_class_nms_keeps_order() {
        let candidates = vec![
            ([0.0, 0.0, 10.0, 10.0], 1, 0.6),
            ([50.0, 50.0, 60.0, 60.0], 2, 0.7),
            ([1.0, 1.0, 10.0, 10.0], 1, 0.9),
            ([1.0, 1.0, 10.0, 10.0], 2, 0.5),
        ];

        let kept = suppress_per_class(candidates, 0.5);
        assert_eq!(kept.iter().map(|c| c.2).collect::<Vec<_>>(), vec![0.7, 0.9, 0.5]);
    }

    #[test]
    fn test_infer_through_adapter() {
        let backend = Scripted::new(vec![(
            "DetectionOutput",
            tensor(&[1, 1, 1, 7], vec![0.0, 1.0, 0.99, 0.25, 0.25, 0.75, 0.75]),
        )]);
        let model = DetectionModel::from_adapter(adapter(backend, json!({ "model_type": "SSD" }), (300, 300))).unwrap();

        let result = model.infer(&DynamicImage::new_rgb8(400, 200)).unwrap();
        assert_eq!(result.image_size, (400, 200));
        assert_eq!(result.objects.len(), 1);
        assert_eq!(result.objects[0].corners(), [100.0, 50.0, 300.0, 150.0]);
    }
}
