//! Typed inference results.

use std::fmt;

use serde::Serialize;

use crate::models::ModelFamily;

/// An axis-aligned detection in source-image pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedObject {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub label_id: usize,
    pub label: String,
    pub score: f32,
}

impl DetectedObject {
    /// Build from corner coordinates.
    pub fn from_corners(bbox: [f32; 4], label_id: usize, label: String, score: f32) -> Self {
        Self {
            x: bbox[0],
            y: bbox[1],
            width: bbox[2] - bbox[0],
            height: bbox[3] - bbox[1],
            label_id,
            label,
            score,
        }
    }

    /// Corner coordinates `[xmin, ymin, xmax, ymax]`.
    pub fn corners(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }
}

impl fmt::Display for DetectedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [xmin, ymin, xmax, ymax] = self.corners();
        write!(
            f,
            "({}, {}, {}, {}, {:.3}, {}, {})",
            xmin, ymin, xmax, ymax, self.score, self.label_id, self.label
        )
    }
}

/// Detections for one image, in the model's output order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub objects: Vec<DetectedObject>,
    /// Source image size (width, height).
    pub image_size: (u32, u32),
}

/// One class score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub id: usize,
    pub label: String,
    pub score: f32,
}

/// Top-k classes, highest score first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub top_labels: Vec<Classification>,
}

/// Binary mask covering a detection's box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    /// Row-major, one byte per pixel, 0 or 1.
    pub data: Vec<u8>,
}

impl Mask {
    /// Number of foreground pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}

/// A detection with its mask.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentedObject {
    pub object: DetectedObject,
    pub mask: Mask,
}

impl fmt::Display for SegmentedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [xmin, ymin, xmax, ymax] = self.object.corners();
        write!(
            f,
            "({}, {}, {}, {}, {:.3}, {}, {}, {})",
            xmin,
            ymin,
            xmax,
            ymax,
            self.object.score,
            self.object.label_id,
            self.object.label,
            self.mask.count()
        )
    }
}

/// Segmented objects for one image, in the model's output order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSegmentationResult {
    pub objects: Vec<SegmentedObject>,
    /// Source image size (width, height).
    pub image_size: (u32, u32),
}

/// Output of one `infer` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum InferenceResult {
    Classification(ClassificationResult),
    Detection(DetectionResult),
    InstanceSegmentation(InstanceSegmentationResult),
}

impl InferenceResult {
    pub fn family(&self) -> ModelFamily {
        match self {
            InferenceResult::Classification(_) => ModelFamily::Classification,
            InferenceResult::Detection(_) => ModelFamily::Detection,
            InferenceResult::InstanceSegmentation(_) => ModelFamily::InstanceSegmentation,
        }
    }

    /// Number of records (classes, detections or segmented objects).
    pub fn len(&self) -> usize {
        match self {
            InferenceResult::Classification(r) => r.top_labels.len(),
            InferenceResult::Detection(r) => r.objects.len(),
            InferenceResult::InstanceSegmentation(r) => r.objects.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for InferenceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceResult::Classification(r) => {
                for c in &r.top_labels {
                    writeln!(f, "{} ({}): {:.3}", c.label, c.id, c.score)?;
                }
            }
            InferenceResult::Detection(r) => {
                for object in &r.objects {
                    writeln!(f, "{}", object)?;
                }
            }
            InferenceResult::InstanceSegmentation(r) => {
                for object in &r.objects {
                    writeln!(f, "{}", object)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detected_object_geometry() {
        let object = DetectedObject::from_corners([10.0, 20.0, 110.0, 70.0], 1, "person".to_string(), 0.875);
        assert_eq!(object.width, 100.0);
        assert_eq!(object.height, 50.0);
        assert_eq!(object.corners(), [10.0, 20.0, 110.0, 70.0]);
        assert_eq!(object.to_string(), "(10, 20, 110, 70, 0.875, 1, person)");
    }

    #[test]
    fn test_mask_count() {
        let mask = Mask {
            width: 2,
            height: 2,
            data: vec![0, 1, 1, 1],
        };
        assert_eq!(mask.count(), 3);
    }

    #[test]
    fn test_result_len() {
        let result = InferenceResult::Detection(DetectionResult {
            objects: Vec::new(),
            image_size: (640, 480),
        });
        assert!(result.is_empty());
        assert_eq!(result.family(), ModelFamily::Detection);
    }
}
