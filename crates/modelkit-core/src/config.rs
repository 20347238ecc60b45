//! Model configuration read from a model's `model_info`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ModelError, Result};
use crate::models::ModelFamily;

/// How an image is resized to the model input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeType {
    /// Stretch to the input size, ignoring aspect ratio.
    #[default]
    Standard,
    /// Centre-crop to the input aspect ratio, then resize.
    Crop,
    /// Keep aspect ratio; the image sits top-left, zero padding right and below.
    FitToWindow,
    /// Keep aspect ratio and pad the remainder with zeros, centred.
    FitToWindowLetterbox,
}

/// Per-model settings, all optional in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Declared family. When absent the family is guessed from outputs.
    pub model_type: Option<ModelFamily>,

    /// Class labels indexed by label id.
    pub labels: Vec<String>,

    /// Minimum score for a detection to be reported (exclusive).
    pub confidence_threshold: f32,

    /// Overlap above which NMS suppresses a box.
    pub iou_threshold: f32,

    /// Run per-class NMS on detections.
    pub apply_nms: bool,

    /// Number of classes reported by classification models.
    pub topk: usize,

    /// Report classification scores as emitted instead of applying softmax.
    pub output_raw_scores: bool,

    /// Resize strategy for the input image.
    pub resize_type: ResizeType,

    /// Per-channel values subtracted from the input, in model channel order.
    pub mean_values: [f32; 3],

    /// Per-channel divisors applied after mean subtraction.
    pub scale_values: [f32; 3],

    /// Feed RGB instead of the default BGR channel order.
    pub reverse_input_channels: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_type: None,
            labels: Vec::new(),
            confidence_threshold: 0.5,
            iou_threshold: 0.5,
            apply_nms: false,
            topk: 1,
            output_raw_scores: false,
            resize_type: ResizeType::Standard,
            mean_values: [0.0; 3],
            scale_values: [1.0; 3],
            reverse_input_channels: false,
        }
    }
}

impl ModelConfig {
    /// Parse from a manifest's `model_info` map. Unknown keys are ignored.
    pub fn from_model_info(info: &Map<String, Value>) -> Result<Self> {
        let config: Self = serde_json::from_value(Value::Object(info.clone()))
            .map_err(|e| ModelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| ModelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ModelError::Config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(ModelError::Config(format!(
                "iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            )));
        }
        if self.topk == 0 {
            return Err(ModelError::Config("topk must be at least 1".to_string()));
        }
        if self.scale_values.contains(&0.0) {
            return Err(ModelError::Config("scale_values must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Label for a class id, or `#<id>` when the id is out of range.
    pub fn label(&self, id: usize) -> String {
        self.labels
            .get(id)
            .cloned()
            .unwrap_or_else(|| format!("#{}", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn info(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_defaults_from_empty_info() {
        let config = ModelConfig::from_model_info(&Map::new()).unwrap();
        assert_eq!(config, ModelConfig::default());
    }

    #[test]
    fn test_parse_ssd_info() {
        let config = ModelConfig::from_model_info(&info(json!({
            "model_type": "SSD",
            "labels": ["background", "person", "bicycle"],
            "confidence_threshold": 0.4,
            "resize_type": "fit_to_window_letterbox",
            "reverse_input_channels": true,
            "some_other_key": 42
        })))
        .unwrap();

        assert_eq!(config.model_type, Some(ModelFamily::Detection));
        assert_eq!(config.labels.len(), 3);
        assert_eq!(config.confidence_threshold, 0.4);
        assert_eq!(config.resize_type, ResizeType::FitToWindowLetterbox);
        assert!(config.reverse_input_channels);
        assert_eq!(config.label(1), "person");
        assert_eq!(config.label(7), "#7");
    }

    #[test]
    fn test_resize_type_names() {
        for (name, resize_type) in [
            ("standard", ResizeType::Standard),
            ("crop", ResizeType::Crop),
            ("fit_to_window", ResizeType::FitToWindow),
            ("fit_to_window_letterbox", ResizeType::FitToWindowLetterbox),
        ] {
            let config = ModelConfig::from_model_info(&info(json!({ "resize_type": name }))).unwrap();
            assert_eq!(config.resize_type, resize_type, "{}", name);
        }
    }

    #[test]
    fn test_family_aliases() {
        for (name, family) in [
            ("Classification", ModelFamily::Classification),
            ("SSD", ModelFamily::Detection),
            ("detection", ModelFamily::Detection),
            ("MaskRCNN", ModelFamily::InstanceSegmentation),
            ("instance_segmentation", ModelFamily::InstanceSegmentation),
        ] {
            let config = ModelConfig::from_model_info(&info(json!({ "model_type": name }))).unwrap();
            assert_eq!(config.model_type, Some(family), "{}", name);
        }
    }

    #[test]
    fn test_rejects_bad_values() {
        for bad in [
            json!({ "confidence_threshold": 1.5 }),
            json!({ "iou_threshold": -0.1 }),
            json!({ "topk": 0 }),
            json!({ "scale_values": [1.0, 0.0, 1.0] }),
            json!({ "model_type": "YOLO" }),
            json!({ "labels": "person" }),
        ] {
            let err = ModelConfig::from_model_info(&info(bad.clone())).unwrap_err();
            assert!(matches!(err, ModelError::Config(_)), "{}", bad);
        }
    }
}
