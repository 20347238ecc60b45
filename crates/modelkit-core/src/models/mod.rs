//! Model families and the [`Model`] enum that ties them together.

mod classification;
mod detection;
mod instance_segmentation;
mod preprocessing;

pub use classification::ClassificationModel;
pub use detection::DetectionModel;
pub use instance_segmentation::MaskRcnnModel;
pub use preprocessing::{validate_image, ImageMeta, InputTransform};

use std::fmt;
use std::path::Path;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use modelkit_inference::{CompiledModel, InferenceAdapter, InputTensor, OutputTensor, Target};

use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::results::InferenceResult;

/// The fixed set of model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    #[serde(alias = "classification")]
    Classification,
    #[serde(rename = "SSD", alias = "ssd", alias = "Detection", alias = "detection")]
    Detection,
    #[serde(
        rename = "MaskRCNN",
        alias = "maskrcnn",
        alias = "InstanceSegmentation",
        alias = "instance_segmentation"
    )]
    InstanceSegmentation,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::Classification => write!(f, "classification"),
            ModelFamily::Detection => write!(f, "detection"),
            ModelFamily::InstanceSegmentation => write!(f, "instance segmentation"),
        }
    }
}

impl ModelFamily {
    /// Families whose output layout fits the given output names, most
    /// likely first.
    pub fn candidates(output_names: &[String]) -> Vec<ModelFamily> {
        let has = |key: &str| {
            output_names
                .iter()
                .any(|name| name.to_ascii_lowercase().contains(key))
        };

        if has("masks") && has("boxes") {
            vec![ModelFamily::InstanceSegmentation]
        } else if has("boxes") && has("labels") {
            vec![ModelFamily::Detection]
        } else if output_names.len() == 1 {
            if has("detection") {
                vec![ModelFamily::Detection, ModelFamily::Classification]
            } else {
                vec![ModelFamily::Classification, ModelFamily::Detection]
            }
        } else {
            Vec::new()
        }
    }

    /// Pick the family for a model.
    ///
    /// A `model_type` in the model info wins; otherwise the output names
    /// decide. `requested` must agree with whichever source is used.
    pub fn resolve(
        declared: Option<ModelFamily>,
        output_names: &[String],
        requested: Option<ModelFamily>,
    ) -> Result<ModelFamily> {
        if let Some(declared) = declared {
            return match requested {
                Some(requested) if requested != declared => Err(ModelError::UnsupportedModel(
                    format!("model declares {} but {} was requested", declared, requested),
                )),
                _ => Ok(declared),
            };
        }

        let candidates = Self::candidates(output_names);
        match requested {
            Some(requested) if candidates.contains(&requested) => Ok(requested),
            Some(requested) => Err(ModelError::UnsupportedModel(format!(
                "outputs {:?} do not fit a {} model",
                output_names, requested
            ))),
            None => candidates.first().copied().ok_or_else(|| {
                ModelError::UnsupportedModel(format!(
                    "outputs {:?} match no supported model family",
                    output_names
                ))
            }),
        }
    }

    /// Input size (width, height) used when the manifest leaves it open.
    fn default_input_size(self) -> (u32, u32) {
        match self {
            ModelFamily::Classification => (224, 224),
            ModelFamily::Detection => (300, 300),
            ModelFamily::InstanceSegmentation => (1344, 800),
        }
    }
}

/// Read and decode an image file.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path = path.as_ref();
    debug!("Reading image: {}", path.display());
    let image = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    Ok(image)
}

/// State shared by every family: the adapter and how to feed it.
#[derive(Debug)]
struct ModelBase {
    adapter: InferenceAdapter,
    config: ModelConfig,
    transform: InputTransform,
    input_name: String,
    input_size: (u32, u32),
}

impl ModelBase {
    fn bind(adapter: InferenceAdapter, requested: Option<ModelFamily>) -> Result<(Self, ModelFamily)> {
        let config = ModelConfig::from_model_info(adapter.model_info())?;
        let family = ModelFamily::resolve(config.model_type, adapter.output_names(), requested)?;

        let declared = adapter.inputs().first();
        let input_name = declared
            .map(|s| s.name.clone())
            .or_else(|| adapter.input_names().first().cloned())
            .unwrap_or_else(|| "image".to_string());

        let (default_w, default_h) = family.default_input_size();
        let input_size = match declared.map(|s| s.shape.as_slice()) {
            Some([_, _, h, w]) => (
                if *w > 0 { *w as u32 } else { default_w },
                if *h > 0 { *h as u32 } else { default_h },
            ),
            _ => (default_w, default_h),
        };

        info!(
            "Bound {} model on {}: input '{}' {}x{}, {} labels",
            family,
            adapter.target(),
            input_name,
            input_size.0,
            input_size.1,
            config.labels.len()
        );

        let transform = InputTransform::from_config(&config);
        let base = Self {
            adapter,
            config,
            transform,
            input_name,
            input_size,
        };
        Ok((base, family))
    }

    fn run(&self, image: &DynamicImage) -> Result<(Vec<(String, OutputTensor)>, ImageMeta)> {
        let (tensor, meta) = self.transform.apply(image, self.input_size)?;
        let input = InputTensor::Float32(tensor.into_dyn());

        let outputs = self.adapter.infer(&[(self.input_name.as_str(), input)])?;
        debug!(
            "Outputs: {:?}",
            outputs
                .iter()
                .map(|(name, t)| (name.as_str(), t.shape()))
                .collect::<Vec<_>>()
        );

        Ok((outputs, meta))
    }
}

/// Find an output whose name contains `key`, case-insensitively.
fn find_output<'a>(outputs: &'a [(String, OutputTensor)], key: &str) -> Option<&'a OutputTensor> {
    outputs
        .iter()
        .find(|(name, _)| name.to_ascii_lowercase().contains(key))
        .map(|(_, tensor)| tensor)
}

/// Implements the constructors and accessors every family shares.
macro_rules! family_model {
    ($name:ident, $family:expr) => {
        impl $name {
            /// Load the model at `path` for `target`.
            pub fn create_model<P: AsRef<std::path::Path>>(
                path: P,
                target: modelkit_inference::Target,
            ) -> crate::error::Result<Self> {
                Self::from_adapter(modelkit_inference::InferenceAdapter::load(path, target)?)
            }

            /// Wrap an adapter that is already loaded.
            pub fn from_adapter(
                adapter: modelkit_inference::InferenceAdapter,
            ) -> crate::error::Result<Self> {
                let (base, _) = super::ModelBase::bind(adapter, Some($family))?;
                Ok(Self { base })
            }

            /// The compiled representation behind this model.
            pub fn compiled_model(&self) -> &modelkit_inference::CompiledModel {
                self.base.adapter.compiled_model()
            }

            pub fn adapter(&self) -> &modelkit_inference::InferenceAdapter {
                &self.base.adapter
            }

            pub fn config(&self) -> &crate::config::ModelConfig {
                &self.base.config
            }

            /// Model input size (width, height).
            pub fn input_size(&self) -> (u32, u32) {
                self.base.input_size
            }
        }
    };
}
use family_model;

/// A model of any supported family.
#[derive(Debug)]
pub enum Model {
    Classification(ClassificationModel),
    Detection(DetectionModel),
    InstanceSegmentation(MaskRcnnModel),
}

impl Model {
    /// Load the model at `path`, taking the family from its description.
    pub fn create_model<P: AsRef<Path>>(path: P, target: Target) -> Result<Self> {
        Self::from_adapter(InferenceAdapter::load(path, target)?)
    }

    /// Wrap an already loaded adapter, taking the family from its description.
    pub fn from_adapter(adapter: InferenceAdapter) -> Result<Self> {
        Self::from_adapter_as(adapter, None)
    }

    /// Wrap an adapter as a specific family, or let the description decide.
    pub fn from_adapter_as(adapter: InferenceAdapter, family: Option<ModelFamily>) -> Result<Self> {
        let (base, family) = ModelBase::bind(adapter, family)?;
        Ok(match family {
            ModelFamily::Classification => Model::Classification(ClassificationModel { base }),
            ModelFamily::Detection => Model::Detection(DetectionModel { base }),
            ModelFamily::InstanceSegmentation => {
                Model::InstanceSegmentation(MaskRcnnModel { base })
            }
        })
    }

    /// Preprocess, run and decode one image.
    pub fn infer(&self, image: &DynamicImage) -> Result<InferenceResult> {
        Ok(match self {
            Model::Classification(m) => InferenceResult::Classification(m.infer(image)?),
            Model::Detection(m) => InferenceResult::Detection(m.infer(image)?),
            Model::InstanceSegmentation(m) => InferenceResult::InstanceSegmentation(m.infer(image)?),
        })
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            Model::Classification(_) => ModelFamily::Classification,
            Model::Detection(_) => ModelFamily::Detection,
            Model::InstanceSegmentation(_) => ModelFamily::InstanceSegmentation,
        }
    }

    fn base(&self) -> &ModelBase {
        match self {
            Model::Classification(m) => &m.base,
            Model::Detection(m) => &m.base,
            Model::InstanceSegmentation(m) => &m.base,
        }
    }

    /// The compiled representation behind this model.
    pub fn compiled_model(&self) -> &CompiledModel {
        self.base().adapter.compiled_model()
    }

    pub fn config(&self) -> &ModelConfig {
        &self.base().config
    }

    pub fn labels(&self) -> &[String] {
        &self.base().config.labels
    }

    /// Model input size (width, height).
    pub fn input_size(&self) -> (u32, u32) {
        self.base().input_size
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{adapter, Scripted};
    use super::*;
    use ndarray::{ArrayD, IxDyn};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn f32_tensor(shape: &[usize], data: Vec<f32>) -> OutputTensor {
        OutputTensor::Float32(ArrayD::from_shape_vec(IxDyn(shape), data).unwrap())
    }

    #[test]
    fn test_candidates_from_output_names() {
        assert_eq!(
            ModelFamily::candidates(&names(&["boxes", "labels", "masks"])),
            vec![ModelFamily::InstanceSegmentation]
        );
        assert_eq!(
            ModelFamily::candidates(&names(&["boxes", "labels"])),
            vec![ModelFamily::Detection]
        );
        assert_eq!(
            ModelFamily::candidates(&names(&["detection_out"])),
            vec![ModelFamily::Detection, ModelFamily::Classification]
        );
        assert_eq!(
            ModelFamily::candidates(&names(&["prob"])),
            vec![ModelFamily::Classification, ModelFamily::Detection]
        );
        assert!(ModelFamily::candidates(&names(&[])).is_empty());
        assert!(ModelFamily::candidates(&names(&["a", "b"])).is_empty());
    }

    #[test]
    fn test_resolve_prefers_declared_type() {
        let outputs = names(&["prob"]);
        assert_eq!(
            ModelFamily::resolve(Some(ModelFamily::Detection), &outputs, None).unwrap(),
            ModelFamily::Detection
        );
        assert!(matches!(
            ModelFamily::resolve(
                Some(ModelFamily::Detection),
                &outputs,
                Some(ModelFamily::InstanceSegmentation)
            ),
            Err(ModelError::UnsupportedModel(_))
        ));
        assert_eq!(
            ModelFamily::resolve(None, &outputs, Some(ModelFamily::Detection)).unwrap(),
            ModelFamily::Detection
        );
        assert!(matches!(
            ModelFamily::resolve(None, &names(&["boxes", "labels"]), Some(ModelFamily::Classification)),
            Err(ModelError::UnsupportedModel(_))
        ));
        assert!(matches!(
            ModelFamily::resolve(None, &[], None),
            Err(ModelError::UnsupportedModel(_))
        ));
    }

    #[test]
    fn test_model_picks_family_from_outputs() {
        let backend = Scripted::new(vec![
            ("boxes", f32_tensor(&[1, 5], vec![10.0, 10.0, 20.0, 20.0, 0.9])),
            ("labels", f32_tensor(&[1], vec![2.0])),
        ]);
        let model = Model::from_adapter(adapter(backend, json!({}), (100, 100))).unwrap();
        assert_eq!(model.family(), ModelFamily::Detection);
        assert_eq!(model.input_size(), (100, 100));

        let image = DynamicImage::new_rgb8(200, 100);
        let result = model.infer(&image).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_typed_constructor_rejects_other_family() {
        let backend = Scripted::new(vec![("prob", f32_tensor(&[1, 3], vec![0.1, 0.2, 0.7]))]);
        let err = MaskRcnnModel::from_adapter(adapter(backend, json!({}), (32, 32))).unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedModel(_)));
    }

    #[test]
    fn test_dynamic_input_uses_family_default() {
        let backend = Scripted::new(vec![("prob", f32_tensor(&[1, 3], vec![0.1, 0.2, 0.7]))]);
        let model = Model::from_adapter(adapter(backend, json!({}), (-1, -1))).unwrap();
        assert_eq!(model.family(), ModelFamily::Classification);
        assert_eq!(model.input_size(), (224, 224));
    }

    #[test]
    fn test_empty_image_is_preprocess_error() {
        let backend = Scripted::new(vec![("prob", f32_tensor(&[1, 2], vec![0.4, 0.6]))]);
        let model = Model::from_adapter(adapter(backend, json!({}), (8, 8))).unwrap();
        let err = model.infer(&DynamicImage::new_rgb8(0, 0)).unwrap_err();
        assert!(matches!(err, ModelError::Preprocess(_)));
    }

    #[test]
    fn test_load_image_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.jpg");
        std::fs::write(&path, "definitely not a jpeg").unwrap();
        assert!(matches!(load_image(&path), Err(ModelError::Image(_))));

        assert!(matches!(load_image(dir.path().join("missing.png")), Err(ModelError::Io(_))));
    }
}
