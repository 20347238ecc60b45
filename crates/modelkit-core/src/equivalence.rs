//! Save/reload equivalence checks.
//!
//! A case loads a model, runs it on a fixed image, writes its compiled
//! representation to a scratch directory, reloads that copy through a fresh
//! adapter and requires the reloaded model to give the same result. The
//! scratch directory is removed when the check returns, pass or fail.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use modelkit_inference::{InferenceAdapter, ModelFiles, Target};

use crate::error::{ModelError, Result};
use crate::models::{load_image, Model, ModelFamily};
use crate::results::{DetectedObject, InferenceResult};

/// Sample image, relative to the data directory.
pub const IMAGE_PATH: &str = "coco128/images/train2017/000000000074.jpg";

/// File name of the serialized copy inside the scratch directory.
pub const TMP_MODEL_FILE: &str = "tmp_model.onnx";

/// A named model under `<data_dir>/public/<name>/FP16/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelData {
    pub name: String,
    pub family: ModelFamily,
}

impl ModelData {
    pub fn new(name: impl Into<String>, family: ModelFamily) -> Self {
        Self {
            name: name.into(),
            family,
        }
    }

    /// `<data_dir>/public/<name>/FP16/<name>.onnx`
    pub fn model_path(&self, data_dir: &Path) -> PathBuf {
        data_dir
            .join("public")
            .join(&self.name)
            .join("FP16")
            .join(format!("{}.onnx", self.name))
    }
}

/// Cases run by the save/reload check.
pub fn save_load_cases() -> Vec<ModelData> {
    vec![ModelData::new("ssd_mobilenet_v1_fpn_coco", ModelFamily::Detection)]
}

/// Settings for a check run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Root of the model and image data.
    pub data_dir: PathBuf,

    /// Input image, relative to `data_dir` unless absolute.
    pub image: PathBuf,

    /// Execution target name.
    pub device: String,

    /// How many times the serialized copy is reloaded and compared.
    pub reloads: usize,

    /// Where scratch directories for serialized copies are created.
    pub scratch_dir: PathBuf,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("../data"),
            image: PathBuf::from(IMAGE_PATH),
            device: Target::Cpu.to_string(),
            reloads: 1,
            scratch_dir: PathBuf::from("."),
        }
    }
}

impl CheckConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| ModelError::Config(e.to_string()))
    }

    pub fn image_path(&self) -> PathBuf {
        self.data_dir.join(&self.image)
    }
}

/// Outcome of a passing case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub case: String,
    /// Records in the reference result.
    pub records: usize,
    /// Reloads that matched.
    pub reloads: usize,
}

/// Runs save/reload cases against one data directory.
#[derive(Debug)]
pub struct EquivalenceChecker {
    config: CheckConfig,
    target: Target,
}

impl EquivalenceChecker {
    pub fn new(config: CheckConfig) -> Result<Self> {
        if config.reloads == 0 {
            return Err(ModelError::Config("reloads must be at least 1".to_string()));
        }
        let target = config.device.parse()?;
        Ok(Self { config, target })
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Run one case.
    pub fn check(&self, case: &ModelData) -> Result<CheckReport> {
        let image = load_image(self.config.image_path())?;

        let model_path = case.model_path(&self.config.data_dir);
        let adapter = InferenceAdapter::load(&model_path, self.target)?;
        let model = Model::from_adapter_as(adapter, Some(case.family))?;

        let expected = model.infer(&image)?;
        info!("{}: reference result has {} records", case.name, expected.len());

        let copy = ScratchCopy::write(&model, &self.config.scratch_dir)?;

        for round in 1..=self.config.reloads {
            let adapter = InferenceAdapter::load(&copy.files.graph, self.target)?;
            let restored = Model::from_adapter_as(adapter, Some(case.family))?;
            let actual = restored.infer(&image)?;

            compare(&expected, &actual)?;
            debug!("{}: reload {} matches", case.name, round);
        }

        Ok(CheckReport {
            case: case.name.clone(),
            records: expected.len(),
            reloads: self.config.reloads,
        })
    }
}

/// A serialized model in its own scratch directory, removed on drop.
struct ScratchCopy {
    files: ModelFiles,
    _dir: TempDir,
}

impl ScratchCopy {
    fn write(model: &Model, scratch_root: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("modelkit-check-")
            .tempdir_in(scratch_root)?;
        let files = model
            .compiled_model()
            .serialize(dir.path().join(TMP_MODEL_FILE))?;
        debug!("Serialized copy at {}", files.graph.display());

        Ok(Self { files, _dir: dir })
    }
}

impl Drop for ScratchCopy {
    fn drop(&mut self) {
        if let Err(e) = self.files.remove() {
            warn!("Failed to remove {}: {}", self.files.graph.display(), e);
        }
    }
}

/// Require two results to be structurally identical.
///
/// Sizes must match, then records are compared index by index: position and
/// size, label id and score; masks for segmentation.
pub fn compare(expected: &InferenceResult, actual: &InferenceResult) -> Result<()> {
    if expected.family() != actual.family() {
        return Err(ModelError::mismatch("result", "family", expected.family(), actual.family()));
    }
    if expected.len() != actual.len() {
        return Err(ModelError::mismatch("result", "size", expected.len(), actual.len()));
    }

    match (expected, actual) {
        (InferenceResult::Classification(a), InferenceResult::Classification(b)) => {
            for (i, (x, y)) in a.top_labels.iter().zip(&b.top_labels).enumerate() {
                let at = format!("class {}", i);
                same(&at, "id", x.id, y.id)?;
                same(&at, "score", x.score, y.score)?;
            }
        }
        (InferenceResult::Detection(a), InferenceResult::Detection(b)) => {
            for (i, (x, y)) in a.objects.iter().zip(&b.objects).enumerate() {
                compare_object(&format!("object {}", i), x, y)?;
            }
        }
        (InferenceResult::InstanceSegmentation(a), InferenceResult::InstanceSegmentation(b)) => {
            for (i, (x, y)) in a.objects.iter().zip(&b.objects).enumerate() {
                let at = format!("object {}", i);
                compare_object(&at, &x.object, &y.object)?;
                if x.mask != y.mask {
                    return Err(ModelError::mismatch(
                        at,
                        "mask pixels",
                        x.mask.count(),
                        y.mask.count(),
                    ));
                }
            }
        }
        _ => unreachable!("families compared above"),
    }

    Ok(())
}

fn compare_object(at: &str, x: &DetectedObject, y: &DetectedObject) -> Result<()> {
    same(at, "x", x.x, y.x)?;
    same(at, "y", x.y, y.y)?;
    same(at, "width", x.width, y.width)?;
    same(at, "height", x.height, y.height)?;
    same(at, "label_id", x.label_id, y.label_id)?;
    same(at, "score", x.score, y.score)
}

fn same<T: PartialEq + ToString>(at: &str, field: &str, expected: T, actual: T) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ModelError::mismatch(at, field, expected, actual))
    }
}
