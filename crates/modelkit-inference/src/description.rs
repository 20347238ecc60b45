//! Model descriptions on disk.
//!
//! A model is stored as two sibling files sharing a base name: the ONNX
//! graph (`<name>.onnx`, structure and weights) and a JSON manifest
//! (`<name>.json`) holding the declared input contract and free-form model
//! info consumed by the model wrappers.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::InferenceError;
use crate::tensor::InputTensor;
use crate::Result;

const GRAPH_EXTENSION: &str = "onnx";
const MANIFEST_EXTENSION: &str = "json";

/// Paths of the two files making up a model description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub graph: PathBuf,
    pub manifest: PathBuf,
}

impl ModelFiles {
    /// Resolve both files from a path naming either of them (or neither,
    /// when given without an extension).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        Self {
            graph: path.with_extension(GRAPH_EXTENSION),
            manifest: path.with_extension(MANIFEST_EXTENSION),
        }
    }

    /// Remove both files, ignoring ones that do not exist.
    pub fn remove(&self) -> Result<()> {
        for path in [&self.graph, &self.manifest] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Declared shape of one model input. Negative dimensions are dynamic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<i64>,
}

impl TensorSpec {
    /// Whether a concrete shape satisfies this spec.
    pub fn accepts(&self, shape: &[usize]) -> bool {
        self.shape.len() == shape.len()
            && self
                .shape
                .iter()
                .zip(shape)
                .all(|(&declared, &actual)| declared < 0 || declared as usize == actual)
    }

    /// Concrete shape, with dynamic dimensions replaced by `fill`.
    pub fn concrete_shape(&self, fill: usize) -> Vec<usize> {
        self.shape
            .iter()
            .map(|&d| if d < 0 { fill } else { d as usize })
            .collect()
    }
}

/// JSON half of a model description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Declared input contract. Empty means "not declared".
    pub inputs: Vec<TensorSpec>,

    /// Model-family metadata (labels, thresholds, model type, ...).
    pub model_info: Map<String, Value>,
}

impl Manifest {
    /// Check inputs against the declared contract.
    pub fn check_inputs(&self, inputs: &[(&str, InputTensor)]) -> Result<()> {
        if self.inputs.is_empty() {
            return Ok(());
        }

        for (name, tensor) in inputs {
            let spec = self
                .inputs
                .iter()
                .find(|spec| spec.name == *name)
                .ok_or_else(|| InferenceError::InvalidInput(format!("unknown input '{}'", name)))?;

            if !spec.accepts(tensor.shape()) {
                return Err(InferenceError::InvalidInput(format!(
                    "input '{}' has shape {:?}, model expects {:?}",
                    name,
                    tensor.shape(),
                    spec.shape
                )));
            }
        }

        Ok(())
    }
}

/// A model description held in memory: graph bytes plus manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescription {
    pub graph: Vec<u8>,
    pub manifest: Manifest,
}

impl ModelDescription {
    /// Read a description from disk. A missing manifest is not an error.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let files = ModelFiles::from_path(path);
        debug!("Reading model graph from: {}", files.graph.display());

        let graph = fs::read(&files.graph)?;
        if graph.is_empty() {
            return Err(InferenceError::ModelLoad(format!(
                "{} is empty",
                files.graph.display()
            )));
        }

        let manifest = match fs::read_to_string(&files.manifest) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No manifest at {}, using defaults", files.manifest.display());
                Manifest::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self { graph, manifest })
    }

    /// Write the description pair. The graph bytes are written verbatim.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<ModelFiles> {
        let files = ModelFiles::from_path(path);
        debug!(
            "Writing {} graph bytes to {}",
            self.graph.len(),
            files.graph.display()
        );

        fs::write(&files.graph, &self.graph)?;
        fs::write(&files.manifest, serde_json::to_string_pretty(&self.manifest)?)?;

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec(name: &str, shape: &[i64]) -> TensorSpec {
        TensorSpec {
            name: name.to_string(),
            shape: shape.to_vec(),
        }
    }

    #[test]
    fn test_model_files_from_any_extension() {
        let expected = ModelFiles {
            graph: PathBuf::from("public/ssd/FP16/ssd.onnx"),
            manifest: PathBuf::from("public/ssd/FP16/ssd.json"),
        };
        assert_eq!(ModelFiles::from_path("public/ssd/FP16/ssd.onnx"), expected);
        assert_eq!(ModelFiles::from_path("public/ssd/FP16/ssd.json"), expected);
        assert_eq!(ModelFiles::from_path("public/ssd/FP16/ssd"), expected);
    }

    #[test]
    fn test_spec_accepts_dynamic_dims() {
        let s = spec("image", &[1, 3, -1, -1]);
        assert!(s.accepts(&[1, 3, 480, 640]));
        assert!(!s.accepts(&[1, 1, 480, 640]));
        assert!(!s.accepts(&[3, 480, 640]));
        assert_eq!(s.concrete_shape(640), vec![1, 3, 640, 640]);
    }

    #[test]
    fn test_check_inputs() {
        let manifest = Manifest {
            inputs: vec![spec("image", &[1, 3, 300, 300])],
            model_info: Map::new(),
        };

        let good = InputTensor::from_f32(vec![0.0; 3 * 300 * 300], &[1, 3, 300, 300]).unwrap();
        assert!(manifest.check_inputs(&[("image", good.clone())]).is_ok());

        let bad = InputTensor::from_f32(vec![0.0; 3 * 200 * 300], &[1, 3, 200, 300]).unwrap();
        assert!(matches!(
            manifest.check_inputs(&[("image", bad)]),
            Err(InferenceError::InvalidInput(_))
        ));

        assert!(matches!(
            manifest.check_inputs(&[("data", good.clone())]),
            Err(InferenceError::InvalidInput(_))
        ));

        // No declared contract: anything goes.
        assert!(Manifest::default().check_inputs(&[("data", good)]).is_ok());
    }

    #[test]
    fn test_write_then_read_keeps_graph_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut model_info = Map::new();
        model_info.insert("model_type".to_string(), Value::from("SSD"));

        let description = ModelDescription {
            graph: vec![8, 1, 18, 4, 0xde, 0xad],
            manifest: Manifest {
                inputs: vec![spec("image", &[1, 3, 300, 300])],
                model_info,
            },
        };

        let files = description.write(dir.path().join("tmp_model.onnx")).unwrap();
        assert!(files.graph.exists());
        assert!(files.manifest.exists());

        let restored = ModelDescription::read(dir.path().join("tmp_model")).unwrap();
        assert_eq!(restored, description);

        files.remove().unwrap();
        assert!(!files.graph.exists());
        files.remove().unwrap();
    }

    #[test]
    fn test_read_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bare.onnx"), [1u8, 2, 3]).unwrap();

        let description = ModelDescription::read(dir.path().join("bare.onnx")).unwrap();
        assert_eq!(description.manifest, Manifest::default());
    }

    #[test]
    fn test_read_missing_graph_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelDescription::read(dir.path().join("missing.onnx")).unwrap_err();
        assert!(matches!(err, InferenceError::Io(_)));
    }

    #[test]
    fn test_read_malformed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("m.onnx"), [1u8]).unwrap();
        fs::write(dir.path().join("m.json"), "{ not json").unwrap();

        let err = ModelDescription::read(dir.path().join("m.onnx")).unwrap_err();
        assert!(matches!(err, InferenceError::Manifest(_)));
    }
}
