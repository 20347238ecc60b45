//! The inference adapter.

use std::path::Path;

use serde_json::{Map, Value};

use crate::compiled::{CompiledModel, Target};
use crate::description::{ModelFiles, TensorSpec};
use crate::tensor::{InputTensor, OutputTensor};
use crate::Result;

/// Binds one [`CompiledModel`] to the code that runs it.
///
/// There are two ways in: [`InferenceAdapter::load`] compiles a model pair
/// from disk, [`InferenceAdapter::from_compiled`] wraps a representation
/// that already exists. Everything downstream of the adapter is the same
/// for both.
#[derive(Debug)]
pub struct InferenceAdapter {
    compiled: CompiledModel,
}

impl InferenceAdapter {
    /// Read the model pair at `path` and compile it for `target`.
    pub fn load<P: AsRef<Path>>(path: P, target: Target) -> Result<Self> {
        Ok(Self::from_compiled(CompiledModel::load(path, target)?))
    }

    /// Take ownership of an already compiled representation.
    pub fn from_compiled(compiled: CompiledModel) -> Self {
        Self { compiled }
    }

    /// Run one forward pass.
    pub fn infer(&self, inputs: &[(&str, InputTensor)]) -> Result<Vec<(String, OutputTensor)>> {
        self.compiled.infer(inputs)
    }

    /// Write the loaded representation to `path`.
    pub fn serialize<P: AsRef<Path>>(&self, path: P) -> Result<ModelFiles> {
        self.compiled.serialize(path)
    }

    pub fn compiled_model(&self) -> &CompiledModel {
        &self.compiled
    }

    pub fn target(&self) -> Target {
        self.compiled.target()
    }

    pub fn inputs(&self) -> &[TensorSpec] {
        self.compiled.inputs()
    }

    pub fn model_info(&self) -> &Map<String, Value> {
        self.compiled.model_info()
    }

    pub fn input_names(&self) -> &[String] {
        self.compiled.input_names()
    }

    pub fn output_names(&self) -> &[String] {
        self.compiled.output_names()
    }
}
