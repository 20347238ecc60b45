//! Compiled model representation.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::backend::InferenceBackend;
use crate::description::{Manifest, ModelDescription, ModelFiles, TensorSpec};
use crate::error::InferenceError;
use crate::tensor::{InputTensor, OutputTensor};
use crate::Result;

/// Execution target a model is compiled for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Target {
    /// Default CPU execution.
    #[default]
    Cpu,
    /// CPU execution through the XNNPACK execution provider (ort only).
    Xnnpack,
}

impl FromStr for Target {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CPU" => Ok(Target::Cpu),
            "XNNPACK" => Ok(Target::Xnnpack),
            _ => Err(InferenceError::UnsupportedTarget(s.to_string())),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Cpu => write!(f, "CPU"),
            Target::Xnnpack => write!(f, "XNNPACK"),
        }
    }
}

/// A model description compiled for one target.
///
/// Immutable once built: compiling again produces a new value. The
/// description is kept alongside the session so the representation can be
/// written back out exactly as it was loaded.
pub struct CompiledModel {
    description: ModelDescription,
    target: Target,
    backend: Box<dyn InferenceBackend>,
}

impl fmt::Debug for CompiledModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledModel")
            .field("graph_bytes", &self.description.graph.len())
            .field("manifest", &self.description.manifest)
            .field("target", &self.target)
            .field("outputs", &self.backend.output_names())
            .finish()
    }
}

impl CompiledModel {
    /// Read the model pair at `path` and compile it for `target`.
    pub fn load<P: AsRef<Path>>(path: P, target: Target) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading model {} for {}", path.display(), target);
        Self::compile(ModelDescription::read(path)?, target)
    }

    /// Compile a description already held in memory.
    pub fn compile(description: ModelDescription, target: Target) -> Result<Self> {
        let backend = build_backend(&description, target)?;
        Ok(Self::from_backend(description, target, backend))
    }

    /// Pair a description with a session that was built elsewhere.
    pub fn from_backend(
        description: ModelDescription,
        target: Target,
        backend: Box<dyn InferenceBackend>,
    ) -> Self {
        Self {
            description,
            target,
            backend,
        }
    }

    /// Run one forward pass after checking the declared input contract.
    pub fn infer(&self, inputs: &[(&str, InputTensor)]) -> Result<Vec<(String, OutputTensor)>> {
        self.description.manifest.check_inputs(inputs)?;
        self.backend.run(inputs)
    }

    /// Write the representation to `path` so that [`CompiledModel::load`]
    /// recovers the same inference behaviour.
    pub fn serialize<P: AsRef<Path>>(&self, path: P) -> Result<ModelFiles> {
        let files = self.description.write(path)?;
        debug!("Serialized model to {}", files.graph.display());
        Ok(files)
    }

    pub fn description(&self) -> &ModelDescription {
        &self.description
    }

    pub fn manifest(&self) -> &Manifest {
        &self.description.manifest
    }

    /// Declared input contract (may be empty).
    pub fn inputs(&self) -> &[TensorSpec] {
        &self.description.manifest.inputs
    }

    pub fn model_info(&self) -> &Map<String, Value> {
        &self.description.manifest.model_info
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn input_names(&self) -> &[String] {
        self.backend.input_names()
    }

    pub fn output_names(&self) -> &[String] {
        self.backend.output_names()
    }
}

#[cfg(feature = "native")]
fn build_backend(description: &ModelDescription, target: Target) -> Result<Box<dyn InferenceBackend>> {
    let backend = crate::backend::ort::OrtBackend::from_bytes(&description.graph, target)?;
    Ok(Box::new(backend))
}

#[cfg(all(feature = "tract", not(feature = "native")))]
fn build_backend(description: &ModelDescription, target: Target) -> Result<Box<dyn InferenceBackend>> {
    if target != Target::Cpu {
        return Err(InferenceError::UnsupportedTarget(format!(
            "{} is not available with the tract backend",
            target
        )));
    }

    // tract needs a concrete input shape up front
    let shape = description
        .manifest
        .inputs
        .first()
        .map(|spec| spec.concrete_shape(1))
        .unwrap_or_else(|| vec![1, 3, 640, 640]);

    let backend = crate::backend::tract::TractBackend::from_bytes_with_shape(&description.graph, &shape)?;
    Ok(Box::new(backend))
}

#[cfg(not(any(feature = "native", feature = "tract")))]
fn build_backend(_description: &ModelDescription, target: Target) -> Result<Box<dyn InferenceBackend>> {
    Err(InferenceError::UnsupportedTarget(format!(
        "{} (no inference backend enabled)",
        target
    )))
}
