//! Inference adapter layer for modelkit.
//!
//! An [`InferenceAdapter`] owns exactly one [`CompiledModel`]: the model
//! description (ONNX graph plus its JSON manifest) compiled for one
//! execution [`Target`]. Adapters are built either from a path on disk or
//! from a representation that is already in memory, so callers never need
//! to know where the weights came from.
//!
//! Backends:
//! - `ort` (ONNX Runtime, optionally with XNNPACK) behind the `native` feature
//! - `tract` behind the `tract` feature

mod adapter;
mod backend;
mod compiled;
mod description;
mod error;
mod tensor;

pub use adapter::InferenceAdapter;
pub use backend::InferenceBackend;
pub use compiled::{CompiledModel, Target};
pub use description::{Manifest, ModelDescription, ModelFiles, TensorSpec};
pub use error::InferenceError;
pub use tensor::{InputTensor, OutputTensor, TensorType};

#[cfg(feature = "native")]
pub use backend::ort::OrtBackend;

#[cfg(feature = "tract")]
pub use backend::tract::TractBackend;

/// Result type for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;
