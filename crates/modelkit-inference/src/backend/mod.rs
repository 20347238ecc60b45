//! Backend implementations.

#[cfg(feature = "native")]
pub mod ort;

#[cfg(feature = "tract")]
pub mod tract;

use crate::{InputTensor, OutputTensor, Result};

/// A compiled, runnable model session.
///
/// Implementations own the engine-side state. Running must not mutate the
/// model itself, so two runs on the same input give the same outputs.
pub trait InferenceBackend: Send + Sync {
    /// Run one forward pass with named inputs, returning named outputs in
    /// the model's declared output order.
    fn run(&self, inputs: &[(&str, InputTensor)]) -> Result<Vec<(String, OutputTensor)>>;

    /// Input names expected by the model.
    fn input_names(&self) -> &[String];

    /// Output names produced by the model.
    fn output_names(&self) -> &[String];
}
