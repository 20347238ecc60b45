//! Tract backend, pure Rust and CPU only.

use ndarray::ArrayD;
use tract_onnx::prelude::*;
use tracing::debug;

use crate::error::InferenceError;
use crate::tensor::{InputTensor, OutputTensor};
use crate::{InferenceBackend, Result};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Backend using Tract.
pub struct TractBackend {
    model: Plan,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

macro_rules! tract_value {
    ($arr:expr) => {{
        let shape: TVec<usize> = $arr.shape().iter().cloned().collect();
        let data = $arr.iter().cloned().collect::<Vec<_>>();
        tract_ndarray::ArrayD::from_shape_vec(tract_ndarray::IxDyn(shape.as_slice()), data)
            .map(|arr| arr.into_tvalue())
            .map_err(|e| InferenceError::InvalidInput(e.to_string()))
    }};
}

macro_rules! extract_output {
    ($value:expr, $ty:ty, $variant:ident) => {
        match $value.to_array_view::<$ty>() {
            Ok(view) => {
                let shape: Vec<usize> = view.shape().to_vec();
                let data: Vec<$ty> = view.iter().cloned().collect();
                let arr = ArrayD::from_shape_vec(ndarray::IxDyn(&shape), data)
                    .map_err(|e| InferenceError::OutputExtraction(e.to_string()))?;
                Some(OutputTensor::$variant(arr))
            }
            Err(_) => None,
        }
    };
}

impl TractBackend {
    /// Compile a model held in memory, pinning the first input to `input_shape`.
    pub fn from_bytes_with_shape(bytes: &[u8], input_shape: &[usize]) -> Result<Self> {
        debug!(
            "Compiling ONNX model with Tract from {} bytes, input shape {:?}",
            bytes.len(),
            input_shape
        );

        let mut model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .map_err(|e| InferenceError::ModelLoad(format!("failed to parse model: {}", e)))?;

        model
            .set_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), input_shape))
            .map_err(|e| InferenceError::ModelLoad(format!("failed to set input shape: {}", e)))?;

        let input_names = model
            .input_outlets()
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?
            .iter()
            .map(|outlet| model.node(outlet.node).name.clone())
            .collect();
        let output_names = model
            .output_outlets()
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?
            .iter()
            .map(|outlet| model.node(outlet.node).name.clone())
            .collect();

        let model = model
            .into_typed()
            .map_err(|e| InferenceError::ModelLoad(format!("failed to type model: {}", e)))?
            .into_optimized()
            .map_err(|e| InferenceError::ModelLoad(format!("failed to optimize: {}", e)))?
            .into_runnable()
            .map_err(|e| InferenceError::SessionCreate(e.to_string()))?;

        Ok(Self {
            model,
            input_names,
            output_names,
        })
    }

    fn convert_input(tensor: &InputTensor) -> Result<TValue> {
        match tensor {
            InputTensor::Float32(arr) => tract_value!(arr),
            InputTensor::Float64(arr) => tract_value!(arr),
            InputTensor::Int32(arr) => tract_value!(arr),
            InputTensor::Int64(arr) => tract_value!(arr),
            InputTensor::Uint8(arr) => tract_value!(arr),
        }
    }
}

impl InferenceBackend for TractBackend {
    fn run(&self, inputs: &[(&str, InputTensor)]) -> Result<Vec<(String, OutputTensor)>> {
        let tract_inputs: TVec<TValue> = inputs
            .iter()
            .map(|(_, tensor)| Self::convert_input(tensor))
            .collect::<Result<TVec<_>>>()?;

        let outputs = self
            .model
            .run(tract_inputs)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let mut results = Vec::with_capacity(outputs.len());

        for (idx, output) in outputs.iter().enumerate() {
            let name = self
                .output_names
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("output_{}", idx));

            let tensor = extract_output!(output, f32, Float32)
                .or(extract_output!(output, i64, Int64))
                .or(extract_output!(output, i32, Int32))
                .ok_or_else(|| {
                    InferenceError::OutputExtraction(format!("unsupported output type for '{}'", name))
                })?;

            results.push((name, tensor));
        }

        Ok(results)
    }

    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }
}
