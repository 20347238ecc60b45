//! ONNX Runtime (ort) backend for native platforms.

use std::sync::Mutex;

use ndarray::ArrayD;
use ort::ep::XNNPACK;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;
use tracing::debug;

use crate::compiled::Target;
use crate::error::InferenceError;
use crate::tensor::{InputTensor, OutputTensor};
use crate::{InferenceBackend, Result};

/// Backend using ONNX Runtime.
pub struct OrtBackend {
    session: Mutex<Session>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

macro_rules! session_value {
    ($arr:expr) => {{
        let shape: Vec<i64> = $arr.shape().iter().map(|&s| s as i64).collect();
        let data = $arr.iter().cloned().collect::<Vec<_>>();
        Tensor::from_array((shape, data))
            .map(Into::into)
            .map_err(|e| InferenceError::InvalidInput(e.to_string()))
    }};
}

macro_rules! extract_output {
    ($value:expr, $ty:ty, $variant:ident) => {
        match $value.try_extract_tensor::<$ty>() {
            Ok((shape, data)) => {
                let shape: Vec<usize> = shape.iter().map(|&s| s as usize).collect();
                let arr = ArrayD::from_shape_vec(ndarray::IxDyn(&shape), data.to_vec())
                    .map_err(|e| InferenceError::OutputExtraction(e.to_string()))?;
                Some(OutputTensor::$variant(arr))
            }
            Err(_) => None,
        }
    };
}

impl OrtBackend {
    /// Compile a model held in memory for the given target.
    pub fn from_bytes(bytes: &[u8], target: Target) -> Result<Self> {
        debug!("Compiling ONNX model ({} bytes) for {}", bytes.len(), target);

        let builder = Session::builder().map_err(|e| InferenceError::SessionCreate(e.to_string()))?;

        let builder = match target {
            Target::Cpu => builder,
            Target::Xnnpack => builder
                .with_execution_providers([XNNPACK::default().build()])
                .map_err(|e| InferenceError::SessionCreate(e.to_string()))?,
        };

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| InferenceError::SessionCreate(e.to_string()))?
            .with_intra_threads(4)
            .map_err(|e| InferenceError::SessionCreate(e.to_string()))?
            .commit_from_memory(bytes)
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|i| i.name().to_string())
            .collect();

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        debug!("Model inputs: {:?}", input_names);
        debug!("Model outputs: {:?}", output_names);

        Ok(Self {
            session: Mutex::new(session),
            input_names,
            output_names,
        })
    }

    fn convert_input(tensor: &InputTensor) -> Result<SessionInputValue<'static>> {
        match tensor {
            InputTensor::Float32(arr) => session_value!(arr),
            InputTensor::Float64(arr) => session_value!(arr),
            InputTensor::Int32(arr) => session_value!(arr),
            InputTensor::Int64(arr) => session_value!(arr),
            InputTensor::Uint8(arr) => session_value!(arr),
        }
    }
}

impl InferenceBackend for OrtBackend {
    fn run(&self, inputs: &[(&str, InputTensor)]) -> Result<Vec<(String, OutputTensor)>> {
        let ort_inputs: Vec<(&str, SessionInputValue<'static>)> = inputs
            .iter()
            .map(|(name, tensor)| Ok((*name, Self::convert_input(tensor)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::InferenceFailed(format!("failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort_inputs)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let mut results = Vec::with_capacity(outputs.len());

        for (name, value) in outputs.iter() {
            let tensor = extract_output!(value, f32, Float32)
                .or(extract_output!(value, i64, Int64))
                .or(extract_output!(value, i32, Int32))
                .or(extract_output!(value, f64, Float64))
                .or(extract_output!(value, u8, Uint8))
                .ok_or_else(|| {
                    InferenceError::OutputExtraction(format!("unsupported output type for '{}'", name))
                })?;

            results.push((name.to_string(), tensor));
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
