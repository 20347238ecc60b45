//! Tensor types exchanged with the backends.

use ndarray::{ArrayD, IxDyn};

use crate::error::InferenceError;
use crate::Result;

/// Element types a tensor can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorType {
    Float32,
    Float64,
    Int32,
    Int64,
    Uint8,
}

/// Input tensor for inference.
#[derive(Debug, Clone)]
pub enum InputTensor {
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    Uint8(ArrayD<u8>),
}

impl InputTensor {
    /// Shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        match self {
            InputTensor::Float32(arr) => arr.shape(),
            InputTensor::Float64(arr) => arr.shape(),
            InputTensor::Int32(arr) => arr.shape(),
            InputTensor::Int64(arr) => arr.shape(),
            InputTensor::Uint8(arr) => arr.shape(),
        }
    }

    /// Element type of the tensor.
    pub fn dtype(&self) -> TensorType {
        match self {
            InputTensor::Float32(_) => TensorType::Float32,
            InputTensor::Float64(_) => TensorType::Float64,
            InputTensor::Int32(_) => TensorType::Int32,
            InputTensor::Int64(_) => TensorType::Int64,
            InputTensor::Uint8(_) => TensorType::Uint8,
        }
    }

    /// Build a Float32 tensor from raw data and shape.
    pub fn from_f32(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        ArrayD::from_shape_vec(IxDyn(shape), data)
            .map(InputTensor::Float32)
            .map_err(|e| InferenceError::InvalidInput(e.to_string()))
    }
}

/// Output tensor from inference.
#[derive(Debug, Clone)]
pub enum OutputTensor {
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    Uint8(ArrayD<u8>),
}

impl OutputTensor {
    /// Shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        match self {
            OutputTensor::Float32(arr) => arr.shape(),
            OutputTensor::Float64(arr) => arr.shape(),
            OutputTensor::Int32(arr) => arr.shape(),
            OutputTensor::Int64(arr) => arr.shape(),
            OutputTensor::Uint8(arr) => arr.shape(),
        }
    }

    /// Element type of the tensor.
    pub fn dtype(&self) -> TensorType {
        match self {
            OutputTensor::Float32(_) => TensorType::Float32,
            OutputTensor::Float64(_) => TensorType::Float64,
            OutputTensor::Int32(_) => TensorType::Int32,
            OutputTensor::Int64(_) => TensorType::Int64,
            OutputTensor::Uint8(_) => TensorType::Uint8,
        }
    }

    /// Borrow the inner array if the tensor holds `f32`.
    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            OutputTensor::Float32(arr) => Some(arr),
            _ => None,
        }
    }

    /// Borrow the inner array if the tensor holds `i64`.
    pub fn as_i64(&self) -> Option<&ArrayD<i64>> {
        match self {
            OutputTensor::Int64(arr) => Some(arr),
            _ => None,
        }
    }

    /// Copy the tensor into an `f32` array regardless of element type.
    ///
    /// Label tensors come out as `i64` from some exporters and as `f32` from
    /// others; decoders read both through this.
    pub fn to_f32(&self) -> ArrayD<f32> {
        match self {
            OutputTensor::Float32(arr) => arr.clone(),
            OutputTensor::Float64(arr) => arr.mapv(|v| v as f32),
            OutputTensor::Int32(arr) => arr.mapv(|v| v as f32),
            OutputTensor::Int64(arr) => arr.mapv(|v| v as f32),
            OutputTensor::Uint8(arr) => arr.mapv(f32::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_f32_rejects_bad_shape() {
        let err = InputTensor::from_f32(vec![0.0; 5], &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidInput(_)));

        let ok = InputTensor::from_f32(vec![0.0; 6], &[1, 2, 3]).unwrap();
        assert_eq!(ok.shape(), &[1, 2, 3]);
        assert_eq!(ok.dtype(), TensorType::Float32);
    }

    #[test]
    fn test_to_f32_converts_labels() {
        let labels = OutputTensor::Int64(ArrayD::from_shape_vec(IxDyn(&[3]), vec![1, 17, 3]).unwrap());
        assert!(labels.as_f32().is_none());
        assert_eq!(labels.to_f32().iter().cloned().collect::<Vec<_>>(), vec![1.0, 17.0, 3.0]);
    }
}
