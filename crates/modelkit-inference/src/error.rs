//! Error types for the inference layer.

use thiserror::Error;

/// Errors raised while loading, running or serializing a compiled model.
#[derive(Error, Debug)]
pub enum InferenceError {
    /// The model description could not be parsed for the target.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// The backend refused to build a session for the model.
    #[error("failed to create session: {0}")]
    SessionCreate(String),

    /// The requested execution target is unknown or not compiled in.
    #[error("unsupported execution target: {0}")]
    UnsupportedTarget(String),

    /// An input tensor does not match the declared input contract.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Inference execution failed.
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    /// Output tensor extraction failed.
    #[error("failed to extract output: {0}")]
    OutputExtraction(String),

    /// The manifest next to the graph is malformed.
    #[error("invalid model manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// I/O error when reading or writing model files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
