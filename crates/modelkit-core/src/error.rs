//! Error types for the modelkit-core library.

use thiserror::Error;

/// Main error type for model wrappers.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The model description does not match any supported family.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// The input image cannot be turned into a model input.
    #[error("preprocessing failed: {0}")]
    Preprocess(String),

    /// Model outputs do not have the layout the family expects.
    #[error("postprocessing failed: {0}")]
    Postprocess(String),

    /// Invalid `model_info` or config file.
    #[error("configuration error: {0}")]
    Config(String),

    /// A reloaded model disagreed with the model it was serialized from.
    #[error("results differ after reload at {location}: {field} was {expected}, got {actual}")]
    EquivalenceViolation {
        location: String,
        field: String,
        expected: String,
        actual: String,
    },

    /// Error from the inference adapter.
    #[error("inference error: {0}")]
    Inference(#[from] modelkit_inference::InferenceError),

    /// Image decoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    pub(crate) fn mismatch(
        location: impl Into<String>,
        field: &str,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::EquivalenceViolation {
            location: location.into(),
            field: field.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Result type for the modelkit-core library.
pub type Result<T> = std::result::Result<T, ModelError>;
