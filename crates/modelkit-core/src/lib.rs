//! Model wrappers on top of the modelkit inference adapter.
//!
//! This crate provides:
//! - a closed set of model families (classification, SSD-style detection,
//!   Mask R-CNN-style instance segmentation) that turn adapter outputs into
//!   typed results
//! - model configuration read from the manifest's `model_info`
//! - the save/reload equivalence check used by the `modelkit-check` runner

pub mod config;
pub mod equivalence;
pub mod error;
pub mod models;
pub mod results;
pub mod utils;

pub use config::{ModelConfig, ResizeType};
pub use equivalence::{CheckConfig, CheckReport, EquivalenceChecker, ModelData};
pub use error::{ModelError, Result};
pub use models::{
    load_image, ClassificationModel, DetectionModel, MaskRcnnModel, Model, ModelFamily,
};
pub use results::{
    Classification, ClassificationResult, DetectedObject, DetectionResult, InferenceResult,
    InstanceSegmentationResult, Mask, SegmentedObject,
};

/// Re-export adapter types.
pub use modelkit_inference::{
    CompiledModel, InferenceAdapter, InferenceError, InputTensor, ModelFiles, OutputTensor, Target,
};
