//! Image classification.

use image::DynamicImage;
use tracing::debug;

use modelkit_inference::OutputTensor;

use super::{family_model, find_output, ModelBase, ModelFamily};
use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::results::{Classification, ClassificationResult};
use crate::utils::{softmax, top_k};

/// Classifier with a single `[1, C]` score output.
#[derive(Debug)]
pub struct ClassificationModel {
    pub(super) base: ModelBase,
}

family_model!(ClassificationModel, ModelFamily::Classification);

impl ClassificationModel {
    /// Classify one image.
    pub fn infer(&self, image: &DynamicImage) -> Result<ClassificationResult> {
        let (outputs, _) = self.base.run(image)?;
        let result = decode(&outputs, &self.base.config)?;
        debug!("Top class: {:?}", result.top_labels.first());
        Ok(result)
    }
}

pub(crate) fn decode(outputs: &[(String, OutputTensor)], config: &ModelConfig) -> Result<ClassificationResult> {
    let output = find_output(outputs, "prob")
        .or_else(|| find_output(outputs, "logits"))
        .or_else(|| outputs.first().map(|(_, t)| t))
        .ok_or_else(|| ModelError::Postprocess("model produced no outputs".to_string()))?;

    let raw: Vec<f32> = output.to_f32().iter().cloned().collect();
    if raw.is_empty() {
        return Err(ModelError::Postprocess("empty classification output".to_string()));
    }

    let scores = if config.output_raw_scores {
        raw
    } else {
        softmax(&raw)
    };

    let top_labels = top_k(&scores, config.topk)
        .into_iter()
        .map(|id| Classification {
            id,
            label: config.label(id),
            score: scores[id],
        })
        .collect();

    Ok(ClassificationResult { top_labels })
}
