use log::debug;
use ndarray::Array4;
use tract_onnx::prelude::*;

use super::{ImageModel, ModelBackend};
use crate::error::{InferenceError, InitError};
use crate::preprocess::CROP_SIZE;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// ONNX graphs executed by tract
pub struct OnnxBackend;

struct OnnxModel {
    plan: Plan,
}

impl ModelBackend for OnnxBackend {
    fn model_suffix(&self) -> &'static str {
        ".onnx"
    }

    fn load(&self, name: &str, data: &[u8]) -> Result<Box<dyn ImageModel>, InitError> {
        let side = CROP_SIZE as usize;
        let mut reader = data;

        let plan = tract_onnx::onnx()
            .model_for_read(&mut reader)
            .and_then(|model| {
                model.with_input_fact(
                    0,
                    InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
                )
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| InitError::Model {
                name: name.to_owned(),
                reason: format!("{:#}", e),
            })?;

        debug!("Optimized ONNX plan for {}", name);

        Ok(Box::new(OnnxModel { plan }))
    }
}

impl ImageModel for OnnxModel {
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let backend = |e: TractError| InferenceError::Backend(format!("{:#}", e));

        let tensor = tract_ndarray::Array::from_shape_vec(
            input.shape().to_vec(),
            input.iter().copied().collect(),
        )
        .map_err(|e| InferenceError::Backend(e.to_string()))?
        .into_tensor();

        let outputs = self.plan.run(tvec!(tensor.into())).map_err(backend)?;
        let scores = outputs
            .first()
            .ok_or(InferenceError::EmptyOutput)?
            .to_array_view::<f32>()
            .map_err(backend)?;

        Ok(scores.iter().copied().collect())
    }
}
