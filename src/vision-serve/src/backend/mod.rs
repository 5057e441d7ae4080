//! Inference runtimes able to execute the archived model on CPU.

use ndarray::Array4;

use crate::config::ModelFormat;
use crate::error::{InferenceError, InitError};

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "torch")]
mod torch;

#[cfg(feature = "onnx")]
pub use onnx::OnnxBackend;
#[cfg(feature = "torch")]
pub use torch::TorchBackend;

/// A loaded, evaluation-mode model
pub trait ImageModel: Send + Sync {
    /// Run one forward pass and return the raw score of every class
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;
}

/// Deserializes one model format
pub trait ModelBackend: Send + Sync {
    /// File name suffix identifying the model member of an archive
    fn model_suffix(&self) -> &'static str;

    fn load(&self, name: &str, data: &[u8]) -> Result<Box<dyn ImageModel>, InitError>;
}

pub fn backend_for(format: ModelFormat) -> Result<Box<dyn ModelBackend>, InitError> {
    match format {
        #[cfg(feature = "onnx")]
        ModelFormat::Onnx => Ok(Box::new(OnnxBackend)),
        #[cfg(feature = "torch")]
        ModelFormat::Torchscript => Ok(Box::new(TorchBackend)),
        #[allow(unreachable_patterns)]
        other => Err(InitError::BackendUnavailable(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "onnx")]
    #[test]
    fn onnx_backend_matches_onnx_members() {
        let backend = backend_for(ModelFormat::Onnx).unwrap();

        assert_eq!(backend.model_suffix(), ".onnx");
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn onnx_backend_rejects_garbage() {
        let backend = backend_for(ModelFormat::Onnx).unwrap();

        let err = backend.load("model.onnx", b"definitely not protobuf").err();

        assert!(matches!(err, Some(InitError::Model { .. })));
    }

    #[cfg(not(feature = "torch"))]
    #[test]
    fn torchscript_needs_the_torch_feature() {
        let err = backend_for(ModelFormat::Torchscript).err();

        assert!(matches!(
            err,
            Some(InitError::BackendUnavailable(ModelFormat::Torchscript))
        ));
    }
}
