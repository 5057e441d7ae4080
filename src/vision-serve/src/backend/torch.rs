use std::io::Cursor;
use std::sync::Mutex;

use ndarray::Array4;
use tch::{CModule, Device, Kind, TchError, Tensor};

use super::{ImageModel, ModelBackend};
use crate::error::{InferenceError, InitError};

/// TorchScript modules executed by libtorch
pub struct TorchBackend;

struct TorchModel {
    // one forward pass at a time per module
    module: Mutex<CModule>,
}

impl ModelBackend for TorchBackend {
    fn model_suffix(&self) -> &'static str {
        "_jit.pth"
    }

    fn load(&self, name: &str, data: &[u8]) -> Result<Box<dyn ImageModel>, InitError> {
        let mut module = CModule::load_data_on_device(&mut Cursor::new(data), Device::Cpu)
            .map_err(|e| InitError::Model {
                name: name.to_owned(),
                reason: e.to_string(),
            })?;
        module.set_eval();

        Ok(Box::new(TorchModel {
            module: Mutex::new(module),
        }))
    }
}

impl ImageModel for TorchModel {
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let backend = |e: TchError| InferenceError::Backend(e.to_string());

        let pixels = input
            .as_slice()
            .ok_or_else(|| InferenceError::Backend("input tensor is not contiguous".into()))?;
        let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let tensor = Tensor::from_slice(pixels).view(dims.as_slice());

        let module = self
            .module
            .lock()
            .map_err(|_| InferenceError::Backend("model lock poisoned".into()))?;
        let output = tch::no_grad(|| module.forward_ts(&[tensor])).map_err(backend)?;
        let scores = output.to_kind(Kind::Float).flatten(0, -1);

        Vec::<f32>::try_from(&scores).map_err(backend)
    }
}
