//! TorchScript backend on libtorch, compiled with the `torch` feature.

use std::path::PathBuf;
use std::sync::Mutex;

use shared::ArtifactSummary;
use tch::{CModule, Device, Kind, Tensor};

use super::artifact::{ArtifactFormat, ModelArtifact, finish_score};
use super::error::InferenceError;
use super::preprocess::{InputSize, PreprocessedTensor, TensorLayout};
use crate::config::ModelConfig;

pub struct TorchArtifact {
    // libtorch modules are not safe to run from several threads at once.
    module: Mutex<CModule>,
    device: Device,
    path: PathBuf,
    input_size: InputSize,
    layout: TensorLayout,
    apply_sigmoid: bool,
}

impl TorchArtifact {
    pub fn load(config: &ModelConfig) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let module = CModule::load_on_device(&config.path, device)
            .map_err(|e| InferenceError::artifact_load(&config.path, e))?;

        let input_size = config.input_size.unwrap_or_default();
        if !input_size.is_valid() {
            return Err(InferenceError::artifact_load(
                &config.path,
                format!(
                    "input size must be positive, got {}x{}",
                    input_size.width, input_size.height
                ),
            ));
        }

        Ok(Self {
            module: Mutex::new(module),
            device,
            path: config.path.clone(),
            input_size,
            layout: config.layout.unwrap_or(TensorLayout::Nchw),
            apply_sigmoid: config.apply_sigmoid,
        })
    }
}

impl ModelArtifact for TorchArtifact {
    fn input_size(&self) -> InputSize {
        self.input_size
    }

    fn layout(&self) -> TensorLayout {
        self.layout
    }

    fn score(&self, tensor: &PreprocessedTensor) -> Result<f32, InferenceError> {
        let shape: Vec<i64> = self
            .layout
            .batch_shape(self.input_size)
            .iter()
            .map(|&d| d as i64)
            .collect();
        let input = Tensor::from_slice(&tensor.to_layout_vec(self.layout))
            .f_view(shape.as_slice())
            .map_err(|e| InferenceError::Model(e.to_string()))?
            .to_device(self.device);

        let module = self
            .module
            .lock()
            .map_err(|_| InferenceError::Model("model lock poisoned".to_string()))?;
        let output = tch::no_grad(|| module.forward_ts(&[input]))
            .map_err(|e| InferenceError::Model(e.to_string()))?;

        let flat = output
            .f_to_kind(Kind::Float)
            .and_then(|t| t.f_view([-1i64]))
            .map_err(|e| InferenceError::Model(e.to_string()))?;
        let len = flat.size().first().copied().unwrap_or(0);
        if len != 1 {
            return Err(InferenceError::Model(format!(
                "expected a single scalar output, got {len} values"
            )));
        }
        let raw = flat
            .f_double_value(&[0])
            .map_err(|e| InferenceError::Model(e.to_string()))?;
        Ok(finish_score(raw as f32, self.apply_sigmoid))
    }

    fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            format: ArtifactFormat::Torchscript.to_string(),
            path: self.path.display().to_string(),
            input_width: self.input_size.width,
            input_height: self.input_size.height,
            channels: 3,
            layout: self.layout.as_str().to_string(),
            apply_sigmoid: self.apply_sigmoid,
        }
    }
}
