use std::fmt;
use std::path::Path;
use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};
use shared::ArtifactSummary;

use super::error::InferenceError;
use super::onnx::OnnxArtifact;
use super::preprocess::{InputSize, PreprocessedTensor, TensorLayout};
use crate::config::ModelConfig;

/// A trained classifier mapping one normalized image to a scalar in `[0, 1]`.
///
/// Implementations are immutable after loading and shared across request
/// handlers, hence `Send + Sync` and `&self` scoring.
pub trait ModelArtifact: Send + Sync {
    /// Spatial resolution the model was trained at.
    fn input_size(&self) -> InputSize;

    fn layout(&self) -> TensorLayout {
        TensorLayout::Nhwc
    }

    /// Runs the forward pass for a single image and returns the model's scalar output.
    fn score(&self, tensor: &PreprocessedTensor) -> Result<f32, InferenceError>;

    fn summary(&self) -> ArtifactSummary;

    /// `[height, width, channels]` of the tensor `score` accepts.
    fn input_shape(&self) -> [usize; 3] {
        let size = self.input_size();
        [size.height as usize, size.width as usize, 3]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Onnx,
    #[serde(alias = "torch")]
    Torchscript,
}

impl ArtifactFormat {
    /// Guesses the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, InferenceError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "onnx" => Ok(ArtifactFormat::Onnx),
            "pt" | "pth" | "ts" => Ok(ArtifactFormat::Torchscript),
            other => Err(InferenceError::artifact_load(
                path,
                format!("cannot infer model format from extension {other:?}; set model.format"),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactFormat::Onnx => "onnx",
            ArtifactFormat::Torchscript => "torchscript",
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loads the artifact at `path` with default model settings.
pub fn load(path: impl AsRef<Path>) -> Result<Arc<dyn ModelArtifact>, InferenceError> {
    let config = ModelConfig {
        path: path.as_ref().to_path_buf(),
        ..ModelConfig::default()
    };
    load_with(&config)
}

pub fn load_with(config: &ModelConfig) -> Result<Arc<dyn ModelArtifact>, InferenceError> {
    let path = config.path.as_path();
    if !path.exists() {
        return Err(InferenceError::artifact_load(path, "file does not exist"));
    }
    if !path.is_file() {
        return Err(InferenceError::artifact_load(path, "not a regular file"));
    }

    let format = match config.format {
        Some(format) => format,
        None => ArtifactFormat::from_path(path)?,
    };
    info!("Loading {} model artifact from {}", format, path.display());

    let artifact: Arc<dyn ModelArtifact> = match format {
        ArtifactFormat::Onnx => Arc::new(OnnxArtifact::load(config)?),
        ArtifactFormat::Torchscript => load_torchscript(config)?,
    };

    let size = artifact.input_size();
    info!(
        "Model artifact ready: {}x{} input, {} layout",
        size.width,
        size.height,
        artifact.layout().as_str()
    );
    Ok(artifact)
}

#[cfg(feature = "torch")]
fn load_torchscript(config: &ModelConfig) -> Result<Arc<dyn ModelArtifact>, InferenceError> {
    Ok(Arc::new(super::torch::TorchArtifact::load(config)?))
}

#[cfg(not(feature = "torch"))]
fn load_torchscript(config: &ModelConfig) -> Result<Arc<dyn ModelArtifact>, InferenceError> {
    Err(InferenceError::artifact_load(
        &config.path,
        "TorchScript artifacts need a build with the `torch` feature",
    ))
}

/// Maps a backend's raw output onto the probability the decision rule expects.
pub(crate) fn finish_score(raw: f32, apply_sigmoid: bool) -> f32 {
    if apply_sigmoid {
        1.0 / (1.0 + (-raw).exp())
    } else {
        raw
    }
}
