use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to load model artifact from {}: {reason}", .path.display())]
    ArtifactLoad { path: PathBuf, reason: String },
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Tensor shape {actual:?} does not match model input {expected:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },
    #[error("Model execution failed: {0}")]
    Model(String),
    #[error("Model produced score {0} outside [0, 1]")]
    ScoreOutOfRange(f32),
    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),
}

impl InferenceError {
    pub fn artifact_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        InferenceError::ArtifactLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the failure is caused by the submitted image rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            InferenceError::Decode(_) | InferenceError::ShapeMismatch { .. }
        )
    }
}

impl From<image::ImageError> for InferenceError {
    fn from(err: image::ImageError) -> Self {
        InferenceError::Decode(err.to_string())
    }
}
