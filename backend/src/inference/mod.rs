pub mod artifact;
pub mod error;
pub mod onnx;
pub mod pipeline;
pub mod preprocess;
pub mod service;
#[cfg(feature = "torch")]
pub mod torch;

pub use artifact::{ArtifactFormat, ModelArtifact, load, load_with};
pub use error::InferenceError;
pub use pipeline::{Classification, InferencePipeline, REAL_THRESHOLD, decide, predict};
pub use preprocess::{
    InputSize, PreprocessConfig, PreprocessedTensor, ResizeFilter, TensorLayout, preprocess,
};
pub use service::{InferenceService, Outcome};
