use std::sync::Arc;

use shared::{Label, PredictionResult};

use super::artifact::ModelArtifact;
use super::error::InferenceError;
use super::preprocess::{InputSize, PreprocessConfig, PreprocessedTensor, preprocess_with};

/// Scores at or above this are labelled "Real".
pub const REAL_THRESHOLD: f32 = 0.5;

/// Maps the model's sigmoid output to a label and the percentage supporting it.
pub fn decide(confidence: f32) -> PredictionResult {
    if confidence >= REAL_THRESHOLD {
        PredictionResult {
            label: Label::Real,
            confidence_percent: confidence * 100.0,
        }
    } else {
        PredictionResult {
            label: Label::AiGenerated,
            confidence_percent: (1.0 - confidence) * 100.0,
        }
    }
}

/// Runs `artifact` on `tensor` and applies the decision rule.
pub fn predict(
    artifact: &dyn ModelArtifact,
    tensor: &PreprocessedTensor,
) -> Result<PredictionResult, InferenceError> {
    score(artifact, tensor).map(decide)
}

fn score(artifact: &dyn ModelArtifact, tensor: &PreprocessedTensor) -> Result<f32, InferenceError> {
    let expected = artifact.input_shape();
    let actual = tensor.shape();
    if expected != actual {
        return Err(InferenceError::ShapeMismatch { expected, actual });
    }

    let score = artifact.score(tensor)?;
    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(InferenceError::ScoreOutOfRange(score));
    }
    Ok(score)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub score: f32,
    pub result: PredictionResult,
}

/// Image bytes in, label out. Cheap to clone; the artifact is shared.
#[derive(Clone)]
pub struct InferencePipeline {
    artifact: Arc<dyn ModelArtifact>,
    preprocessing: PreprocessConfig,
}

impl InferencePipeline {
    pub fn new(artifact: Arc<dyn ModelArtifact>) -> Self {
        Self {
            artifact,
            preprocessing: PreprocessConfig::default(),
        }
    }

    pub fn with_preprocessing(mut self, preprocessing: PreprocessConfig) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    pub fn artifact(&self) -> &dyn ModelArtifact {
        self.artifact.as_ref()
    }

    pub fn input_size(&self) -> InputSize {
        self.artifact.input_size()
    }

    pub fn preprocess(&self, image_bytes: &[u8]) -> Result<PreprocessedTensor, InferenceError> {
        preprocess_with(image_bytes, self.input_size(), &self.preprocessing)
    }

    pub fn score(&self, tensor: &PreprocessedTensor) -> Result<f32, InferenceError> {
        score(self.artifact.as_ref(), tensor)
    }

    pub fn predict(&self, tensor: &PreprocessedTensor) -> Result<PredictionResult, InferenceError> {
        predict(self.artifact.as_ref(), tensor)
    }

    pub fn classify(&self, image_bytes: &[u8]) -> Result<Classification, InferenceError> {
        let tensor = self.preprocess(image_bytes)?;
        let score = self.score(&tensor)?;
        Ok(Classification {
            score,
            result: decide(score),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::preprocess::TensorLayout;
    use ndarray::Array3;
    use shared::ArtifactSummary;

    struct Constant(f32);

    impl ModelArtifact for Constant {
        fn input_size(&self) -> InputSize {
            InputSize::square(4)
        }

        fn score(&self, _tensor: &PreprocessedTensor) -> Result<f32, InferenceError> {
            Ok(self.0)
        }

        fn summary(&self) -> ArtifactSummary {
            ArtifactSummary {
                format: "constant".into(),
                path: String::new(),
                input_width: 4,
                input_height: 4,
                channels: 3,
                layout: TensorLayout::Nhwc.as_str().into(),
                apply_sigmoid: false,
            }
        }
    }

    fn tensor(h: usize, w: usize) -> PreprocessedTensor {
        PreprocessedTensor::from_array(Array3::zeros((h, w, 3)))
    }

    #[test]
    fn test_threshold_is_inclusive_on_real_side() {
        let result = decide(0.5);
        assert_eq!(result.label, Label::Real);
        assert_eq!(result.confidence_percent, 50.0);

        let result = decide(0.499_999_97);
        assert_eq!(result.label, Label::AiGenerated);
    }

    #[test]
    fn test_reported_confidence_supports_chosen_label() {
        for i in 0..=100 {
            let c = i as f32 / 100.0;
            let result = decide(c);
            match result.label {
                Label::Real => {
                    assert!(c >= 0.5);
                    assert_eq!(result.confidence_percent, c * 100.0);
                }
                Label::AiGenerated => {
                    assert!(c < 0.5);
                    assert_eq!(result.confidence_percent, (1.0 - c) * 100.0);
                }
            }
            assert!((50.0..=100.0).contains(&result.confidence_percent));
        }
    }

    #[test]
    fn test_extremes() {
        assert_eq!(
            decide(1.0),
            PredictionResult {
                label: Label::Real,
                confidence_percent: 100.0
            }
        );
        assert_eq!(
            decide(0.0),
            PredictionResult {
                label: Label::AiGenerated,
                confidence_percent: 100.0
            }
        );
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let err = predict(&Constant(0.9), &tensor(5, 4)).unwrap_err();
        match err {
            InferenceError::ShapeMismatch { expected, actual } => {
                assert_eq!(expected, [4, 4, 3]);
                assert_eq!(actual, [5, 4, 3]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_scores_are_rejected() {
        for bad in [f32::NAN, f32::INFINITY, -0.1, 1.5] {
            let err = predict(&Constant(bad), &tensor(4, 4)).unwrap_err();
            assert!(matches!(err, InferenceError::ScoreOutOfRange(_)));
        }
    }

    #[test]
    fn test_pipeline_predict_uses_artifact() {
        let pipeline = InferencePipeline::new(Arc::new(Constant(0.7)));
        let result = pipeline.predict(&tensor(4, 4)).unwrap();
        assert_eq!(result.label, Label::Real);
        assert_eq!(format!("{:.2}", result.confidence_percent), "70.00");
        assert_eq!(pipeline.input_size(), InputSize::square(4));
    }
}
