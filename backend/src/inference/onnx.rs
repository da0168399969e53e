//! ONNX backend running on `tract`.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use shared::ArtifactSummary;
use tract_onnx::prelude::*;

use super::artifact::{ArtifactFormat, ModelArtifact, finish_score};
use super::error::InferenceError;
use super::preprocess::{InputSize, PreprocessedTensor, TensorLayout};
use crate::config::ModelConfig;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

pub struct OnnxArtifact {
    runnable: RunnableModel,
    path: PathBuf,
    input_size: InputSize,
    layout: TensorLayout,
    apply_sigmoid: bool,
}

impl OnnxArtifact {
    pub fn load(config: &ModelConfig) -> Result<Self, InferenceError> {
        let path = config.path.as_path();
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| InferenceError::artifact_load(path, format!("unreadable ONNX graph: {e}")))?;

        let declared = declared_input_dims(&model);
        debug!("ONNX graph {} declares input {:?}", path.display(), declared);
        let (input_size, layout) = resolve_geometry(
            declared.as_deref(),
            config.input_size,
            config.layout,
        )
        .map_err(|reason| InferenceError::artifact_load(path, reason))?;

        let runnable = build_plan(model, layout.batch_shape(input_size))
            .map_err(|reason| InferenceError::artifact_load(path, reason))?;

        Ok(Self {
            runnable,
            path: path.to_path_buf(),
            input_size,
            layout,
            apply_sigmoid: config.apply_sigmoid,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn build_plan(model: InferenceModel, shape: [usize; 4]) -> Result<RunnableModel, String> {
    model
        .with_input_fact(0, f32::fact(shape).into())
        .map_err(|e| format!("unable to fix input shape {shape:?}: {e}"))?
        .into_optimized()
        .map_err(|e| format!("unable to optimize graph: {e}"))?
        .into_runnable()
        .map_err(|e| format!("unable to make graph runnable: {e}"))
}

/// Input dimensions as declared in the graph; `None` entries are symbolic.
fn declared_input_dims(model: &InferenceModel) -> Option<Vec<Option<usize>>> {
    let typed = model.clone().into_typed().ok()?;
    let fact = typed.input_fact(0).ok()?;
    Some(
        fact.shape
            .iter()
            .map(|dim| dim.to_i64().ok().and_then(|v| usize::try_from(v).ok()))
            .collect(),
    )
}

/// Decides the input resolution and layout from the graph declaration and
/// any explicit configuration. Configuration wins when both are present.
pub(crate) fn resolve_geometry(
    declared: Option<&[Option<usize>]>,
    configured_size: Option<InputSize>,
    configured_layout: Option<TensorLayout>,
) -> Result<(InputSize, TensorLayout), String> {
    if let Some(dims) = declared {
        if dims.len() != 4 {
            return Err(format!(
                "expected a rank-4 image input, graph declares rank {}",
                dims.len()
            ));
        }
    }

    let layout = configured_layout.unwrap_or_else(|| match declared {
        Some([_, Some(3), _, _]) if !matches!(declared, Some([_, _, _, Some(3)])) => {
            TensorLayout::Nchw
        }
        _ => TensorLayout::Nhwc,
    });

    let declared_size = declared.and_then(|dims| {
        let (h, w) = match layout {
            TensorLayout::Nhwc => (dims[1], dims[2]),
            TensorLayout::Nchw => (dims[2], dims[3]),
        };
        match (h, w) {
            (Some(h), Some(w)) if h > 0 && w > 0 => Some(InputSize::new(w as u32, h as u32)),
            _ => None,
        }
    });

    let size = match (configured_size, declared_size) {
        (Some(configured), Some(declared)) if configured != declared => {
            warn!(
                "Configured input size {}x{} overrides the graph's {}x{}",
                configured.width, configured.height, declared.width, declared.height
            );
            configured
        }
        (Some(configured), _) => configured,
        (None, Some(declared)) => declared,
        (None, None) => {
            return Err(
                "graph does not declare a concrete input resolution; set model.input_size"
                    .to_string(),
            );
        }
    };

    if !size.is_valid() {
        return Err(format!(
            "input size must be positive, got {}x{}",
            size.width, size.height
        ));
    }
    Ok((size, layout))
}

impl ModelArtifact for OnnxArtifact {
    fn input_size(&self) -> InputSize {
        self.input_size
    }

    fn layout(&self) -> TensorLayout {
        self.layout
    }

    fn score(&self, tensor: &PreprocessedTensor) -> Result<f32, InferenceError> {
        let shape = self.layout.batch_shape(self.input_size);
        let data = tensor.to_layout_vec(self.layout);
        let input = Tensor::from_shape(&shape, &data)
            .map_err(|e| InferenceError::Model(format!("failed to build input tensor: {e}")))?;

        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .map_err(|e| InferenceError::Model(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::Model("model produced no outputs".to_string()))?;
        let values = output
            .as_slice::<f32>()
            .map_err(|e| InferenceError::Model(format!("unexpected output type: {e}")))?;

        match values {
            [raw] => Ok(finish_score(*raw, self.apply_sigmoid)),
            other => Err(InferenceError::Model(format!(
                "expected a single scalar output, got {} values",
                other.len()
            ))),
        }
    }

    fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            format: ArtifactFormat::Onnx.to_string(),
            path: self.path.display().to_string(),
            input_width: self.input_size.width,
            input_height: self.input_size.height,
            channels: 3,
            layout: self.layout.as_str().to_string(),
            apply_sigmoid: self.apply_sigmoid,
        }
    }
}
