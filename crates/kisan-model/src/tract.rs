// kisan-model/src/tract.rs
// ============================================================
// Tract backend: loads one crop's ONNX artifact, pins the input
// fact to the profile's resolution and layout, optimises, and
// runs single-image forward passes.
// ------------------------------------------------------------
// Pipeline: Array3<f32> (H,W,3) -> Tensor (1,H,W,3 | 1,3,H,W) -> Vec<f32>
// ============================================================

use crate::{
    Classifier, CropProfile, InferenceError, ModelLoadError, ModelLoader, TensorLayout,
};
use log::debug;
use ndarray::Array3;
use std::path::{Path, PathBuf};
use tract_onnx::prelude::*;

type Plan = RunnableModel<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Loads `<model_dir>/<profile.model_file>` with tract.
#[derive(Debug, Clone)]
pub struct TractLoader {
    model_dir: PathBuf,
}

impl TractLoader {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn artifact_path(&self, profile: &CropProfile) -> PathBuf {
        self.model_dir.join(&profile.model_file)
    }
}

impl ModelLoader for TractLoader {
    fn load(&self, profile: &CropProfile) -> Result<Box<dyn Classifier>, ModelLoadError> {
        let path = self.artifact_path(profile);
        if !path.is_file() {
            return Err(ModelLoadError::Missing(path));
        }
        debug!("loading {} with tract", path.display());

        let classifier = TractClassifier::from_path(&path, profile).map_err(|e| {
            ModelLoadError::Corrupt {
                path: path.clone(),
                reason: format!("{e:#}"),
            }
        })?;
        Ok(Box::new(classifier))
    }
}

/// An optimised, runnable tract plan for one crop.
pub struct TractClassifier {
    plan: Plan,
    input: [usize; 3],
    layout: TensorLayout,
    output_shape: Option<Vec<usize>>,
}

impl TractClassifier {
    fn from_path(path: &Path, profile: &CropProfile) -> TractResult<Self> {
        let h = profile.input_height as usize;
        let w = profile.input_width as usize;
        let input_shape = match profile.layout {
            TensorLayout::Nhwc => tvec![1, h, w, 3],
            TensorLayout::Nchw => tvec![1, 3, h, w],
        };

        let model = tract_onnx::onnx()
            .model_for_path(path)?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), input_shape))?
            .into_optimized()?;

        let output_shape = model
            .output_fact(0)?
            .shape
            .as_concrete()
            .map(|dims| dims.to_vec());

        Ok(Self {
            plan: model.into_runnable()?,
            input: [h, w, 3],
            layout: profile.layout,
            output_shape,
        })
    }

    fn to_tensor(&self, input: &Array3<f32>) -> Tensor {
        let [h, w, c] = self.input;
        match self.layout {
            TensorLayout::Nhwc => {
                tract_ndarray::Array4::from_shape_fn((1, h, w, c), |(_, y, x, ch)| {
                    input[(y, x, ch)]
                })
                .into_tensor()
            }
            TensorLayout::Nchw => {
                tract_ndarray::Array4::from_shape_fn((1, c, h, w), |(_, ch, y, x)| {
                    input[(y, x, ch)]
                })
                .into_tensor()
            }
        }
    }
}

impl Classifier for TractClassifier {
    fn output_shape(&self) -> Option<Vec<usize>> {
        self.output_shape.clone()
    }

    fn forward(&self, input: &Array3<f32>) -> Result<Vec<f32>, InferenceError> {
        if input.shape() != &self.input[..] {
            return Err(InferenceError::InputShape {
                expected: self.input,
                got: input.shape().to_vec(),
            });
        }

        let tensor = self.to_tensor(input);
        let outputs = self
            .plan
            .run(tvec![tensor.into()])
            .map_err(|e| InferenceError::Backend(format!("{e:#}")))?;

        let first = outputs.first().ok_or(InferenceError::EmptyOutput)?;
        let view = first
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::Backend(format!("{e:#}")))?;
        Ok(view.iter().copied().collect())
    }
}
