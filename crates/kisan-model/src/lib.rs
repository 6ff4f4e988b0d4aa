//! # kisan-model
//!
//! Crop catalog plus the single-slot [`ModelStore`] that owns whichever crop
//! classifier is currently active.
//!
//! ## Features
//!
//! - Static [`CropCatalog`] of [`CropProfile`]s (artifact, input size,
//!   normalization, label table), overridable from JSON
//! - Backend-agnostic [`Classifier`] / [`ModelLoader`] traits
//! - [`TractLoader`]: pure-Rust ONNX backend built on `tract-onnx`
//! - [`ModelStore`]: at most one loaded model, release-before-load switching

use ndarray::Array3;
use std::path::PathBuf;
use thiserror::Error;

pub mod crop;
pub mod store;
pub mod tract;

pub use crop::{
    CropCatalog, CropCategory, CropId, CropProfile, Normalization, TensorLayout,
    DEFAULT_INPUT_SIZE,
};
pub use store::{LoadedModel, ModelState, ModelStore};
pub use tract::TractLoader;

/// Why a crop model could not be made active.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model artifact not found: {0}")]
    Missing(PathBuf),
    #[error("model artifact {path} could not be loaded: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("unsupported output shape {0:?}: expected [1, classes]")]
    UnsupportedShape(Vec<usize>),
}

/// Failure during a forward pass.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("no model is loaded")]
    NoModelLoaded,
    #[error("forward pass failed: {0}")]
    Backend(String),
    #[error("input tensor has shape {got:?}, model expects {expected:?}")]
    InputShape { expected: [usize; 3], got: Vec<usize> },
    #[error("model produced an empty output tensor")]
    EmptyOutput,
}

/// A runnable classification network.
///
/// Input is an (H, W, 3) tensor from the preprocessor; output is the flat
/// score vector of the first (and only) output tensor.
pub trait Classifier: Send {
    /// Declared output shape, `None` when the graph leaves it symbolic.
    fn output_shape(&self) -> Option<Vec<usize>>;

    fn forward(&self, input: &Array3<f32>) -> Result<Vec<f32>, InferenceError>;
}

/// Turns a [`CropProfile`] into a live [`Classifier`].
pub trait ModelLoader: Send {
    fn load(&self, profile: &CropProfile) -> Result<Box<dyn Classifier>, ModelLoadError>;
}
