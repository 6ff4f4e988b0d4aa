// kisan-infer/src/lib.rs
// ============================================================
// kisan-infer  –  classification stage of the leaf pipeline
// Runs the active crop classifier on one preprocessed tensor
// and decodes the score vector into (label, confidence).
// ------------------------------------------------------------
// Pipeline: Array3<f32> → LoadedModel::forward → DecodedOutput
// ------------------------------------------------------------
// Public API
//   * InferenceRunner::new(labels)   – bind a crop's label table
//   * InferenceRunner::run(model, t) – forward pass + decode
//   * decode(scores, class_count)    – argmax + clamp, no model
// ============================================================

//! Kisan – inference layer
//!
//! The class count is read from the model's declared output shape on every
//! call. When the graph leaves that shape symbolic or degenerate, the size of
//! the crop's label table is used instead (see [`default_class_count`]).
//!
//! Confidence is the winning score clamped into `[0, 1]`. For classifiers
//! that end in a softmax this is the probability itself; for graphs that
//! emit raw logits the clamp is the *only* normalization applied, so the
//! value is an approximation, not a calibrated probability.

use kisan_model::{InferenceError, LoadedModel};
use kisan_preprocess::Tensor;
use log::debug;
use serde::{Deserialize, Serialize};

/// Label returned for indices outside the crop's label table.
pub const UNKNOWN_LABEL: &str = "Unknown";

pub type Result<T> = std::result::Result<T, InferenceError>;

/// Result of decoding one output tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedOutput {
    pub label_index: usize,
    /// Winning score clamped into [0, 1]
    pub confidence: f32,
    /// The first `class_count` scores exactly as the model produced them
    pub raw_scores: Vec<f32>,
}

/// Binds a crop's label table to forward-pass decoding.
#[derive(Debug, Clone, Copy)]
pub struct InferenceRunner<'a> {
    labels: &'a [String],
}

impl<'a> InferenceRunner<'a> {
    pub fn new(labels: &'a [String]) -> Self {
        Self { labels }
    }

    /// One synchronous forward pass, then decode.
    pub fn run(&self, model: &LoadedModel, tensor: &Tensor) -> Result<DecodedOutput> {
        let scores = model.forward(tensor)?;
        let classes = class_count(model.output_shape(), default_class_count(self.labels));
        let decoded = decode(scores, classes)?;
        debug!(
            "{} model -> index {} ({:.3}) over {} classes",
            model.crop(),
            decoded.label_index,
            decoded.confidence,
            decoded.raw_scores.len()
        );
        Ok(decoded)
    }

    /// Human-readable disease name, [`UNKNOWN_LABEL`] when out of range.
    pub fn label(&self, index: usize) -> &'a str {
        self.labels
            .get(index)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LABEL)
    }
}

/// Fallback class count: the label table size, never less than one.
pub fn default_class_count(labels: &[String]) -> usize {
    labels.len().max(1)
}

/// Class count from a `[1, N]` (or `[1, N, ...]`) output shape.
///
/// Rank below two or any zero dimension counts as degenerate.
pub fn class_count(shape: Option<&[usize]>, fallback: usize) -> usize {
    match shape {
        Some(dims) if dims.len() >= 2 => {
            let n: usize = dims[1..].iter().product();
            if n == 0 { fallback } else { n }
        }
        _ => fallback,
    }
}

/// Arg-max over the first `class_count` scores.
///
/// Ties go to the lowest index and NaN never wins. The confidence is clamped
/// into [0, 1] whatever the scores are (probabilities or logits).
pub fn decode(mut scores: Vec<f32>, class_count: usize) -> Result<DecodedOutput> {
    scores.truncate(class_count);
    if scores.is_empty() {
        return Err(InferenceError::EmptyOutput);
    }

    let mut best: Option<(usize, f32)> = None;
    for (i, &s) in scores.iter().enumerate() {
        if s.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }

    let (label_index, top) = best.unwrap_or((0, 0.0));
    Ok(DecodedOutput {
        label_index,
        confidence: top.clamp(0.0, 1.0),
        raw_scores: scores,
    })
}
