// kisan-pipeline/src/lib.rs
// ============================================================
// kisan-pipeline  –  one leaf photo in, one diagnosis out
// ------------------------------------------------------------
// Frame ─► ModelStore::ensure_loaded ─► Preprocessor
//       ─► InferenceRunner ─► RemedyRuleEngine ─► SafetyFilter
//       ─► DiagnosisResult
// ------------------------------------------------------------
// Public API
//   * DiagnosisPipeline::new(store, rules, safety)
//   * DiagnosisPipeline::diagnose(frame, profile)      – Option
//   * DiagnosisPipeline::try_diagnose(frame, profile)  – Result
//   * FrameSampler (sampler.rs)  – rate-limited frame loop
//   * PipelineConfig (config.rs) – JSON start-up config
// ============================================================

//! Kisan – diagnosis pipeline
//!
//! All collaborators are built by the caller and handed in. The model store
//! sits behind a mutex that is held for the whole load, preprocess and infer
//! sequence, so a crop switch can never interleave with a forward pass.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

use kisan_infer::{DecodedOutput, InferenceRunner};
use kisan_model::{
    CropId, CropProfile, InferenceError, ModelLoadError, ModelLoader, ModelState, ModelStore,
};
use kisan_preprocess::{Frame, PreprocessError, Preprocessor};
use kisan_remedy::{is_healthy, RemedyRecommendations, RemedyRuleEngine, SafetyFilter, SafetyNotice};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config;
pub mod sampler;

pub use config::{ConfigError, PipelineConfig};
pub use sampler::{FrameSampler, SamplerStats};

/// Why a diagnosis produced no result.
#[derive(Debug, Error)]
pub enum DiagnoseError {
    #[error("model load failed: {0}")]
    Load(#[from] ModelLoadError),
    #[error("preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
}

/// Everything the host needs to render one diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub disease: String,
    pub label_index: usize,
    /// In [0, 1]
    pub confidence: f32,
    pub crop: CropId,
    /// Chemical list already screened by the safety filter
    pub remedies: RemedyRecommendations,
    pub safety_notices: Vec<SafetyNotice>,
}

impl DiagnosisResult {
    pub fn is_healthy(&self) -> bool {
        is_healthy(&self.disease)
    }
}

pub struct DiagnosisPipeline<L> {
    store: Mutex<ModelStore<L>>,
    rules: RemedyRuleEngine,
    safety: SafetyFilter,
}

impl<L: ModelLoader> DiagnosisPipeline<L> {
    pub fn new(store: ModelStore<L>, rules: RemedyRuleEngine, safety: SafetyFilter) -> Self {
        Self { store: Mutex::new(store), rules, safety }
    }

    /// Default rules and the CIBRC 2025 filter around `loader`.
    pub fn with_loader(loader: L) -> Self {
        Self::new(ModelStore::new(loader), RemedyRuleEngine::new(), SafetyFilter::default())
    }

    /// Diagnose `frame` with `profile`'s model, `None` on any failure.
    ///
    /// Failures are logged once. The active model is kept when only the
    /// preprocessing or the forward pass failed.
    pub fn diagnose(&self, frame: &Frame, profile: &CropProfile) -> Option<DiagnosisResult> {
        match self.try_diagnose(frame, profile) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("{} diagnosis failed: {e}", profile.id);
                None
            }
        }
    }

    pub fn try_diagnose(
        &self,
        frame: &Frame,
        profile: &CropProfile,
    ) -> Result<DiagnosisResult, DiagnoseError> {
        // A panicking backend poisons the lock; the next call recovers it.
        let decoded = panic::catch_unwind(AssertUnwindSafe(|| self.classify(frame, profile)))
            .unwrap_or_else(|_| {
                Err(InferenceError::Backend("classifier panicked".to_string()).into())
            })?;

        let disease = InferenceRunner::new(&profile.labels)
            .label(decoded.label_index)
            .to_string();
        let remedies = self.rules.generate(&disease, profile.id);
        let (remedies, safety_notices) = self.safety.screen(&remedies, profile.id);

        info!(
            "{}: {} ({:.1}%), {} remedies, {} safety notices",
            profile.id,
            disease,
            decoded.confidence * 100.0,
            remedies.len(),
            safety_notices.len()
        );

        Ok(DiagnosisResult {
            disease,
            label_index: decoded.label_index,
            confidence: decoded.confidence,
            crop: profile.id,
            remedies,
            safety_notices,
        })
    }

    /// Drop the active model, if any.
    pub fn release(&self) {
        self.lock().release();
    }

    pub fn current_crop(&self) -> Option<CropId> {
        self.lock().current()
    }

    pub fn model_state(&self) -> ModelState {
        self.lock().state()
    }

    pub fn safety(&self) -> &SafetyFilter {
        &self.safety
    }

    // load + preprocess + forward, all under one lock
    fn classify(&self, frame: &Frame, profile: &CropProfile) -> Result<DecodedOutput, DiagnoseError> {
        let mut store = self.lock();
        store.ensure_loaded(profile)?;
        let tensor = Preprocessor::for_profile(profile).run(frame)?;
        let model = store.model().ok_or(InferenceError::NoModelLoaded)?;
        Ok(InferenceRunner::new(&profile.labels).run(model, &tensor)?)
    }

    fn lock(&self) -> MutexGuard<'_, ModelStore<L>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
