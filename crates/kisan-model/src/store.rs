//! Single-slot model store
//!
//! The store owns zero or one [`LoadedModel`]. Switching crops always drops
//! the old model before the loader is asked for the new one, so two
//! classifiers are never resident at the same time, and a failed load
//! leaves the store empty rather than holding on to a stale model.

use std::thread;

use crate::{
    Classifier, CropId, CropProfile, InferenceError, ModelLoadError, ModelLoader, TensorLayout,
};
use log::{debug, info, warn};
use ndarray::Array3;

/// Lifecycle of the store's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Loaded,
    Released,
}

/// An active classifier plus what we know about its output tensor.
pub struct LoadedModel {
    crop: CropId,
    // what the graph was loaded for; a differing profile forces a reload
    model_file: String,
    input_size: (u32, u32),
    layout: TensorLayout,
    output_shape: Option<Vec<usize>>,
    classifier: Box<dyn Classifier>,
}

impl LoadedModel {
    pub fn crop(&self) -> CropId {
        self.crop
    }

    /// Loaded from the same artifact with the same input binding.
    pub fn serves(&self, profile: &CropProfile) -> bool {
        self.crop == profile.id
            && self.model_file == profile.model_file
            && self.input_size == (profile.input_width, profile.input_height)
            && self.layout == profile.layout
    }

    pub fn output_shape(&self) -> Option<&[usize]> {
        self.output_shape.as_deref()
    }

    pub fn forward(&self, input: &Array3<f32>) -> Result<Vec<f32>, InferenceError> {
        self.classifier.forward(input)
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("crop", &self.crop)
            .field("output_shape", &self.output_shape)
            .finish_non_exhaustive()
    }
}

/// Owns the loader and at most one live model.
pub struct ModelStore<L> {
    loader: L,
    slot: Option<LoadedModel>,
    state: ModelState,
}

impl<L: ModelLoader> ModelStore<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            slot: None,
            state: ModelState::Unloaded,
        }
    }

    /// Make `profile`'s model the active one.
    ///
    /// No-op when the active model was loaded for an equivalent profile
    /// (same crop, artifact, input size and layout). Otherwise the current
    /// model is released first, then the new artifact is loaded. A loader
    /// that panics leaves the store `Unloaded`.
    pub fn ensure_loaded(&mut self, profile: &CropProfile) -> Result<(), ModelLoadError> {
        if self.slot.as_ref().is_some_and(|m| m.serves(profile)) {
            debug!("{} model already active", profile.id);
            return Ok(());
        }

        self.release();
        self.state = ModelState::Loading;

        let guard = UnloadOnPanic(&mut self.state);
        let loaded = self
            .loader
            .load(profile)
            .and_then(|classifier| Self::admit(profile, classifier));
        drop(guard);

        match loaded {
            Ok(model) => {
                info!(
                    "loaded {} model {} (output shape {:?})",
                    profile.id, profile.model_file, model.output_shape
                );
                self.slot = Some(model);
                self.state = ModelState::Loaded;
                Ok(())
            }
            Err(e) => {
                warn!("failed to load {} model: {e}", profile.id);
                self.state = ModelState::Unloaded;
                Err(e)
            }
        }
    }

    /// Reject graphs whose declared output is batched or empty.
    fn admit(
        profile: &CropProfile,
        classifier: Box<dyn Classifier>,
    ) -> Result<LoadedModel, ModelLoadError> {
        let output_shape = classifier.output_shape();
        if let Some(shape) = &output_shape {
            let batched = shape.len() > 1 && shape[0] != 1;
            if batched || shape.contains(&0) {
                return Err(ModelLoadError::UnsupportedShape(shape.clone()));
            }
        }
        Ok(LoadedModel {
            crop: profile.id,
            model_file: profile.model_file.clone(),
            input_size: (profile.input_width, profile.input_height),
            layout: profile.layout,
            output_shape,
            classifier,
        })
    }

    /// Drop the active model, if any.
    pub fn release(&mut self) {
        if let Some(model) = self.slot.take() {
            info!("released {} model", model.crop);
            drop(model);
            self.state = ModelState::Released;
        }
    }

    pub fn current(&self) -> Option<CropId> {
        self.slot.as_ref().map(LoadedModel::crop)
    }

    /// Borrow the active model. The borrow ends before any switch can happen.
    pub fn model(&self) -> Option<&LoadedModel> {
        self.slot.as_ref()
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }
}

struct UnloadOnPanic<'a>(&'a mut ModelState);

impl Drop for UnloadOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            *self.0 = ModelState::Unloaded;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        shape: Option<Vec<usize>>,
        live: Arc<AtomicUsize>,
    }

    impl Classifier for Fixed {
        fn output_shape(&self) -> Option<Vec<usize>> {
            self.shape.clone()
        }
        fn forward(&self, _input: &Array3<f32>) -> Result<Vec<f32>, InferenceError> {
            Ok(vec![1.0])
        }
    }

    impl Drop for Fixed {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct Loader {
        shape: Option<Vec<usize>>,
        fail_for: Option<CropId>,
        loads: AtomicUsize,
        live: Arc<AtomicUsize>,
    }

    impl Loader {
        fn new(shape: Option<Vec<usize>>) -> Self {
            Self { shape, fail_for: None, loads: AtomicUsize::new(0), live: Arc::default() }
        }
    }

    impl ModelLoader for Loader {
        fn load(&self, profile: &CropProfile) -> Result<Box<dyn Classifier>, ModelLoadError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_for == Some(profile.id) {
                return Err(ModelLoadError::Missing(profile.model_file.clone().into()));
            }
            assert_eq!(self.live.fetch_add(1, Ordering::SeqCst), 0, "two models alive");
            Ok(Box::new(Fixed { shape: self.shape.clone(), live: self.live.clone() }))
        }
    }

    #[test]
    fn ensure_loaded_is_idempotent() {
        let mut store = ModelStore::new(Loader::new(Some(vec![1, 10])));
        let tomato = CropProfile::builtin(CropId::Tomato);

        store.ensure_loaded(&tomato).unwrap();
        store.ensure_loaded(&tomato).unwrap();

        assert_eq!(store.current(), Some(CropId::Tomato));
        assert_eq!(store.state(), ModelState::Loaded);
        assert_eq!(store.loader().loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn switching_releases_previous_model_first() {
        let mut store = ModelStore::new(Loader::new(Some(vec![1, 4])));
        for id in [CropId::Apple, CropId::Potato, CropId::Apple, CropId::Cotton] {
            store.ensure_loaded(&CropProfile::builtin(id)).unwrap();
            assert_eq!(store.current(), Some(id));
            assert_eq!(store.loader().live.load(Ordering::SeqCst), 1);
        }
        assert_eq!(store.loader().loads.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn failed_load_leaves_store_unloaded() {
        let mut loader = Loader::new(None);
        loader.fail_for = Some(CropId::Mango);
        let mut store = ModelStore::new(loader);

        store.ensure_loaded(&CropProfile::builtin(CropId::Guava)).unwrap();
        let err = store.ensure_loaded(&CropProfile::builtin(CropId::Mango)).unwrap_err();

        assert!(matches!(err, ModelLoadError::Missing(_)));
        assert_eq!(store.current(), None);
        assert_eq!(store.state(), ModelState::Unloaded);
        assert_eq!(store.loader().live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn batched_output_is_rejected() {
        let mut store = ModelStore::new(Loader::new(Some(vec![8, 10])));
        let err = store.ensure_loaded(&CropProfile::builtin(CropId::Tomato)).unwrap_err();
        assert!(matches!(err, ModelLoadError::UnsupportedShape(s) if s == vec![8, 10]));
        assert!(store.model().is_none());
        assert_eq!(store.loader().live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn changed_profile_for_the_same_crop_reloads() {
        let mut store = ModelStore::new(Loader::new(Some(vec![1, 4])));
        let apple = CropProfile::builtin(CropId::Apple);

        store.ensure_loaded(&apple).unwrap();
        store.ensure_loaded(&apple.clone().with_input_size(128, 128)).unwrap();
        assert_eq!(store.loader().loads.load(Ordering::SeqCst), 2);

        let mut renamed = apple.clone();
        renamed.model_file = "Apple_model_v2.onnx".to_string();
        store.ensure_loaded(&renamed).unwrap();
        store.ensure_loaded(&renamed).unwrap();
        assert_eq!(store.loader().loads.load(Ordering::SeqCst), 3);
        assert_eq!(store.loader().live.load(Ordering::SeqCst), 1);
    }

    struct Exploding;

    impl ModelLoader for Exploding {
        fn load(&self, _profile: &CropProfile) -> Result<Box<dyn Classifier>, ModelLoadError> {
            panic!("loader blew up");
        }
    }

    #[test]
    fn panicking_loader_leaves_store_unloaded() {
        let mut store = ModelStore::new(Exploding);
        let tomato = CropProfile::builtin(CropId::Tomato);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.ensure_loaded(&tomato)
        }));
        assert!(outcome.is_err());
        assert_eq!(store.state(), ModelState::Unloaded);
        assert!(store.model().is_none());
    }

    #[test]
    fn release_is_safe_when_empty() {
        let mut store = ModelStore::new(Loader::new(None));
        store.release();
        assert_eq!(store.state(), ModelState::Unloaded);

        store.ensure_loaded(&CropProfile::builtin(CropId::Apple)).unwrap();
        store.release();
        store.release();
        assert_eq!(store.state(), ModelState::Released);
        assert_eq!(store.current(), None);
        assert_eq!(store.loader().live.load(Ordering::SeqCst), 0);
    }
}
