//! Integration tests for kisan-model: catalog overrides feeding the store.

use kisan_model::{
    Classifier, CropCatalog, CropId, CropProfile, InferenceError, ModelLoadError, ModelLoader,
    ModelState, ModelStore, TensorLayout, TractLoader,
};
use ndarray::Array3;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

/// Records every artifact it is asked for.
struct Recording {
    requested: std::sync::Mutex<Vec<String>>,
    live: Arc<AtomicUsize>,
}

struct Probe {
    classes: usize,
    live: Arc<AtomicUsize>,
}

impl Classifier for Probe {
    fn output_shape(&self) -> Option<Vec<usize>> {
        Some(vec![1, self.classes])
    }
    fn forward(&self, _input: &Array3<f32>) -> Result<Vec<f32>, InferenceError> {
        Ok(vec![1.0 / self.classes as f32; self.classes])
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ModelLoader for Recording {
    fn load(&self, profile: &CropProfile) -> Result<Box<dyn Classifier>, ModelLoadError> {
        self.requested.lock().unwrap().push(profile.model_file.clone());
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Probe { classes: profile.labels.len(), live: self.live.clone() }))
    }
}

#[test]
fn overridden_profile_drives_the_loader() {
    let json = r#"{ "profiles": [ {
        "id": "guava",
        "display_name": "Guava",
        "model_file": "guava_int8.onnx",
        "input_width": 160,
        "input_height": 160,
        "layout": "nchw",
        "labels": ["Canker", "Rust", "Healthy"]
    } ] }"#;
    let catalog = CropCatalog::from_json_str(json).unwrap();
    let guava = catalog.get(CropId::Guava).unwrap();
    assert_eq!(guava.layout, TensorLayout::Nchw);

    let live = Arc::new(AtomicUsize::new(0));
    let loader = Recording { requested: Default::default(), live: live.clone() };
    let mut store = ModelStore::new(loader);

    store.ensure_loaded(guava).unwrap();
    assert_eq!(store.model().unwrap().output_shape(), Some(&[1, 3][..]));

    store.ensure_loaded(catalog.get(CropId::Apple).unwrap()).unwrap();
    assert_eq!(live.load(Ordering::SeqCst), 1);

    let requested = store.loader().requested.lock().unwrap().clone();
    assert_eq!(requested, vec!["guava_int8.onnx", "Apple_model_unquant.onnx"]);
}

#[test]
fn catalog_json_round_trip() {
    let catalog = CropCatalog::builtin();
    let json = catalog.to_json_string().unwrap();
    let back = CropCatalog::from_json_str(&json).unwrap();
    for id in CropId::ALL {
        assert_eq!(catalog.get(id), back.get(id));
    }
    assert_eq!(back.default_profile().unwrap().id, CropId::Tomato);
}

#[test]
fn tract_store_stays_unloaded_on_bad_artifacts() {
    let dir = tempdir().unwrap();
    let mut store = ModelStore::new(TractLoader::new(dir.path()));

    let cotton = CropProfile::builtin(CropId::Cotton);
    assert!(matches!(store.ensure_loaded(&cotton), Err(ModelLoadError::Missing(_))));
    assert_eq!(store.state(), ModelState::Unloaded);

    std::fs::write(dir.path().join(&cotton.model_file), vec![0u8; 64]).unwrap();
    assert!(matches!(store.ensure_loaded(&cotton), Err(ModelLoadError::Corrupt { .. })));
    assert_eq!(store.state(), ModelState::Unloaded);
    assert!(store.current().is_none());

    // nothing loaded, nothing to release
    store.release();
    assert_eq!(store.state(), ModelState::Unloaded);
}
