use kisan_infer::{InferenceRunner, UNKNOWN_LABEL};
use kisan_model::{
    Classifier, CropId, CropProfile, InferenceError, ModelLoadError, ModelLoader, ModelStore,
};
use ndarray::Array3;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Classifier that replays a fixed score vector.
struct Scripted {
    shape: Option<Vec<usize>>,
    scores: Vec<f32>,
}

impl Classifier for Scripted {
    fn output_shape(&self) -> Option<Vec<usize>> {
        self.shape.clone()
    }
    fn forward(&self, _input: &Array3<f32>) -> Result<Vec<f32>, InferenceError> {
        Ok(self.scores.clone())
    }
}

struct ScriptedLoader {
    shape: Option<Vec<usize>>,
    scores: Vec<f32>,
}

impl ModelLoader for ScriptedLoader {
    fn load(&self, _profile: &CropProfile) -> Result<Box<dyn Classifier>, ModelLoadError> {
        Ok(Box::new(Scripted { shape: self.shape.clone(), scores: self.scores.clone() }))
    }
}

fn run_once(shape: Option<Vec<usize>>, scores: Vec<f32>) -> (usize, f32, String) {
    let profile = CropProfile::builtin(CropId::Potato);
    let mut store = ModelStore::new(ScriptedLoader { shape, scores });
    store.ensure_loaded(&profile).unwrap();

    let runner = InferenceRunner::new(&profile.labels);
    let tensor = Array3::<f32>::zeros((224, 224, 3));
    let out = runner.run(store.model().unwrap(), &tensor).unwrap();
    (out.label_index, out.confidence, runner.label(out.label_index).to_string())
}

#[test]
fn potato_late_blight() {
    let (idx, conf, label) = run_once(Some(vec![1, 3]), vec![0.05, 0.9, 0.05]);
    assert_eq!(idx, 1);
    assert!((conf - 0.9).abs() < 1e-6);
    assert_eq!(label, "Late Blight");
}

#[test]
fn symbolic_shape_uses_label_table_size() {
    // Five scores but only three potato labels: the extra two are ignored.
    let (idx, _, label) = run_once(None, vec![0.1, 0.2, 0.3, 0.9, 0.9]);
    assert_eq!(idx, 2);
    assert_eq!(label, "Healthy");
}

#[test]
fn wider_model_than_label_table_maps_to_unknown() {
    let (idx, _, label) = run_once(Some(vec![1, 5]), vec![0.1, 0.2, 0.3, 0.9, 0.1]);
    assert_eq!(idx, 3);
    assert_eq!(label, UNKNOWN_LABEL);
}

#[test]
fn confidence_always_within_unit_interval() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let n = rng.gen_range(1..12);
        let scores: Vec<f32> = (0..n).map(|_| rng.gen_range(-50.0..50.0)).collect();
        let (_, conf, _) = run_once(Some(vec![1, n]), scores);
        assert!((0.0..=1.0).contains(&conf), "confidence {conf} out of range");
    }
}
