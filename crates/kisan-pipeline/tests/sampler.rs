use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::{Rgb, RgbImage};
use kisan_model::{
    Classifier, CropId, CropProfile, InferenceError, ModelLoadError, ModelLoader, ModelState,
};
use kisan_pipeline::{DiagnosisPipeline, FrameSampler};
use kisan_preprocess::Frame;
use ndarray::Array3;

const WAIT: Duration = Duration::from_secs(5);

/// Blocks every forward pass until the test hands out a token.
/// Bright frames score "Late Blight", dark ones "Early Blight".
struct Gated {
    entered: Sender<()>,
    gate: Receiver<()>,
    live: Arc<AtomicUsize>,
}

impl Classifier for Gated {
    fn output_shape(&self) -> Option<Vec<usize>> {
        Some(vec![1, 3])
    }

    fn forward(&self, input: &Array3<f32>) -> Result<Vec<f32>, InferenceError> {
        let _ = self.entered.send(());
        self.gate
            .recv_timeout(WAIT)
            .map_err(|e| InferenceError::Backend(e.to_string()))?;
        let mean = input.mean().unwrap_or(0.0);
        Ok(if mean > 0.5 { vec![0.1, 0.8, 0.1] } else { vec![0.8, 0.1, 0.1] })
    }
}

impl Drop for Gated {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

struct GatedLoader {
    entered: Sender<()>,
    gate: Receiver<()>,
    live: Arc<AtomicUsize>,
}

impl ModelLoader for GatedLoader {
    fn load(&self, _profile: &CropProfile) -> Result<Box<dyn Classifier>, ModelLoadError> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Gated {
            entered: self.entered.clone(),
            gate: self.gate.clone(),
            live: self.live.clone(),
        }))
    }
}

fn frame(value: u8) -> Frame {
    Frame::from(RgbImage::from_pixel(16, 16, Rgb([value, value, value])))
}

#[test]
fn waiting_frame_is_replaced_by_the_newest() {
    let (entered_tx, entered) = unbounded();
    let (gate, gate_rx) = unbounded();
    let live = Arc::new(AtomicUsize::new(0));
    let loader = GatedLoader { entered: entered_tx, gate: gate_rx, live: live.clone() };

    let pipeline = Arc::new(DiagnosisPipeline::with_loader(loader));
    let profile = CropProfile::builtin(CropId::Potato).with_input_size(16, 16);
    let mut sampler =
        FrameSampler::spawn(pipeline.clone(), profile, Duration::from_millis(333));
    let results = sampler.results().clone();

    let t0 = Instant::now();
    assert!(sampler.submit_at(frame(0), t0));
    entered.recv_timeout(WAIT).expect("worker picked up the first frame");

    // worker is busy: the second frame waits, the third displaces it
    assert!(sampler.submit_at(frame(0), t0 + Duration::from_secs(1)));
    assert!(sampler.submit_at(frame(255), t0 + Duration::from_secs(2)));
    assert_eq!(sampler.stats().replaced, 1);

    gate.send(()).unwrap();
    let first = results.recv_timeout(WAIT).expect("first diagnosis");
    assert_eq!(first.disease, "Early Blight");

    entered.recv_timeout(WAIT).expect("worker picked up the newest frame");
    gate.send(()).unwrap();
    let second = results.recv_timeout(WAIT).expect("second diagnosis");
    assert_eq!(second.disease, "Late Blight");

    let stats = sampler.stop();
    assert_eq!(stats.accepted, 3);
    assert!(results.try_recv().is_err());

    // stop() releases the model
    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.model_state(), ModelState::Released);
}

#[test]
fn stop_discards_a_waiting_frame_and_finishes_the_running_one() {
    let (entered_tx, entered) = unbounded();
    let (gate, gate_rx) = unbounded();
    let live = Arc::new(AtomicUsize::new(0));
    let loader = GatedLoader { entered: entered_tx, gate: gate_rx, live: live.clone() };

    let pipeline = Arc::new(DiagnosisPipeline::with_loader(loader));
    let profile = CropProfile::builtin(CropId::Potato).with_input_size(16, 16);
    let mut sampler = FrameSampler::spawn(pipeline, profile, Duration::ZERO);
    let results = sampler.results().clone();

    assert!(sampler.submit(frame(0)));
    entered.recv_timeout(WAIT).expect("running");
    assert!(sampler.submit(frame(255)));

    // stop() evicts the waiting frame before it joins, then the running
    // diagnosis is let through; one token only
    let stopper = thread::spawn(move || sampler.stop());
    thread::sleep(Duration::from_millis(200));
    gate.send(()).unwrap();
    stopper.join().expect("stop returns");

    let done: Vec<_> = results.try_iter().collect();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].disease, "Early Blight");
    assert!(entered.try_recv().is_err());
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn unread_results_do_not_block_shutdown() {
    let (entered_tx, entered) = unbounded();
    let (gate, gate_rx) = unbounded();
    let live = Arc::new(AtomicUsize::new(0));
    let loader = GatedLoader { entered: entered_tx, gate: gate_rx, live: live.clone() };

    let pipeline = Arc::new(DiagnosisPipeline::with_loader(loader));
    let profile = CropProfile::builtin(CropId::Potato).with_input_size(16, 16);
    let mut sampler = FrameSampler::spawn(pipeline, profile, Duration::ZERO);

    for _ in 0..8 {
        gate.send(()).unwrap();
    }
    for _ in 0..8 {
        sampler.submit(frame(0));
        let _ = entered.recv_timeout(WAIT);
    }

    // nobody reads results; stop must still return
    drop(sampler);
    assert_eq!(live.load(Ordering::SeqCst), 0);
}
