// kisan-pipeline/src/sampler.rs
//
// producer ─submit─► [rate gate] ─► slot (depth 1, newest wins)
//          ─► worker thread ─diagnose─► results channel
//
// The slot never queues: a frame that arrives while the previous one is
// still waiting replaces it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use kisan_model::{CropProfile, ModelLoader};
use kisan_preprocess::Frame;
use log::{debug, error, info};

use crate::config::DEFAULT_MIN_FRAME_INTERVAL_MS;
use crate::{DiagnosisPipeline, DiagnosisResult};

// results waiting for the consumer before new ones are dropped
const RESULT_DEPTH: usize = 4;

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(DEFAULT_MIN_FRAME_INTERVAL_MS);

/// Counters for what happened to submitted frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub accepted: usize,
    /// Arrived within the minimum interval of the last accepted frame
    pub throttled: usize,
    /// Accepted, then displaced by a newer frame before the worker got to it
    pub replaced: usize,
}

pub struct FrameSampler {
    tx: Option<Sender<Frame>>,
    // producer-side handle on the slot, used to evict a stale frame
    slot: Receiver<Frame>,
    results: Receiver<DiagnosisResult>,
    worker: Option<JoinHandle<()>>,
    min_interval: Duration,
    last_accepted: Option<Instant>,
    stats: SamplerStats,
}

impl FrameSampler {
    /// Start a worker diagnosing frames with `profile`'s model.
    ///
    /// The worker releases the pipeline's model when it exits.
    pub fn spawn<L>(
        pipeline: Arc<DiagnosisPipeline<L>>,
        profile: CropProfile,
        min_interval: Duration,
    ) -> Self
    where
        L: ModelLoader + 'static,
    {
        let (tx, rx) = bounded::<Frame>(1);
        let (tx_out, results) = bounded::<DiagnosisResult>(RESULT_DEPTH);
        let slot = rx.clone();

        let worker = thread::spawn(move || sampler_thread(rx, tx_out, pipeline, profile));

        Self {
            tx: Some(tx),
            slot,
            results,
            worker: Some(worker),
            min_interval,
            last_accepted: None,
            stats: SamplerStats::default(),
        }
    }

    /// Offer a frame; `false` if it was throttled.
    pub fn submit(&mut self, frame: Frame) -> bool {
        self.submit_at(frame, Instant::now())
    }

    /// [`submit`](Self::submit) with an explicit arrival time.
    pub fn submit_at(&mut self, frame: Frame, now: Instant) -> bool {
        let Some(tx) = &self.tx else { return false };

        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.min_interval {
                self.stats.throttled += 1;
                return false;
            }
        }

        let frame = match tx.try_send(frame) {
            Ok(()) => None,
            Err(TrySendError::Full(frame)) => Some(frame),
            Err(TrySendError::Disconnected(_)) => return false,
        };

        if let Some(frame) = frame {
            // evict the waiting frame; the worker may have just taken it
            if self.slot.try_recv().is_ok() {
                self.stats.replaced += 1;
            }
            if tx.try_send(frame).is_err() {
                return false;
            }
        }

        self.last_accepted = Some(now);
        self.stats.accepted += 1;
        true
    }

    pub fn results(&self) -> &Receiver<DiagnosisResult> {
        &self.results
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// Stop the loop and release the model.
    ///
    /// A waiting frame is discarded; a diagnosis already running finishes
    /// first.
    pub fn stop(mut self) -> SamplerStats {
        self.shutdown();
        self.stats
    }

    fn shutdown(&mut self) {
        let Some(tx) = self.tx.take() else { return };
        while let Ok(_stale) = self.slot.try_recv() {}
        drop(tx);

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("frame sampler worker panicked");
            }
        }
        info!(
            "frame sampler stopped: {} accepted, {} throttled, {} replaced",
            self.stats.accepted, self.stats.throttled, self.stats.replaced
        );
    }
}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn sampler_thread<L: ModelLoader>(
    rx: Receiver<Frame>,
    tx_out: Sender<DiagnosisResult>,
    pipeline: Arc<DiagnosisPipeline<L>>,
    profile: CropProfile,
) {
    let mut consumer_gone = false;
    while let Ok(frame) = rx.recv() {
        let Some(result) = pipeline.diagnose(&frame, &profile) else { continue };
        if consumer_gone {
            continue;
        }
        match tx_out.try_send(result) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("result channel full, dropping diagnosis"),
            Err(TrySendError::Disconnected(_)) => {
                debug!("result consumer gone, discarding diagnoses");
                consumer_gone = true;
            }
        }
    }
    pipeline.release();
    debug!("sampler thread for {} shutting down", profile.id);
}
