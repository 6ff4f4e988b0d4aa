//! Camera loop demo
//!
//! Feeds synthetic NV12 frames (or a still image, re-encoded every tick) at
//! camera rate into a `FrameSampler` and prints the diagnoses that make it
//! through the rate gate.
//!
//! Usage: cargo run --bin frame_loop_demo -- --crop potato --frames 90 --fps 30

use anyhow::{anyhow, Result};
use clap::Parser;
use image::RgbImage;
use kisan_model::{CropCatalog, TractLoader};
use kisan_pipeline::{DiagnosisPipeline, FrameSampler, PipelineConfig};
use kisan_preprocess::Frame;
use log::info;
use std::{
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

const CAMERA_WIDTH: u32 = 640;
const CAMERA_HEIGHT: u32 = 480;

#[derive(Parser)]
struct CliArgs {
    #[arg(long, default_value = "tomato")]
    crop: String,

    #[arg(long, default_value = "models")]
    model_dir: PathBuf,

    /// Frames produced by the fake camera
    #[arg(long, default_value = "90")]
    frames: usize,

    #[arg(long, default_value = "30")]
    fps: u32,

    /// Minimum gap between analysed frames
    #[arg(long, default_value = "333")]
    interval_ms: u64,

    /// Still image to replay instead of the synthetic gradient
    #[arg(long)]
    image: Option<PathBuf>,
}

/// Encode an RGB image as NV12 (BT.601 full range), the way a camera
/// would hand it over. Dimensions are assumed even.
fn rgb_to_nv12(img: &RgbImage) -> Vec<u8> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut out = vec![0u8; w * h * 3 / 2];
    let (y_plane, uv_plane) = out.split_at_mut(w * h);

    for (x, y, p) in img.enumerate_pixels() {
        let [r, g, b] = p.0.map(f32::from);
        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
        y_plane[y as usize * w + x as usize] = luma.round().clamp(0.0, 255.0) as u8;

        if x % 2 == 0 && y % 2 == 0 {
            let u = -0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0;
            let v = 0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0;
            let idx = (y as usize / 2) * w + x as usize;
            uv_plane[idx] = u.round().clamp(0.0, 255.0) as u8;
            uv_plane[idx + 1] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

fn synthetic_leaf(tick: usize) -> RgbImage {
    RgbImage::from_fn(CAMERA_WIDTH, CAMERA_HEIGHT, |x, y| {
        let shade = ((x + y + tick as u32) % 128) as u8;
        image::Rgb([shade / 2, 96 + shade, shade / 3])
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = CliArgs::parse();

    let catalog = CropCatalog::builtin();
    let profile = catalog
        .find(&args.crop)
        .ok_or_else(|| anyhow!("unknown crop '{}'", args.crop))?
        .clone();

    let config = PipelineConfig {
        model_dir: args.model_dir.clone(),
        min_frame_interval_ms: args.interval_ms,
        ..PipelineConfig::default()
    };

    let still = match &args.image {
        Some(path) => {
            let img = image::open(path)?.to_rgb8();
            Some(image::imageops::resize(
                &img,
                CAMERA_WIDTH,
                CAMERA_HEIGHT,
                image::imageops::FilterType::Triangle,
            ))
        }
        None => None,
    };

    println!("🌿 {} frame loop: {} frames at {} fps", profile.display_name, args.frames, args.fps);

    let pipeline = Arc::new(DiagnosisPipeline::with_loader(TractLoader::new(&config.model_dir)));
    let mut sampler =
        FrameSampler::spawn(pipeline.clone(), profile, config.min_frame_interval());

    let tick = Duration::from_secs_f64(1.0 / f64::from(args.fps.max(1)));
    let started = Instant::now();
    for i in 0..args.frames {
        let rgb = match &still {
            Some(img) => img.clone(),
            None => synthetic_leaf(i),
        };
        let frame = Frame::Nv12 {
            bytes: rgb_to_nv12(&rgb),
            width: CAMERA_WIDTH,
            height: CAMERA_HEIGHT,
        };
        sampler.submit(frame);

        while let Ok(result) = sampler.results().try_recv() {
            println!(
                "[{:>6.2}s] {} ({:.1}%)",
                started.elapsed().as_secs_f64(),
                result.disease,
                result.confidence * 100.0
            );
        }
        thread::sleep(tick);
    }

    let results = sampler.results().clone();
    let stats = sampler.stop();
    for result in results.try_iter() {
        println!("[ final ] {} ({:.1}%)", result.disease, result.confidence * 100.0);
    }

    info!("model state after stop: {:?}", pipeline.model_state());
    println!(
        "Done: {} accepted, {} throttled, {} replaced",
        stats.accepted, stats.throttled, stats.replaced
    );
    Ok(())
}
