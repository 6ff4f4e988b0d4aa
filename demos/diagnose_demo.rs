//! Leaf photo diagnosis demo
//!
//! Diagnoses every image matching the given glob patterns with one crop's
//! model and prints the screened remedies.
//!
//! Usage: cargo run --bin diagnose_demo -- --crop tomato "photos/*.jpg"

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use kisan_model::{CropCatalog, ModelStore, TractLoader};
use kisan_pipeline::{DiagnosisPipeline, DiagnosisResult, PipelineConfig};
use kisan_preprocess::Frame;
use kisan_remedy::{RemedyRuleEngine, SafetyFilter};
use log::{info, warn};
use std::path::PathBuf;

#[derive(Parser)]
struct CliArgs {
    /// JSON pipeline config; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Crop name or id ("tomato", "Cotton", ...); config default when omitted
    #[arg(long)]
    crop: Option<String>,

    /// Overrides the config's model directory
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Print each result as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Image paths or glob patterns
    #[arg(required = true)]
    images: Vec<String>,
}

fn crop_names(catalog: &CropCatalog) -> String {
    catalog.iter().map(|p| p.id.as_str()).collect::<Vec<_>>().join(", ")
}

fn print_summary(path: &str, result: &DiagnosisResult) {
    println!("📷 {path}");
    println!("   {} on {}: {:.1}%", result.disease, result.crop, result.confidence * 100.0);
    for (title, items) in [
        ("Chemical", &result.remedies.chemical),
        ("Organic", &result.remedies.organic),
        ("Traditional", &result.remedies.traditional),
    ] {
        if items.is_empty() {
            continue;
        }
        println!("   {title}:");
        for item in items {
            println!("     - {item}");
        }
    }
    for notice in &result.safety_notices {
        let status = if notice.redacted { "removed" } else { "kept, protective gear required" };
        println!("   ⚠️  {} ({status})", notice.substance);
        if let Some(gear) = &notice.warning.mandatory_gear {
            println!("      gear: {}", gear.join(", "));
        }
    }
    println!();
}

fn main() -> Result<()> {
    env_logger::init();
    let args = CliArgs::parse();

    // 1) Configuration
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = args.model_dir {
        config.model_dir = dir;
    }

    let catalog = config.load_catalog()?;
    let profile = match &args.crop {
        Some(name) => catalog.find(name).ok_or_else(|| {
            anyhow!("unknown crop '{name}', expected one of {}", crop_names(&catalog))
        })?,
        None => catalog
            .get(config.default_crop)
            .ok_or_else(|| anyhow!("catalog has no {} profile", config.default_crop))?,
    }
    .clone();
    info!("using {} model from {}", profile.display_name, config.model_dir.display());

    // 2) Pipeline
    let store = ModelStore::new(TractLoader::new(&config.model_dir));
    let safety = SafetyFilter::new(config.load_registry()?);
    let pipeline = DiagnosisPipeline::new(store, RemedyRuleEngine::new(), safety);

    // 3) Diagnose every matching image
    let mut seen = 0usize;
    let mut diagnosed = 0usize;
    for pattern in &args.images {
        for entry in glob::glob(pattern).with_context(|| format!("bad pattern {pattern}"))? {
            let path = entry?;
            seen += 1;
            let shown = path.display().to_string();

            let image = match image::open(&path) {
                Ok(img) => img,
                Err(e) => {
                    warn!("skipping {shown}: {e}");
                    continue;
                }
            };

            match pipeline.try_diagnose(&Frame::from(image), &profile) {
                Ok(result) if args.json => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    diagnosed += 1;
                }
                Ok(result) => {
                    print_summary(&shown, &result);
                    diagnosed += 1;
                }
                Err(e) => eprintln!("❌ {shown}: {e}"),
            }
        }
    }

    pipeline.release();
    if seen == 0 {
        return Err(anyhow!("no images matched"));
    }
    println!("Diagnosed {diagnosed}/{seen} images");
    Ok(())
}
