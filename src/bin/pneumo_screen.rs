use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pneumo_detect::classification_runners::inference_process::InferenceProcess;
use pneumo_detect::common::{InferenceDevice, ModelConfig, DEFAULT_WEIGHTS_FILE};
use pneumo_detect::data::{FsAccess, HistoryLog, HistoryRecord};
use pneumo_detect::pipeline::ImageLoader;
use pneumo_detect::{init_screener, run_screening};

/// Classify a chest X-ray and write the explanation overlay.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Radiograph to screen (PNG, JPEG, ... or DICOM)
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// ONNX classifier; looked up in the per-user model cache when not found
    #[arg(long, value_name = "FILE", default_value = DEFAULT_WEIGHTS_FILE)]
    model: String,

    /// ONNX Runtime shared library
    #[arg(long, value_name = "FILE", default_value = "")]
    ort_lib: String,

    /// cpu, cuda[:id], tensorrt[:id] or coreml
    #[arg(long, default_value = "cpu")]
    device: String,

    /// Where to write the 512x512 overlay
    #[arg(long, value_name = "FILE", default_value = "overlay.png")]
    output: PathBuf,

    /// Append the result to this history file
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,

    /// Patient or case identifier recorded in the history
    #[arg(long, default_value = "anonymous")]
    case_id: String,

    /// Heatmap weight in the overlay (0.0 - 1.0)
    #[arg(long, default_value = "0.4")]
    alpha: f32,

    /// ONNX Runtime intra-op threads
    #[arg(long)]
    threads: Option<usize>,

    /// Grad-CAM target layer
    #[arg(long)]
    target_layer: Option<String>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Log per-stage timings
    #[arg(long)]
    profile: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .with_target(false)
        .init();

    let device = InferenceDevice::from_str(&args.device)
        .map_err(|e| anyhow::anyhow!("invalid --device `{}`: {e}", args.device))?;
    let weights = FsAccess::resolve_weights(&args.model);

    let mut config = ModelConfig::new(weights.to_string_lossy().to_string(), args.ort_lib.clone(), device)
        .with_blend_alpha(args.alpha);
    config.profile = args.profile;
    config.intra_threads = args.threads;
    if let Some(layer) = &args.target_layer {
        config = config.with_target_layer(layer);
    }

    let screener = init_screener(&config);

    let image = ImageLoader::from_path(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    let report = run_screening(&screener, &image)?;

    if args.profile {
        screener.engine().print_time();
    }

    report
        .overlay
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    if let Some(path) = &args.history {
        HistoryLog::new(path)
            .append(&HistoryRecord::from_report(&args.case_id, &report))
            .with_context(|| format!("failed to append to {}", path.display()))?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.summary())?);
    } else {
        println!(
            "{} ({:.2}%) | saliency: {} | overlay: {}",
            report.label(),
            report.confidence(),
            report.tier,
            args.output.display()
        );
    }

    Ok(())
}
