// src/main.rs

use anyhow::Result;
use clap::Parser;
use hand_phase_analyzer::{detections, inference, Config, Driver, RunSummary};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Detect trial and sub-action phases from per-frame hand detections
#[derive(Parser, Debug)]
#[command(name = "hand-phase-analyzer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Directory of per-frame detection files (overrides input.labels_dir)
    #[arg(short, long)]
    labels: Option<String>,

    /// Directory of frame images (overrides input.images_dir)
    #[arg(short, long)]
    images: Option<String>,

    /// JSON file of precomputed action scores keyed by frame stem
    #[arg(long)]
    scores: Option<String>,

    /// ONNX action classifier
    #[arg(long)]
    model: Option<String>,

    /// Write annotated frames to this directory
    #[arg(long)]
    annotate_dir: Option<String>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(labels) = &self.labels {
            config.input.labels_dir = labels.clone();
        }
        if let Some(images) = &self.images {
            config.input.images_dir = images.clone();
        }
        if let Some(scores) = &self.scores {
            config.input.scores_path = Some(scores.clone());
        }
        if let Some(model) = &self.model {
            config.classifier.model_path = Some(model.clone());
        }
        if let Some(dir) = &self.annotate_dir {
            config.output.save_annotated = true;
            config.output.annotated_dir = dir.clone();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    cli.apply(&mut config);
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("✋ Hand Phase Analyzer Starting");
    info!("✓ Configuration loaded from {}", cli.config.display());
    info!(
        "Thresholds: poke>{:.2} pen>{:.2}, reach={:.2}, debounce={} frames",
        config.poke.score_threshold,
        config.pen.score_threshold,
        config.trajectory.reach_distance,
        config.gate.debounce_frames
    );

    let frames = detections::load_frames(&config.input)?;
    if frames.is_empty() {
        error!("No detection files found in {}", config.input.labels_dir);
        return Ok(());
    }
    info!("Found {} frame(s) to process", frames.len());

    let classifier = inference::build_classifier(&config)?;
    let mut driver = Driver::new(config, classifier)?;
    let summary = driver.run(&frames)?;

    print_summary(&summary);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    info!("\n========================================");
    info!("Run summary");
    info!("========================================");
    info!(
        "  Hands: dominant {}, non-dominant {}",
        summary.roles.dominant(),
        summary.roles.non_dominant()
    );
    info!(
        "  Frames: {} processed, {} skipped",
        summary.frames_processed, summary.frames_skipped
    );
    info!(
        "  🟢 Trials started: {}  🏁 ended: {}",
        summary.final_labels.start, summary.final_labels.end
    );
    for trial in &summary.trials {
        match (trial.end_frame, trial.duration_frames) {
            (Some(end), Some(duration)) => info!(
                "    #{}: frames {}..{} ({} frames)",
                trial.trial, trial.start_frame, end, duration
            ),
            _ => info!("    #{}: from frame {} (open)", trial.trial, trial.start_frame),
        }
    }
    info!(
        "  Final stages: poke={} pen={}",
        summary.final_labels.poke, summary.final_labels.pen
    );
    info!(
        "  ⏱️  Avg duration: {:.2} s, current: {:.2} s",
        summary.metrics.mean_duration_secs, summary.metrics.current_duration_secs
    );
    info!("  ✅ Success ratio: {:.0}%", summary.metrics.success_ratio);
    let counts = &summary.event_counts;
    info!(
        "  Events: {} pick-ups, {} armed, {} confirmed, {} skipped",
        counts.pick_ups, counts.actions_armed, counts.actions_confirmed, counts.frames_skipped
    );
    if summary.events_dropped > 0 {
        info!("  {} events counted but not kept in the log", summary.events_dropped);
    }
    if !summary.diagnostics.is_empty() {
        info!("  ⚠️  Skipped frames:");
        for d in &summary.diagnostics {
            info!("    {} ({}): {}", d.frame, d.stem, d.reason);
        }
    }
}
