use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use clipper_media::reframe::ReframeConfig;
use clipper_media::{
    center_crop, extract_segment, probe_video, FfmpegProgress, FfmpegRunner, ReframeOutcome, Reframer,
};
use clipper_models::{format_seconds, Highlight};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Args)]
pub struct ReframeArgs {
    /// Landscape source video
    pub input: PathBuf,

    /// Portrait output video
    pub output: PathBuf,

    /// Cut from this offset first (HH:MM:SS[.mmm], MM:SS or SS)
    #[arg(long, requires = "end")]
    pub start: Option<String>,

    /// End of the cut
    #[arg(long, requires = "start")]
    pub end: Option<String>,

    /// Output width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Output height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Run the face detector every N frames
    #[arg(long)]
    pub interval: Option<u32>,

    /// Per-frame smoothing weight in (0, 1]
    #[arg(long)]
    pub smoothing: Option<f64>,

    /// Seconds without a face before drifting back to center
    #[arg(long)]
    pub recenter_seconds: Option<f64>,

    /// Ignore faces smaller than this many pixels on either side
    #[arg(long)]
    pub min_face: Option<u32>,

    /// Haar cascade XML to load instead of searching the usual locations
    #[arg(long)]
    pub cascade: Option<PathBuf>,

    /// Static center crop, no face tracking (works without the opencv feature)
    #[arg(long)]
    pub center: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl ReframeArgs {
    /// Environment config with command-line overrides applied.
    fn config(&self) -> ReframeConfig {
        let mut config = ReframeConfig::from_env();
        if let Some(width) = self.width {
            config.output_width = width;
        }
        if let Some(height) = self.height {
            config.output_height = height;
        }
        if let Some(interval) = self.interval {
            config.detection_interval_frames = interval;
        }
        if let Some(smoothing) = self.smoothing {
            config.smoothing_factor = smoothing;
        }
        if let Some(seconds) = self.recenter_seconds {
            config.face_loss_recenter_seconds = seconds;
        }
        if let Some(min_face) = self.min_face {
            config.min_face_size = min_face;
        }
        if let Some(ref cascade) = self.cascade {
            config.cascade_path = Some(cascade.clone());
        }
        config
    }
}

pub async fn run(args: &ReframeArgs) -> Result<()> {
    let config = args.config();
    config.validate().context("invalid reframe settings")?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            let _ = cancel_tx.send(true);
        }
    });

    // Holds the cut segment until the reframe is done with it
    let mut segment_dir = None;
    let source = match (&args.start, &args.end) {
        (Some(start), Some(end)) => {
            let dir = tempfile::Builder::new().prefix(".clipper-").tempdir()?;
            let segment = dir.path().join("segment.mp4");
            let highlight = Highlight::new("cli", start.as_str(), end.as_str());
            let (start_secs, duration) = highlight.span().context("invalid --start/--end")?;

            info!(
                "Cutting {} - {} from {}",
                format_seconds(start_secs),
                format_seconds(start_secs + duration),
                args.input.display()
            );
            let bar = ffmpeg_bar("Cutting")?;
            let runner = runner_with_bar(cancel_rx.clone(), &bar, duration);
            let result =
                extract_segment(&args.input, &segment, start_secs, duration, &config.encoding, &runner).await;
            bar.finish_and_clear();
            result.context("failed to cut segment")?;

            segment_dir = Some(dir);
            segment
        }
        _ => args.input.clone(),
    };

    if args.center {
        let info = probe_video(&source)
            .await
            .with_context(|| format!("failed to probe {}", source.display()))?;
        let bar = ffmpeg_bar("Cropping")?;
        let runner = runner_with_bar(cancel_rx, &bar, info.duration);
        let result = center_crop(
            &source,
            &args.output,
            config.output_width,
            config.output_height,
            &config.encoding,
            &runner,
        )
        .await;
        bar.finish_and_clear();
        result.context("center crop failed")?;
        println!("Wrote {}", args.output.display());
        return Ok(());
    }

    let reframer = Reframer::new(config)
        .context("face detector unavailable (use --center, or build with --features opencv)")?;
    let outcome = track_and_reframe(reframer, &source, &args.output, cancel_rx).await?;
    drop(segment_dir);

    let Some(outcome) = outcome else {
        eprintln!("Cancelled, no output written");
        std::process::exit(130);
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_summary(&outcome);
    }

    Ok(())
}

async fn track_and_reframe(
    reframer: Reframer,
    source: &Path,
    output: &Path,
    cancel_rx: watch::Receiver<bool>,
) -> Result<Option<ReframeOutcome>> {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("  Reframing [{bar:40}] {pos}/{len} frames ({eta})")?
            .progress_chars("=> "),
    );

    let progress_bar = bar.clone();
    let result = reframer
        .with_cancel(cancel_rx)
        .with_progress(move |p| {
            progress_bar.set_length(p.total_frames.max(p.frames_processed));
            progress_bar.set_position(p.frames_processed);
        })
        .run(source, output)
        .await;
    bar.finish_and_clear();

    match result {
        Ok(outcome) => Ok(Some(outcome)),
        Err(e) if e.is_cancelled() => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to reframe {}", source.display())),
    }
}

/// Percentage bar for one FFmpeg pass.
fn ffmpeg_bar(label: &str) -> Result<ProgressBar> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(&format!("  {label} [{{bar:40}}] {{pos}}% {{msg}}"))?
            .progress_chars("=> "),
    );
    Ok(bar)
}

/// Runner whose FFmpeg progress over `total_secs` of media drives `bar`.
fn runner_with_bar(cancel_rx: watch::Receiver<bool>, bar: &ProgressBar, total_secs: f64) -> FfmpegRunner {
    let total_ms = (total_secs * 1000.0).round() as i64;
    let bar = bar.clone();
    FfmpegRunner::new()
        .with_cancel(cancel_rx)
        .with_progress(move |progress| update_bar(&bar, &progress, total_ms))
}

fn update_bar(bar: &ProgressBar, progress: &FfmpegProgress, total_ms: i64) {
    bar.set_position(progress.percentage(total_ms).round() as u64);
    if let Some(eta) = progress.eta_seconds(total_ms) {
        bar.set_message(format!("{:.0}s left", eta));
    }
}

fn print_summary(outcome: &ReframeOutcome) {
    println!("Output:      {}", outcome.output.display());
    println!("Frames:      {}/{}", outcome.frames_written, outcome.total_frames);
    println!(
        "Detections:  {} ({} with a face)",
        outcome.detections_run, outcome.samples_with_face
    );
    println!("Audio:       {}", if outcome.has_audio { "kept" } else { "none in source" });
    if outcome.truncated {
        println!("Warning:     source ended early, output is shorter than expected");
    }
    println!("Elapsed:     {:.1}s", outcome.elapsed.as_secs_f64());
}
