//! FFmpeg-only clip operations: segment extraction and static center crop.

use std::path::Path;
use std::time::Instant;
use tracing::info;

use clipper_models::{EncodingConfig, Highlight};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{ensure_parent_dir, move_file, partial_path, remove_if_exists};
use crate::metrics;

/// Cut `[start_secs, start_secs + duration)` out of `input`.
///
/// The segment is re-encoded so the cut is frame accurate, and written with
/// `+faststart`. `output` only appears once FFmpeg has succeeded.
pub async fn extract_segment(
    input: &Path,
    output: &Path,
    start_secs: f64,
    duration: f64,
    encoding: &EncodingConfig,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    if !(start_secs.is_finite() && start_secs >= 0.0) {
        return Err(MediaError::InvalidTimestamp(format!("start {} is not a valid offset", start_secs)));
    }
    if !(duration.is_finite() && duration > 0.0) {
        return Err(MediaError::InvalidTimestamp(format!("duration {} must be positive", duration)));
    }
    if !input.is_file() {
        return Err(MediaError::source_unreadable(input, "file not found"));
    }

    info!(
        "Extracting segment: {} -> {} (start: {:.2}s, duration: {:.2}s)",
        input.display(),
        output.display(),
        start_secs,
        duration
    );

    let partial = partial_path(output);
    let cmd = FfmpegCommand::new(input, &partial)
        .seek(start_secs)
        .duration(duration)
        .encoding(encoding)
        .faststart();

    run_to_output(runner, &cmd, &partial, output, "segment").await
}

/// Cut the span described by a highlight.
pub async fn extract_highlight(
    input: &Path,
    output: &Path,
    highlight: &Highlight,
    encoding: &EncodingConfig,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let (start, duration) = highlight.span()?;
    extract_segment(input, output, start, duration, encoding, runner).await
}

/// Static 9:16 center crop scaled to `width`x`height`, audio copied.
///
/// No face detection involved. Requires a source at least as wide as
/// 9/16 of its height.
pub async fn center_crop(
    input: &Path,
    output: &Path,
    width: u32,
    height: u32,
    encoding: &EncodingConfig,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    if !input.is_file() {
        return Err(MediaError::source_unreadable(input, "file not found"));
    }

    info!(
        "Center-cropping: {} -> {} ({}x{})",
        input.display(),
        output.display(),
        width,
        height
    );

    let partial = partial_path(output);
    let cmd = FfmpegCommand::new(input, &partial)
        .video_filter(center_crop_filter(width, height))
        .map("0:v:0")
        .map("0:a:0?")
        .output_args(encoding.video_args())
        .audio_codec("copy")
        .faststart();

    run_to_output(runner, &cmd, &partial, output, "center_crop").await
}

/// Filter graph for the static center crop.
pub fn center_crop_filter(width: u32, height: u32) -> String {
    format!("crop=ih*9/16:ih,scale={}:{},setsar=1", width, height)
}

/// Run `cmd` into `partial` and promote it to `output` on success.
async fn run_to_output(
    runner: &FfmpegRunner,
    cmd: &FfmpegCommand,
    partial: &Path,
    output: &Path,
    operation: &'static str,
) -> MediaResult<()> {
    ensure_parent_dir(output).await?;

    let started = Instant::now();
    let result = runner.run(cmd).await;
    metrics::record_ffmpeg(operation, started.elapsed().as_secs_f64(), result.is_ok());

    if let Err(e) = result {
        remove_if_exists(partial).await;
        return Err(e);
    }

    if let Err(e) = move_file(partial, output).await {
        remove_if_exists(partial).await;
        return Err(e);
    }

    info!("Wrote {}", output.display());
    Ok(())
}
