//! Re-attach the source audio to a video-only render.

use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use clipper_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{move_file, partial_path, remove_if_exists};
use crate::metrics;

/// Hard limit for a single mux run.
pub const MUX_TIMEOUT_SECS: u64 = 120;

/// Combine the video stream of `video_only` with the first audio stream of
/// `original` into `output`.
///
/// Both streams are copied and the result stops at the shorter of the two
/// tracks. When the output container cannot hold the source audio as-is,
/// the audio is encoded with the configured codec instead. A source without
/// audio yields an output without audio. `output` is only created once the
/// mux has fully succeeded, and an existing file there is left alone on
/// failure.
pub async fn mux_audio(
    video_only: &Path,
    original: &Path,
    output: &Path,
    encoding: &EncodingConfig,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    for input in [video_only, original] {
        if !input.is_file() {
            return Err(MediaError::mux(format!("input not found: {}", input.display())));
        }
    }

    debug!(
        video = %video_only.display(),
        audio = %original.display(),
        "Muxing audio"
    );

    let partial = partial_path(output);
    let copied = run_mux(runner, &mux_command(video_only, original, &partial, None)).await;
    let result = match copied {
        Err(MediaError::FfmpegFailed { stderr, .. }) => {
            warn!(
                "Source audio cannot be stream-copied, encoding with {}: {}",
                encoding.audio_codec,
                stderr.unwrap_or_default()
            );
            remove_if_exists(&partial).await;
            run_mux(runner, &mux_command(video_only, original, &partial, Some(encoding))).await
        }
        other => other,
    };

    if let Err(e) = result {
        remove_if_exists(&partial).await;
        return Err(match e {
            MediaError::Cancelled | MediaError::FfmpegNotFound => e,
            MediaError::FfmpegFailed { message, stderr, .. } => MediaError::mux(match stderr {
                Some(stderr) => format!("{}: {}", message, stderr),
                None => message,
            }),
            other => MediaError::mux(other.to_string()),
        });
    }

    if let Err(e) = move_file(&partial, output).await {
        remove_if_exists(&partial).await;
        return Err(MediaError::mux(format!("failed to finalize {}: {}", output.display(), e)));
    }

    info!("Muxed audio into {}", output.display());
    Ok(())
}

/// Mux arguments. `encode_audio` of `None` copies the audio stream.
fn mux_command(
    video_only: &Path,
    original: &Path,
    partial: &Path,
    encode_audio: Option<&EncodingConfig>,
) -> FfmpegCommand {
    let cmd = FfmpegCommand::new(video_only, partial)
        .add_input(original)
        .map("0:v:0")
        .map("1:a:0?")
        .video_codec("copy");

    let cmd = match encode_audio {
        Some(encoding) => cmd.output_args(encoding.audio_args()),
        None => cmd.audio_codec("copy"),
    };
    cmd.shortest().faststart()
}

async fn run_mux(runner: &FfmpegRunner, cmd: &FfmpegCommand) -> MediaResult<()> {
    let started = Instant::now();
    let result = runner.run(cmd).await;
    metrics::record_ffmpeg("mux", started.elapsed().as_secs_f64(), result.is_ok());
    result
}
