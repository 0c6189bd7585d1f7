//! Face-tracking landscape-to-portrait reframing.
//!
//! # Pipeline
//!
//! ```text
//! FrameSource -> [every Nth frame] FaceLocator -> CenterTracker
//!             -> CropPlanner -> FrameCompositor -> FrameSink
//!             -> (end of stream) mux_audio
//! ```
//!
//! Frames are processed strictly in order because the tracker's state is a
//! function of the whole frame history. The decode/detect/encode loop runs
//! on a blocking thread; probing and muxing are async.
//!
//! All intermediates live in a temporary directory next to the output and
//! the output path is only written by the final atomic rename, so a failed
//! or cancelled run never leaves a file behind.

pub mod compositor;
pub mod config;
pub mod crop_planner;
pub mod detector;
pub mod haar;
pub mod models;
pub mod sink;
pub mod source;
pub mod tracker;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

pub use compositor::FrameCompositor;
pub use config::{ReframeConfig, PORTRAIT_HEIGHT, PORTRAIT_WIDTH};
pub use crop_planner::{plan_crop, CropPlanner};
pub use detector::{filter_faces, largest_face, FaceLocator};
pub use haar::{find_cascade_path, is_detection_available, HaarCascadeLocator};
pub use models::{AspectRatio, BoundingBox, CropWindow, Frame, StreamMetadata, TrackerState};
pub use sink::{FfmpegFrameSink, FrameSink, RecordingSink};
pub use source::{FfmpegFrameSource, FrameSource, VecFrameSource};
pub use tracker::CenterTracker;

use crate::command::FfmpegRunner;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::ensure_parent_dir;
use crate::metrics;
use crate::mux::{mux_audio, MUX_TIMEOUT_SECS};
use crate::probe::probe_video;
use crate::progress::{ReframeProgress, ReframeProgressCallback};

/// Summary of a finished reframing run.
#[derive(Debug, Clone, Serialize)]
pub struct ReframeOutcome {
    /// Final output file
    pub output: PathBuf,
    /// Frames encoded into the output
    pub frames_written: u64,
    /// Frame count reported by the source container
    pub total_frames: u64,
    /// Detector invocations
    pub detections_run: u64,
    /// Detector invocations that found a usable face
    pub samples_with_face: u64,
    /// Whether the source had an audio track to carry over
    pub has_audio: bool,
    /// Whether decoding stopped early on a corrupt tail
    pub truncated: bool,
    /// Wall-clock time of the run
    pub elapsed: Duration,
}

/// Per-frame decision chain: decimated detection, tracking, planning and
/// compositing. Holds all per-run state; nothing is shared between runs.
pub struct FramePipeline<L> {
    locator: L,
    tracker: CenterTracker,
    planner: CropPlanner,
    compositor: FrameCompositor,
    min_face_size: u32,
    detections_run: u64,
    samples_with_face: u64,
}

impl<L: FaceLocator> FramePipeline<L> {
    pub fn new(metadata: &StreamMetadata, config: &ReframeConfig, locator: L) -> Self {
        let planner = CropPlanner::new(metadata.width, metadata.height);
        if planner.is_degenerate() {
            warn!(
                "Source {}x{} is narrower than 9:16, keeping full width and letterboxing",
                metadata.width, metadata.height
            );
        }

        Self {
            locator,
            tracker: CenterTracker::new(metadata, config),
            planner,
            compositor: FrameCompositor::new(config.output_width, config.output_height),
            min_face_size: config.min_face_size,
            detections_run: 0,
            samples_with_face: 0,
        }
    }

    /// Decide the crop window for `frame`, running the detector if this is a
    /// sampled frame.
    pub fn plan(&mut self, frame: &Frame) -> MediaResult<CropWindow> {
        if self.tracker.is_sample_frame(frame.index) {
            let faces = self.locator.detect(frame)?;
            let faces = filter_faces(faces, self.min_face_size, frame.width(), frame.height());
            let face = largest_face(&faces);

            self.detections_run += 1;
            if face.is_some() {
                self.samples_with_face += 1;
            }
            debug!(
                frame = frame.index,
                faces = faces.len(),
                center = ?face.map(|f| f.cx()),
                "{} detection sample",
                self.locator.name()
            );

            self.tracker.observe(face);
        }

        let center = self.tracker.advance();
        Ok(self.planner.plan(center))
    }

    /// Plan and composite one frame.
    pub fn process(&mut self, frame: Frame) -> MediaResult<(CropWindow, Frame)> {
        let window = self.plan(&frame)?;
        Ok((window, self.compositor.apply(frame, window)))
    }

    pub fn tracker_state(&self) -> TrackerState {
        self.tracker.state()
    }

    pub fn detections_run(&self) -> u64 {
        self.detections_run
    }

    pub fn samples_with_face(&self) -> u64 {
        self.samples_with_face
    }
}

/// Counters from one pass of [`run_frame_loop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameLoopStats {
    pub frames_written: u64,
    pub detections_run: u64,
    pub samples_with_face: u64,
    pub truncated: bool,
}

/// Drive frames from `source` through `pipeline` into `sink`.
///
/// A decode error after at least one frame ends the stream early and the run
/// keeps what it has; a decode error before any frame, or an empty source,
/// fails. Every other error is returned as-is. The sink is only closed on
/// success; on error the caller drops it.
pub fn run_frame_loop<S, L, K>(
    source: &mut S,
    pipeline: &mut FramePipeline<L>,
    sink: &mut K,
    cancel: Option<&watch::Receiver<bool>>,
    progress: Option<&ReframeProgressCallback>,
    progress_interval: u64,
) -> MediaResult<FrameLoopStats>
where
    S: FrameSource + ?Sized,
    L: FaceLocator,
    K: FrameSink + ?Sized,
{
    let total_frames = source.metadata().frame_count;
    let mut frames_written = 0u64;
    let mut truncated = false;

    loop {
        if cancel.is_some_and(|rx| *rx.borrow()) {
            info!(frame = frames_written, "Cancellation requested, stopping frame loop");
            return Err(MediaError::Cancelled);
        }

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e @ MediaError::DecodeError { .. }) if frames_written > 0 => {
                warn!(
                    frame = frames_written,
                    total_frames,
                    "Decode stopped early, keeping frames produced so far: {}",
                    e
                );
                truncated = true;
                break;
            }
            Err(e) => return Err(e),
        };

        let (_, composed) = pipeline.process(frame)?;
        sink.write(composed)?;
        frames_written += 1;

        if let Some(callback) = progress {
            callback(ReframeProgress::new(frames_written, total_frames));
        }
        if progress_interval > 0 && frames_written % progress_interval == 0 {
            debug!(frame = frames_written, total_frames, "Reframe progress");
        }
    }

    if frames_written == 0 {
        return Err(MediaError::decode(0, "source produced no frames"));
    }

    sink.close()?;

    Ok(FrameLoopStats {
        frames_written,
        detections_run: pipeline.detections_run(),
        samples_with_face: pipeline.samples_with_face(),
        truncated,
    })
}

/// Reframes a landscape video into a portrait one by following the
/// largest face.
pub struct Reframer<L = HaarCascadeLocator> {
    config: ReframeConfig,
    locator: L,
    cancel_rx: Option<watch::Receiver<bool>>,
    progress: Option<ReframeProgressCallback>,
}

impl Reframer<HaarCascadeLocator> {
    /// Create a reframer with the Haar cascade detector.
    ///
    /// Fails with `DetectionUnavailable` if the detector cannot be loaded.
    pub fn new(config: ReframeConfig) -> MediaResult<Self> {
        config.validate()?;
        let locator = HaarCascadeLocator::new(&config)?;
        Ok(Self::with_locator(config, locator))
    }
}

impl<L: FaceLocator + 'static> Reframer<L> {
    /// Create a reframer with a custom face locator.
    pub fn with_locator(config: ReframeConfig, locator: L) -> Self {
        Self {
            config,
            locator,
            cancel_rx: None,
            progress: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set a per-frame progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ReframeProgress) + Send + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &ReframeConfig {
        &self.config
    }

    /// Reframe `input` into `output`.
    pub async fn run(self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> MediaResult<ReframeOutcome> {
        let input = input.as_ref().to_path_buf();
        let output = output.as_ref().to_path_buf();
        let span = info_span!("reframe", input = %input.display(), output = %output.display());

        async move {
            let started = Instant::now();
            let result = self.execute(&input, &output, started).await;
            let elapsed = started.elapsed().as_secs_f64();

            match &result {
                Ok(outcome) => {
                    metrics::record_reframe_run("ok", elapsed, outcome.frames_written);
                    metrics::record_detections(outcome.detections_run, outcome.samples_with_face);
                    info!(
                        frames = outcome.frames_written,
                        detections = outcome.detections_run,
                        with_face = outcome.samples_with_face,
                        "Reframed {} in {:.1}s",
                        outcome.output.display(),
                        elapsed
                    );
                }
                Err(e) if e.is_cancelled() => {
                    metrics::record_reframe_run("cancelled", elapsed, 0);
                    warn!("Reframe cancelled");
                }
                Err(e) => {
                    metrics::record_reframe_run(e.stage(), elapsed, 0);
                    error!(stage = e.stage(), frame = ?e.frame(), "Reframe failed: {}", e);
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn execute(self, input: &Path, output: &Path, started: Instant) -> MediaResult<ReframeOutcome> {
        let Self {
            config,
            locator,
            cancel_rx,
            progress,
        } = self;

        config.validate()?;

        let info = probe_video(input).await?;
        let metadata = info.stream_metadata()?;
        info!(
            width = metadata.width,
            height = metadata.height,
            fps = metadata.frame_rate,
            total_frames = metadata.frame_count,
            has_audio = info.has_audio,
            "Source opened"
        );

        // Intermediates sit next to the output so the final rename stays on one filesystem
        ensure_parent_dir(output).await?;
        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let work_dir = tempfile::Builder::new().prefix(".reframe-").tempdir_in(parent)?;
        let video_only = work_dir.path().join("video_only.mp4");

        let stats = {
            let input = input.to_path_buf();
            let video_only = video_only.clone();
            let config = config.clone();
            let cancel = cancel_rx.clone();
            tokio::task::spawn_blocking(move || {
                render_video_only(&input, &video_only, metadata, &config, locator, cancel.as_ref(), progress.as_ref())
            })
            .await
            .map_err(|e| MediaError::Io(std::io::Error::other(format!("render task failed: {}", e))))??
        };

        if cancel_rx.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Err(MediaError::Cancelled);
        }

        let mut runner = FfmpegRunner::new().with_timeout(MUX_TIMEOUT_SECS);
        if let Some(rx) = cancel_rx {
            runner = runner.with_cancel(rx);
        }
        mux_audio(&video_only, input, output, &config.encoding, &runner).await?;

        if let Err(e) = work_dir.close() {
            warn!("Failed to remove intermediate directory: {}", e);
        }

        Ok(ReframeOutcome {
            output: output.to_path_buf(),
            frames_written: stats.frames_written,
            total_frames: metadata.frame_count,
            detections_run: stats.detections_run,
            samples_with_face: stats.samples_with_face,
            has_audio: info.has_audio,
            truncated: stats.truncated,
            elapsed: started.elapsed(),
        })
    }
}

/// Decode, reframe and encode the video-only intermediate.
fn render_video_only<L: FaceLocator>(
    input: &Path,
    video_only: &Path,
    metadata: StreamMetadata,
    config: &ReframeConfig,
    locator: L,
    cancel: Option<&watch::Receiver<bool>>,
    progress: Option<&ReframeProgressCallback>,
) -> MediaResult<FrameLoopStats> {
    let mut source = FfmpegFrameSource::open(input, metadata)?;
    let mut sink = FfmpegFrameSink::open(
        video_only,
        config.output_width,
        config.output_height,
        metadata.frame_rate,
        &config.encoding,
    )?;
    let mut pipeline = FramePipeline::new(&metadata, config, locator);

    run_frame_loop(
        &mut source,
        &mut pipeline,
        &mut sink,
        cancel,
        progress,
        config.progress_interval_frames,
    )
}
