//! Configuration for the reframing pipeline.

use std::path::PathBuf;

use clipper_models::encoding::MAX_CRF;
use clipper_models::EncodingConfig;
use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

/// Output width for portrait video.
pub const PORTRAIT_WIDTH: u32 = 1080;

/// Output height for portrait video.
pub const PORTRAIT_HEIGHT: u32 = 1920;

/// Configuration for the reframing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReframeConfig {
    // === Output ===
    /// Output width in pixels (default: 1080)
    pub output_width: u32,

    /// Output height in pixels (default: 1920)
    pub output_height: u32,

    // === Tracking ===
    /// Run the face detector on every Nth frame (default: 5)
    pub detection_interval_frames: u32,

    /// Weight of the target center in the per-frame moving average (default: 0.1)
    pub smoothing_factor: f64,

    /// Seconds of footage without a face before easing back to center (default: 3.0)
    pub face_loss_recenter_seconds: f64,

    // === Face Detection ===
    /// Smallest face side accepted, in source pixels (default: 30)
    pub min_face_size: u32,

    /// Haar cascade image pyramid scale step (default: 1.1)
    pub detector_scale_factor: f64,

    /// Haar cascade neighbour votes required per detection (default: 5)
    pub detector_min_neighbors: u32,

    /// Explicit path to `haarcascade_frontalface_default.xml`
    pub cascade_path: Option<PathBuf>,

    // === Rendering ===
    /// Encoder settings for the video-only pass and the audio mux
    pub encoding: EncodingConfig,

    /// Emit a progress log line every N frames (default: 100)
    pub progress_interval_frames: u64,
}

impl Default for ReframeConfig {
    fn default() -> Self {
        Self {
            output_width: PORTRAIT_WIDTH,
            output_height: PORTRAIT_HEIGHT,
            detection_interval_frames: 5,
            smoothing_factor: 0.1,
            face_loss_recenter_seconds: 3.0,
            min_face_size: 30,
            detector_scale_factor: 1.1,
            detector_min_neighbors: 5,
            cascade_path: None,
            encoding: EncodingConfig::default(),
            progress_interval_frames: 100,
        }
    }
}

impl ReframeConfig {
    /// Create config from `REFRAME_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut encoding = defaults.encoding.clone();
        if let Some(preset) = std::env::var("REFRAME_PRESET").ok().filter(|s| !s.is_empty()) {
            encoding.preset = preset;
        }
        encoding.crf = std::env::var("REFRAME_CRF")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(encoding.crf);

        Self {
            output_width: std::env::var("REFRAME_OUTPUT_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.output_width),
            output_height: std::env::var("REFRAME_OUTPUT_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.output_height),
            detection_interval_frames: std::env::var("REFRAME_DETECTION_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.detection_interval_frames),
            smoothing_factor: std::env::var("REFRAME_SMOOTHING_FACTOR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.smoothing_factor),
            face_loss_recenter_seconds: std::env::var("REFRAME_RECENTER_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.face_loss_recenter_seconds),
            min_face_size: std::env::var("REFRAME_MIN_FACE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_face_size),
            detector_scale_factor: std::env::var("REFRAME_SCALE_FACTOR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.detector_scale_factor),
            detector_min_neighbors: std::env::var("REFRAME_MIN_NEIGHBORS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.detector_min_neighbors),
            cascade_path: std::env::var("REFRAME_CASCADE_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            encoding,
            progress_interval_frames: std::env::var("REFRAME_PROGRESS_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.progress_interval_frames),
        }
    }

    /// Check the configuration for values the pipeline cannot run with.
    pub fn validate(&self) -> MediaResult<()> {
        if self.output_width == 0 || self.output_height == 0 {
            return Err(MediaError::invalid_config(format!(
                "output size must be positive, got {}x{}",
                self.output_width, self.output_height
            )));
        }
        // yuv420p needs even dimensions
        if self.output_width % 2 != 0 || self.output_height % 2 != 0 {
            return Err(MediaError::invalid_config(format!(
                "output size must be even, got {}x{}",
                self.output_width, self.output_height
            )));
        }
        if self.detection_interval_frames == 0 {
            return Err(MediaError::invalid_config(
                "detection_interval_frames must be at least 1",
            ));
        }
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(MediaError::invalid_config(format!(
                "smoothing_factor must be in (0, 1], got {}",
                self.smoothing_factor
            )));
        }
        if !(self.face_loss_recenter_seconds.is_finite() && self.face_loss_recenter_seconds > 0.0) {
            return Err(MediaError::invalid_config(format!(
                "face_loss_recenter_seconds must be positive, got {}",
                self.face_loss_recenter_seconds
            )));
        }
        if self.detector_scale_factor <= 1.0 {
            return Err(MediaError::invalid_config(format!(
                "detector_scale_factor must be greater than 1, got {}",
                self.detector_scale_factor
            )));
        }
        if self.encoding.crf > MAX_CRF {
            return Err(MediaError::invalid_config(format!(
                "crf must be in 0..={}, got {}",
                MAX_CRF,
                self.encoding.crf
            )));
        }
        Ok(())
    }

    /// Frames without a face after which the tracker recenters.
    pub fn face_loss_recenter_frames(&self, frame_rate: f64) -> f64 {
        self.face_loss_recenter_seconds * frame_rate
    }
}
