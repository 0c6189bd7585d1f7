//! Progress reporting for FFmpeg runs and reframing runs.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Output time as string (HH:MM:SS.microseconds)
    pub out_time: String,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }

    /// Estimate time remaining in seconds.
    pub fn eta_seconds(&self, total_duration_ms: i64) -> Option<f64> {
        if self.speed <= 0.0 || self.out_time_ms <= 0 {
            return None;
        }

        let remaining_ms = total_duration_ms - self.out_time_ms;
        if remaining_ms <= 0 {
            return Some(0.0);
        }

        Some((remaining_ms as f64 / 1000.0) / self.speed)
    }
}

/// Callback type for FFmpeg progress updates. Shared, since runners are cloned.
pub type ProgressCallback = Arc<dyn Fn(FfmpegProgress) + Send + Sync + 'static>;

/// Immutable snapshot of a reframing run's frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReframeProgress {
    /// Frames decoded, composited and handed to the encoder so far
    pub frames_processed: u64,
    /// Frame count reported by the container (an estimate for some formats)
    pub total_frames: u64,
}

impl ReframeProgress {
    pub fn new(frames_processed: u64, total_frames: u64) -> Self {
        Self {
            frames_processed,
            total_frames,
        }
    }

    /// Completion percentage, capped at 100 when the estimate was low.
    pub fn percentage(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        ((self.frames_processed as f64 / self.total_frames as f64) * 100.0).min(100.0)
    }
}

/// Callback type for reframing progress updates. Called once per frame.
pub type ReframeProgressCallback = Box<dyn Fn(ReframeProgress) + Send + 'static>;
