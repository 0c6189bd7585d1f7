//! Metrics emitted by the media crate.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! host process installs a recorder.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const REFRAME_RUNS_TOTAL: &str = "clipper_reframe_runs_total";
    pub const REFRAME_DURATION_SECONDS: &str = "clipper_reframe_duration_seconds";
    pub const REFRAME_FRAMES_TOTAL: &str = "clipper_reframe_frames_total";
    pub const FACE_DETECTIONS_TOTAL: &str = "clipper_face_detections_total";
    pub const FFMPEG_DURATION_SECONDS: &str = "clipper_ffmpeg_duration_seconds";
}

/// Record the end of a reframing run. `status` is "ok", "cancelled" or the
/// failing stage name.
pub fn record_reframe_run(status: &str, duration_secs: f64, frames: u64) {
    let labels = [("status", status.to_string())];

    counter!(names::REFRAME_RUNS_TOTAL, &labels).increment(1);
    histogram!(names::REFRAME_DURATION_SECONDS, &labels).record(duration_secs);
    counter!(names::REFRAME_FRAMES_TOTAL).increment(frames);
}

/// Record detector invocations for a run.
pub fn record_detections(runs: u64, with_face: u64) {
    counter!(names::FACE_DETECTIONS_TOTAL, "result" => "face").increment(with_face);
    counter!(names::FACE_DETECTIONS_TOTAL, "result" => "none").increment(runs.saturating_sub(with_face));
}

/// Record a single FFmpeg invocation.
pub fn record_ffmpeg(operation: &'static str, duration_secs: f64, success: bool) {
    let labels = [
        ("operation", operation.to_string()),
        ("status", if success { "ok" } else { "error" }.to_string()),
    ];
    histogram!(names::FFMPEG_DURATION_SECONDS, &labels).record(duration_secs);
}
