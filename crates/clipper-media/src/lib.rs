#![deny(unreachable_patterns)]
//! Landscape-to-portrait reframing engine.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with progress parsing and cancellation
//! - FFprobe stream inspection
//! - The face-tracking reframer: decode, decimated detection, smoothing,
//!   crop planning, resampling, encoding and audio re-attachment
//! - Static center-crop and segment extraction helpers

pub mod clip;
pub mod command;
pub mod error;
pub mod fs_utils;
pub mod metrics;
pub mod mux;
pub mod probe;
pub mod progress;
pub mod reframe;

pub use clip::{center_crop, extract_highlight, extract_segment};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use mux::mux_audio;
pub use probe::{probe_video, VideoInfo};
pub use progress::{FfmpegProgress, ProgressCallback, ReframeProgress, ReframeProgressCallback};
pub use reframe::{
    FaceLocator, HaarCascadeLocator, ReframeConfig, ReframeOutcome, Reframer, StreamMetadata,
};
