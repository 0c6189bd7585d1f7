//! Shared data models for the portrait clip pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Encoding configuration handed to FFmpeg
//! - Highlight segments produced by the segment-selection stage
//! - Timestamp parsing for HH:MM:SS and SRT-style offsets

pub mod encoding;
pub mod highlight;
pub mod timestamp;

// Re-export common types
pub use encoding::EncodingConfig;
pub use highlight::Highlight;
pub use timestamp::{format_seconds, parse_timestamp, TimestampError};
