//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use clipper_models::TimestampError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Source unreadable ({}): {reason}", path.display())]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("Decode failed at frame {frame}: {message}")]
    DecodeError { frame: u64, message: String },

    #[error("Face detector unavailable: {0}")]
    DetectionUnavailable(String),

    #[error("Face detection failed at frame {frame}: {message}")]
    DetectionFailed { frame: u64, message: String },

    #[error("Encode failed at frame {frame}: {message}")]
    EncodeError { frame: u64, message: String },

    #[error("Audio mux failed: {0}")]
    MuxError(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a source-unreadable error.
    pub fn source_unreadable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SourceUnreadable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a decode error for the given frame.
    pub fn decode(frame: u64, message: impl Into<String>) -> Self {
        Self::DecodeError {
            frame,
            message: message.into(),
        }
    }

    /// Create an encode error for the given frame.
    pub fn encode(frame: u64, message: impl Into<String>) -> Self {
        Self::EncodeError {
            frame,
            message: message.into(),
        }
    }

    /// Create a detector setup error.
    pub fn detection_unavailable(message: impl Into<String>) -> Self {
        Self::DetectionUnavailable(message.into())
    }

    /// Create a per-frame detection error.
    pub fn detection_failed(frame: u64, message: impl Into<String>) -> Self {
        Self::DetectionFailed {
            frame,
            message: message.into(),
        }
    }

    /// Create a mux error.
    pub fn mux(message: impl Into<String>) -> Self {
        Self::MuxError(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Pipeline stage the error belongs to, for logs and metric labels.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::SourceUnreadable { .. } | Self::FfprobeNotFound | Self::JsonParse(_) => "open",
            Self::DecodeError { .. } => "decode",
            Self::DetectionUnavailable(_) | Self::DetectionFailed { .. } => "detect",
            Self::EncodeError { .. } => "encode",
            Self::MuxError(_) => "mux",
            Self::InvalidTimestamp(_) | Self::InvalidConfig(_) => "config",
            Self::FfmpegNotFound | Self::FfmpegFailed { .. } | Self::Timeout(_) => "ffmpeg",
            Self::Cancelled => "cancel",
            Self::Io(_) => "io",
        }
    }

    /// Frame index the error is attached to, if any.
    pub fn frame(&self) -> Option<u64> {
        match self {
            Self::DecodeError { frame, .. }
            | Self::DetectionFailed { frame, .. }
            | Self::EncodeError { frame, .. } => Some(*frame),
            _ => None,
        }
    }

    /// Whether this is a caller-requested cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<TimestampError> for MediaError {
    fn from(err: TimestampError) -> Self {
        Self::InvalidTimestamp(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_and_frame_context() {
        let err = MediaError::decode(42, "short read");
        assert_eq!(err.stage(), "decode");
        assert_eq!(err.frame(), Some(42));
        assert!(err.to_string().contains("frame 42"));

        let err = MediaError::mux("no output");
        assert_eq!(err.stage(), "mux");
        assert_eq!(err.frame(), None);
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(MediaError::Cancelled.is_cancelled());
        assert!(!MediaError::decode(0, "x").is_cancelled());
    }

    #[test]
    fn test_timestamp_error_conversion() {
        let err: MediaError = TimestampError::StartNotBeforeEnd.into();
        assert!(matches!(err, MediaError::InvalidTimestamp(_)));
        assert_eq!(err.stage(), "config");
    }
}
