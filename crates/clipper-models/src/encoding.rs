//! Encoder settings for portrait renders.
//!
//! Frames coming out of the reframer are always re-encoded, so this is the
//! one place the output codec, quality and audio settings are chosen.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
pub const DEFAULT_PRESET: &str = "fast";
pub const DEFAULT_CRF: u8 = 23;
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Highest CRF value x264/x265 accept.
pub const MAX_CRF: u8 = 51;

/// Output encoder settings. Missing fields deserialize to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EncodingConfig {
    /// FFmpeg video encoder name
    pub codec: String,
    /// Speed/size tradeoff preset ("ultrafast" .. "veryslow")
    pub preset: String,
    /// Constant rate factor, 0 (lossless) to 51
    pub crf: u8,
    /// FFmpeg audio encoder used when the source audio is re-attached
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.into(),
            preset: DEFAULT_PRESET.into(),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.into(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.into(),
        }
    }
}

impl EncodingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    /// Video encoder arguments, pixel format pinned to yuv420p.
    pub fn video_args(&self) -> Vec<String> {
        let crf = self.crf.to_string();
        ["-c:v", self.codec.as_str(), "-preset", self.preset.as_str(), "-crf", crf.as_str(), "-pix_fmt", "yuv420p"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn audio_args(&self) -> Vec<String> {
        ["-c:a", self.audio_codec.as_str(), "-b:a", self.audio_bitrate.as_str()]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Video arguments followed by audio arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = self.video_args();
        args.extend(self.audio_args());
        args
    }
}
