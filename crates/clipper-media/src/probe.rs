//! Source inspection through FFprobe.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};
use crate::reframe::StreamMetadata;

/// What FFprobe reports about a source, first video stream only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Container duration, seconds
    pub duration: f64,
    /// Displayed width, after any container rotation
    pub width: u32,
    /// Displayed height, after any container rotation
    pub height: u32,
    /// Container display rotation in degrees, normalized to 0, 90, 180 or 270
    #[serde(default)]
    pub rotation: u32,
    pub fps: f64,
    /// `nb_frames` when the container has it, else duration × fps
    pub frame_count: u64,
    pub codec: String,
    /// At least one audio stream present
    pub has_audio: bool,
    /// Bytes on disk
    pub size: u64,
    /// Container bitrate, bits/s
    pub bitrate: u64,
}

impl VideoInfo {
    /// Stream metadata for the reframing pipeline.
    pub fn stream_metadata(&self) -> MediaResult<StreamMetadata> {
        StreamMetadata::new(self.width, self.height, self.fps, self.frame_count)
    }
}

/// Subset of `-print_format json` output.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
    tags: Option<FfprobeTags>,
}

/// Display-matrix side data (FFmpeg 5+).
#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

/// Pre-side-data builds report rotation as a `rotate` tag.
#[derive(Debug, Deserialize)]
struct FfprobeTags {
    rotate: Option<String>,
}

impl FfprobeStream {
    /// Display rotation normalized to 0..360, whichever form FFprobe used.
    fn rotation(&self) -> u32 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| {
                self.tags
                    .as_ref()
                    .and_then(|t| t.rotate.as_deref())
                    .and_then(|r| r.trim().parse::<f64>().ok())
            })
            .unwrap_or(0.0);
        ((degrees.round() as i64).rem_euclid(360)) as u32
    }
}

/// Probe `path`.
///
/// A missing file, an unparseable container, or a container without a
/// video stream all surface as [`MediaError::SourceUnreadable`].
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(MediaError::source_unreadable(path, "file not found"));
    }

    let ffprobe = check_ffprobe()?;

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::source_unreadable(
            path,
            format!("ffprobe could not parse container: {}", stderr.trim()),
        ));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    video_info_from_probe(path, probe)
}

fn video_info_from_probe(path: &Path, probe: FfprobeOutput) -> MediaResult<VideoInfo> {
    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::source_unreadable(path, "no video stream found"))?;

    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let stored_width = video_stream.width.unwrap_or(0);
    let stored_height = video_stream.height.unwrap_or(0);
    if stored_width == 0 || stored_height == 0 {
        return Err(MediaError::source_unreadable(
            path,
            "video stream has no frame dimensions",
        ));
    }

    // The decoder auto-rotates, so frames arrive in display orientation
    let rotation = video_stream.rotation();
    let (width, height) = match rotation {
        90 | 270 => (stored_height, stored_width),
        _ => (stored_width, stored_height),
    };

    let duration = probe
        .format
        .duration
        .as_deref()
        .or(video_stream.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let bitrate = probe
        .format
        .bit_rate
        .as_ref()
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    // avg_frame_rate is "0/0" for some streams; fall back to r_frame_rate
    let fps = [&video_stream.avg_frame_rate, &video_stream.r_frame_rate]
        .into_iter()
        .flatten()
        .filter_map(|r| parse_frame_rate(r))
        .find(|fps| *fps > 0.0)
        .unwrap_or(30.0);

    let frame_count = video_stream
        .nb_frames
        .as_ref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| (duration * fps).round().max(0.0) as u64);

    Ok(VideoInfo {
        duration,
        width,
        height,
        rotation,
        fps,
        frame_count,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        has_audio,
        size,
        bitrate,
    })
}

/// Parse an FFprobe rate (`30000/1001`, `30/1` or plain `29.97`).
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> MediaResult<VideoInfo> {
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        video_info_from_probe(Path::new("clip.mp4"), probe)
    }

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_video_info_with_audio() {
        let info = parse(
            r#"{
                "format": {"duration": "10.000000", "size": "1000", "bit_rate": "800"},
                "streams": [
                    {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                     "avg_frame_rate": "30/1", "r_frame_rate": "30/1", "nb_frames": "300"},
                    {"codec_type": "audio", "codec_name": "aac"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.frame_count, 300);
        assert!(info.has_audio);
        assert_eq!(info.codec, "h264");
    }

    #[test]
    fn test_frame_count_estimated_without_nb_frames() {
        let info = parse(
            r#"{
                "format": {"duration": "4.0"},
                "streams": [
                    {"codec_type": "video", "width": 640, "height": 360,
                     "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}
                ]
            }"#,
        )
        .unwrap();

        assert!((info.fps - 25.0).abs() < 1e-9);
        assert_eq!(info.frame_count, 100);
        assert!(!info.has_audio);
    }

    #[test]
    fn test_rotated_stream_reports_display_dimensions() {
        let info = parse(
            r#"{
                "format": {"duration": "2.0"},
                "streams": [
                    {"codec_type": "video", "width": 1920, "height": 1080, "r_frame_rate": "30/1",
                     "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!((info.width, info.height), (1080, 1920));
        assert_eq!(info.rotation, 270);
        let meta = info.stream_metadata().unwrap();
        assert_eq!(meta.rgb_frame_len(), 1080 * 1920 * 3);
        assert_eq!((meta.width, meta.height), (1080, 1920));
    }

    #[test]
    fn test_rotate_tag_and_upside_down() {
        let tagged = parse(
            r#"{"format": {}, "streams": [{"codec_type": "video", "width": 1280, "height": 720,
                "r_frame_rate": "30/1", "tags": {"rotate": "90"}}]}"#,
        )
        .unwrap();
        assert_eq!((tagged.width, tagged.height, tagged.rotation), (720, 1280, 90));

        let flipped = parse(
            r#"{"format": {}, "streams": [{"codec_type": "video", "width": 1280, "height": 720,
                "r_frame_rate": "30/1", "side_data_list": [{"rotation": 180}]}]}"#,
        )
        .unwrap();
        assert_eq!((flipped.width, flipped.height, flipped.rotation), (1280, 720, 180));
    }

    #[test]
    fn test_audio_only_is_unreadable() {
        let err = parse(r#"{"format": {}, "streams": [{"codec_type": "audio"}]}"#).unwrap_err();
        assert!(matches!(err, MediaError::SourceUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_unreadable() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = probe_video(dir.path().join("nope.mp4")).await.unwrap_err();
        assert!(matches!(err, MediaError::SourceUnreadable { .. }));
    }
}
