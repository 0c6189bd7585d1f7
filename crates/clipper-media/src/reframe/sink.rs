//! Frame sinks.

use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use clipper_models::EncodingConfig;
use tracing::{debug, warn};

use super::models::Frame;
use super::source::spawn_stderr_drain;
use crate::command::{check_ffmpeg, FfmpegCommand};
use crate::error::{MediaError, MediaResult};

/// Consumes composited frames in strictly increasing index order.
pub trait FrameSink {
    fn write(&mut self, frame: Frame) -> MediaResult<()>;

    /// Finalize the output. Frames written after `close` are a programming error.
    fn close(&mut self) -> MediaResult<()>;
}

/// Encodes a video-only stream through `ffmpeg -f rawvideo -i pipe:0 -an ...`.
pub struct FfmpegFrameSink {
    path: PathBuf,
    width: u32,
    height: u32,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<JoinHandle<String>>,
    last_index: Option<u64>,
    frames_written: u64,
}

impl FfmpegFrameSink {
    /// Start an encoder writing `width`x`height` frames at `frame_rate` to `path`.
    pub fn open(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        frame_rate: f64,
        encoding: &EncodingConfig,
    ) -> MediaResult<Self> {
        let path = path.as_ref();
        let ffmpeg = check_ffmpeg()?;

        let args = FfmpegCommand::new("pipe:0", path)
            .no_progress()
            .input_args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .input_arg("-s")
            .input_arg(format!("{}x{}", width, height))
            .input_arg("-r")
            .input_arg(format!("{:.6}", frame_rate))
            .no_audio()
            .output_args(encoding.video_args())
            .build_args();
        debug!("Encoding with: ffmpeg {}", args.join(" "));

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::encode(0, format!("failed to spawn encoder: {}", e)))?;

        let (stdin, stderr) = match (child.stdin.take(), child.stderr.take()) {
            (Some(stdin), Some(stderr)) => (stdin, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MediaError::encode(0, "encoder pipes unavailable"));
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            child,
            stdin: Some(BufWriter::with_capacity(width as usize * height as usize * 3, stdin)),
            stderr: Some(spawn_stderr_drain(stderr)),
            last_index: None,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Wait for the encoder and collect its stderr tail.
    fn reap(&mut self) -> MediaResult<(std::process::ExitStatus, String)> {
        let status = self.child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        Ok((status, stderr))
    }
}

impl FrameSink for FfmpegFrameSink {
    fn write(&mut self, frame: Frame) -> MediaResult<()> {
        debug_assert!(
            self.last_index.map_or(true, |last| frame.index > last),
            "frames must be written in increasing index order"
        );

        if frame.pixels.dimensions() != (self.width, self.height) {
            return Err(MediaError::encode(
                frame.index,
                format!(
                    "frame is {}x{}, encoder expects {}x{}",
                    frame.width(),
                    frame.height(),
                    self.width,
                    self.height
                ),
            ));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::encode(frame.index, "encoder already closed"))?;

        if let Err(e) = stdin.write_all(frame.pixels.as_raw()) {
            self.stdin = None;
            let message = match e.kind() {
                ErrorKind::BrokenPipe => {
                    let (status, stderr) = self.reap()?;
                    format!("encoder exited early with {}: {}", status, stderr)
                }
                _ => format!("write failed: {}", e),
            };
            return Err(MediaError::encode(frame.index, message));
        }

        self.last_index = Some(frame.index);
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> MediaResult<()> {
        let frame = self.frames_written;
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.flush() {
                warn!("Failed to flush encoder input: {}", e);
            }
            // Dropping stdin signals end of input
        }

        let (status, stderr) = self.reap()?;
        if !status.success() {
            return Err(MediaError::encode(
                frame,
                format!("encoder exited with {}: {}", status, stderr),
            ));
        }

        debug!(frames = frame, path = %self.path.display(), "Encoder finished");
        Ok(())
    }
}

impl Drop for FfmpegFrameSink {
    fn drop(&mut self) {
        self.stdin = None;
        if let Ok(None) = self.child.try_wait() {
            if let Err(e) = self.child.kill() {
                warn!("Failed to kill encoder: {}", e);
            }
            let _ = self.child.wait();
        }
    }
}

/// Sink that keeps frames in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub frames: Vec<Frame>,
    pub closed: bool,
}

impl FrameSink for RecordingSink {
    fn write(&mut self, frame: Frame) -> MediaResult<()> {
        debug_assert!(!self.closed, "write after close");
        debug_assert!(
            self.frames.last().map_or(true, |last| frame.index > last.index),
            "frames must be written in increasing index order"
        );
        self.frames.push(frame);
        Ok(())
    }

    fn close(&mut self) -> MediaResult<()> {
        self.closed = true;
        Ok(())
    }
}
