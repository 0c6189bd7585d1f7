//! Frame sources.

use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use image::RgbImage;
use tracing::{debug, warn};

use super::models::{Frame, StreamMetadata};
use crate::command::{check_ffmpeg, FfmpegCommand, StderrTail};
use crate::error::{MediaError, MediaResult};

/// Forward-only, finite sequence of decoded frames.
pub trait FrameSource {
    /// Stream properties, fixed for the life of the source.
    fn metadata(&self) -> &StreamMetadata;

    /// Next frame in presentation order, or `None` at end of stream.
    /// Once `None` or an error has been returned the source is exhausted.
    fn next_frame(&mut self) -> MediaResult<Option<Frame>>;
}

/// Decodes a video through `ffmpeg ... -f rawvideo -pix_fmt rgb24 pipe:1`.
pub struct FfmpegFrameSource {
    metadata: StreamMetadata,
    path: PathBuf,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    next_index: u64,
    finished: bool,
}

impl FfmpegFrameSource {
    /// Start decoding `path`. `metadata` comes from probing the same file.
    pub fn open(path: impl AsRef<Path>, metadata: StreamMetadata) -> MediaResult<Self> {
        let path = path.as_ref();
        let ffmpeg = check_ffmpeg()?;

        let args = FfmpegCommand::new(path, "pipe:1")
            .no_progress()
            .output_args(["-map", "0:v:0", "-an", "-sn", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .build_args();
        debug!("Decoding with: ffmpeg {}", args.join(" "));

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::source_unreadable(path, format!("failed to spawn decoder: {}", e)))?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MediaError::source_unreadable(path, "decoder pipes unavailable"));
            }
        };

        Ok(Self {
            metadata,
            path: path.to_path_buf(),
            child,
            stdout: BufReader::with_capacity(metadata.rgb_frame_len().max(8192), stdout),
            stderr: Some(spawn_stderr_drain(stderr)),
            next_index: 0,
            finished: false,
        })
    }

    /// Read one frame's worth of bytes. Returns the number of bytes read,
    /// which is short only at end of stream.
    fn fill(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Reap the decoder after its output is exhausted.
    fn finish(&mut self) -> MediaResult<()> {
        self.finished = true;
        let status = self.child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            debug!(frames = self.next_index, path = %self.path.display(), "Decoder finished");
            Ok(())
        } else {
            Err(MediaError::decode(
                self.next_index,
                format!("decoder exited with {}: {}", status, stderr),
            ))
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let index = self.next_index;
        let mut buf = vec![0u8; self.metadata.rgb_frame_len()];
        let filled = match self.fill(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                self.finished = true;
                return Err(MediaError::decode(index, format!("read failed: {}", e)));
            }
        };

        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }

        if filled < buf.len() {
            self.finished = true;
            let _ = self.child.kill();
            return Err(MediaError::decode(
                index,
                format!("truncated frame: {} of {} bytes", filled, buf.len()),
            ));
        }

        let pixels = RgbImage::from_raw(self.metadata.width, self.metadata.height, buf)
            .ok_or_else(|| MediaError::decode(index, "frame buffer size mismatch"))?;

        self.next_index += 1;
        Ok(Some(Frame::new(index, pixels)))
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            if let Err(e) = self.child.kill() {
                warn!("Failed to kill decoder: {}", e);
            }
            let _ = self.child.wait();
        }
    }
}

/// Keep the bounded tail of a child's stderr so the pipe never fills up.
pub(crate) fn spawn_stderr_drain<R: Read + Send + 'static>(stderr: R) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut tail = StderrTail::default();
        for line in BufReader::new(stderr).lines() {
            match line {
                Ok(line) => tail.push(line),
                Err(_) => break,
            }
        }
        tail.into_string()
    })
}

/// In-memory source, used for tests and for callers that already hold frames.
pub struct VecFrameSource {
    metadata: StreamMetadata,
    frames: std::vec::IntoIter<MediaResult<RgbImage>>,
    next_index: u64,
}

impl VecFrameSource {
    pub fn new(metadata: StreamMetadata, frames: Vec<RgbImage>) -> Self {
        Self::with_results(metadata, frames.into_iter().map(Ok).collect())
    }

    /// Source that replays the given results, errors included.
    pub fn with_results(metadata: StreamMetadata, frames: Vec<MediaResult<RgbImage>>) -> Self {
        Self {
            metadata,
            frames: frames.into_iter(),
            next_index: 0,
        }
    }
}

impl FrameSource for VecFrameSource {
    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        match self.frames.next() {
            Some(Ok(pixels)) => {
                let frame = Frame::new(self.next_index, pixels);
                self.next_index += 1;
                Ok(Some(frame))
            }
            Some(Err(e)) => {
                self.frames = Vec::new().into_iter();
                Err(e)
            }
            None => Ok(None),
        }
    }
}
