//! Value types flowing through the reframing pipeline.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

/// Stream properties captured once when the source is opened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second
    pub frame_rate: f64,
    /// Frame count as reported by the container (may be estimated)
    pub frame_count: u64,
}

impl StreamMetadata {
    pub fn new(width: u32, height: u32, frame_rate: f64, frame_count: u64) -> MediaResult<Self> {
        if width == 0 || height == 0 {
            return Err(MediaError::invalid_config(format!(
                "stream dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(MediaError::invalid_config(format!(
                "stream frame rate must be positive, got {}",
                frame_rate
            )));
        }
        Ok(Self {
            width,
            height,
            frame_rate,
            frame_count,
        })
    }

    /// Bytes in one packed RGB24 frame.
    pub fn rgb_frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Duration implied by the frame count.
    pub fn duration_secs(&self) -> f64 {
        self.frame_count as f64 / self.frame_rate
    }
}

/// A decoded frame. Moved from stage to stage, never shared.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based presentation index
    pub index: u64,
    /// Packed RGB pixels
    pub pixels: RgbImage,
}

impl Frame {
    pub fn new(index: u64, pixels: RgbImage) -> Self {
        Self { index, pixels }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: f64,
    /// Top edge y-coordinate
    pub y: f64,
    /// Box width
    pub width: f64,
    /// Box height
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Center x-coordinate.
    #[inline]
    pub fn cx(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Right edge x-coordinate.
    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate.
    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    /// Box area in pixels.
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Intersection of the box with the frame, or `None` if they don't overlap.
    pub fn clip_to_frame(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        let x1 = self.x.max(0.0);
        let y1 = self.y.max(0.0);
        let x2 = self.x2().min(frame_width as f64);
        let y2 = self.y2().min(frame_height as f64);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1))
    }
}

/// Horizontal slice of the source kept for one output frame. The full
/// source height is always used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropWindow {
    pub left: u32,
    pub right: u32,
}

impl CropWindow {
    #[inline]
    pub fn width(&self) -> u32 {
        self.right - self.left
    }
}

/// Snapshot of the center tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerState {
    /// Smoothed center fed to the crop planner
    pub current_center: f64,
    /// Center the tracker is easing towards
    pub target_center: f64,
    /// Frames since a sampled frame last contained a face
    pub frames_since_face: u64,
}

/// Aspect ratio as an integer fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Portrait 9:16 for shorts/reels.
    pub const PORTRAIT: AspectRatio = AspectRatio { width: 9, height: 16 };

    /// Width of this ratio for a given height, rounded down.
    pub fn width_for_height(&self, height: u32) -> u32 {
        (height as u64 * self.width as u64 / self.height as u64) as u32
    }

    pub fn ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}
