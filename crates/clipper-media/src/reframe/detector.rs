//! Face locator abstraction and detection post-processing.

use super::models::{BoundingBox, Frame};
use crate::error::MediaResult;

/// Finds faces in a single frame.
///
/// Implementations must be a pure function of the frame: no state carried
/// between calls, so repeated calls on the same frame return the same boxes.
/// `&mut self` only exists because native detectors need scratch buffers.
pub trait FaceLocator: Send {
    /// Detect faces. An empty vector means "no face", not an error.
    fn detect(&mut self, frame: &Frame) -> MediaResult<Vec<BoundingBox>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str {
        "face"
    }
}

impl<L: FaceLocator + ?Sized> FaceLocator for Box<L> {
    fn detect(&mut self, frame: &Frame) -> MediaResult<Vec<BoundingBox>> {
        (**self).detect(frame)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Clip detections to the frame and drop anything smaller than `min_size`
/// on either side.
pub fn filter_faces(
    boxes: Vec<BoundingBox>,
    min_size: u32,
    frame_width: u32,
    frame_height: u32,
) -> Vec<BoundingBox> {
    let min_size = min_size as f64;
    boxes
        .into_iter()
        .filter_map(|b| b.clip_to_frame(frame_width, frame_height))
        .filter(|b| b.width >= min_size && b.height >= min_size)
        .collect()
}

/// The face to follow: largest area, ties broken by the leftmost box.
pub fn largest_face(boxes: &[BoundingBox]) -> Option<&BoundingBox> {
    boxes.iter().fold(None, |best: Option<&BoundingBox>, candidate| match best {
        Some(b) if b.area() > candidate.area() => Some(b),
        Some(b) if b.area() == candidate.area() && b.x <= candidate.x => Some(b),
        _ => Some(candidate),
    })
}
