//! Decimated sampling plus exponential smoothing of the crop center.
//!
//! The detector only runs on every Nth frame. Each sample either moves the
//! target to the chosen face or, after a long enough run of empty samples,
//! back to the middle of the frame. On every frame the visible center eases
//! towards the target with a first-order low-pass filter, so an abrupt
//! target change never becomes an abrupt crop change.

use super::config::ReframeConfig;
use super::models::{BoundingBox, StreamMetadata, TrackerState};

/// Temporal filter producing one smoothed center per frame.
#[derive(Debug, Clone)]
pub struct CenterTracker {
    state: TrackerState,
    /// Center used when there is nothing to follow
    home: f64,
    /// Sampling interval in frames
    interval: u32,
    /// Smoothing weight per frame
    alpha: f64,
    /// Frames of face loss tolerated before recentering
    recenter_after: f64,
}

impl CenterTracker {
    pub fn new(metadata: &StreamMetadata, config: &ReframeConfig) -> Self {
        let home = metadata.width as f64 / 2.0;
        Self {
            state: TrackerState {
                current_center: home,
                target_center: home,
                frames_since_face: 0,
            },
            home,
            interval: config.detection_interval_frames.max(1),
            alpha: config.smoothing_factor,
            recenter_after: config.face_loss_recenter_frames(metadata.frame_rate),
        }
    }

    /// Whether the detector should run on this frame.
    ///
    /// Counting is one-based, so with an interval of 5 the samples are
    /// frames 4, 9, 14, ...
    #[inline]
    pub fn is_sample_frame(&self, index: u64) -> bool {
        (index + 1) % self.interval as u64 == 0
    }

    /// Feed the outcome of one detector sample.
    pub fn observe(&mut self, face: Option<&BoundingBox>) {
        match face {
            Some(face) => {
                self.state.target_center = face.cx();
                self.state.frames_since_face = 0;
            }
            None => {
                self.state.frames_since_face += self.interval as u64;
                if self.state.frames_since_face as f64 > self.recenter_after {
                    self.state.target_center = self.home;
                }
            }
        }
    }

    /// Step the smoothing filter by one frame and return the new center.
    pub fn advance(&mut self) -> f64 {
        let state = &mut self.state;
        state.current_center += (state.target_center - state.current_center) * self.alpha;
        state.current_center
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(fps: f64) -> CenterTracker {
        let meta = StreamMetadata::new(1920, 1080, fps, 300).unwrap();
        CenterTracker::new(&meta, &ReframeConfig::default())
    }

    fn face_at(cx: f64) -> BoundingBox {
        BoundingBox::new(cx - 50.0, 300.0, 100.0, 100.0)
    }

    #[test]
    fn test_starts_centered() {
        let state = tracker(30.0).state();
        assert_eq!(state.current_center, 960.0);
        assert_eq!(state.target_center, 960.0);
        assert_eq!(state.frames_since_face, 0);
    }

    #[test]
    fn test_sample_frames_are_one_based() {
        let t = tracker(30.0);
        let samples: Vec<u64> = (0..20).filter(|i| t.is_sample_frame(*i)).collect();
        assert_eq!(samples, vec![4, 9, 14, 19]);
    }

    #[test]
    fn test_face_sets_target_and_resets_loss_counter() {
        let mut t = tracker(30.0);
        t.observe(None);
        assert_eq!(t.state().frames_since_face, 5);

        t.observe(Some(&face_at(400.0)));
        let state = t.state();
        assert_eq!(state.target_center, 400.0);
        assert_eq!(state.frames_since_face, 0);
    }

    #[test]
    fn test_advance_moves_by_alpha() {
        let mut t = tracker(30.0);
        t.observe(Some(&face_at(1060.0)));
        assert!((t.advance() - 970.0).abs() < 1e-9);
        assert!((t.advance() - 979.0).abs() < 1e-9);
    }

    #[test]
    fn test_recenter_requires_strictly_more_than_threshold() {
        // 30 fps * 3 s = 90 frames; 18 empty samples reach exactly 90
        let mut t = tracker(30.0);
        t.observe(Some(&face_at(300.0)));
        for _ in 0..18 {
            t.observe(None);
        }
        assert_eq!(t.state().frames_since_face, 90);
        assert_eq!(t.state().target_center, 300.0);

        t.observe(None);
        assert_eq!(t.state().target_center, 960.0);
    }
}
