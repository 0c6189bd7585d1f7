//! Crop window geometry.

use super::models::{AspectRatio, CropWindow};

/// Computes the horizontal crop window for a given center.
///
/// The window always spans the full source height and is
/// `floor(height * 9 / 16)` wide, clamped inside the frame. When the
/// source is narrower than that the whole width is kept.
#[derive(Debug, Clone, Copy)]
pub struct CropPlanner {
    source_width: u32,
    crop_width: u32,
}

impl CropPlanner {
    pub fn new(source_width: u32, source_height: u32) -> Self {
        let crop_width = AspectRatio::PORTRAIT
            .width_for_height(source_height)
            .min(source_width);
        Self {
            source_width,
            crop_width,
        }
    }

    /// Width of every window this planner produces.
    pub fn crop_width(&self) -> u32 {
        self.crop_width
    }

    /// Whether the source is too narrow for a full-height 9:16 window.
    pub fn is_degenerate(&self) -> bool {
        self.crop_width == self.source_width
    }

    /// Window centered as close to `center` as the frame allows.
    pub fn plan(&self, center: f64) -> CropWindow {
        let max_left = (self.source_width - self.crop_width) as f64;
        let left = (center - self.crop_width as f64 / 2.0).round();
        // NaN falls through clamp and saturates to 0 on the cast
        let left = left.clamp(0.0, max_left) as u32;
        CropWindow {
            left,
            right: left + self.crop_width,
        }
    }
}

/// One-shot form of [`CropPlanner::plan`].
pub fn plan_crop(source_width: u32, source_height: u32, center: f64) -> CropWindow {
    CropPlanner::new(source_width, source_height).plan(center)
}
