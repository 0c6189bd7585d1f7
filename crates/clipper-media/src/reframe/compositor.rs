//! Crop and resample a frame to the output resolution.

use image::imageops::{self, FilterType};
use image::RgbImage;

use super::models::{CropWindow, Frame};

/// Crops are resized directly when their aspect is within this fraction of
/// the output aspect; anything further off is letterboxed.
const ASPECT_TOLERANCE: f64 = 0.01;

/// Applies crop windows and resizes to a fixed output size.
#[derive(Debug, Clone, Copy)]
pub struct FrameCompositor {
    output_width: u32,
    output_height: u32,
    filter: FilterType,
}

impl FrameCompositor {
    pub fn new(output_width: u32, output_height: u32) -> Self {
        Self {
            output_width,
            output_height,
            filter: FilterType::Triangle,
        }
    }

    /// Crop `frame` to `window` at full height and scale to the output size.
    /// The frame index is carried over unchanged.
    pub fn apply(&self, frame: Frame, window: CropWindow) -> Frame {
        let Frame { index, pixels } = frame;
        let height = pixels.height();
        let left = window.left.min(pixels.width());
        let width = window.width().min(pixels.width() - left);

        let cropped = imageops::crop_imm(&pixels, left, 0, width, height).to_image();
        drop(pixels);

        Frame::new(index, self.fit(cropped))
    }

    fn fit(&self, cropped: RgbImage) -> RgbImage {
        let (cw, ch) = cropped.dimensions();
        if (cw, ch) == (self.output_width, self.output_height) {
            return cropped;
        }

        let crop_aspect = cw as f64 / ch as f64;
        let output_aspect = self.output_width as f64 / self.output_height as f64;
        if ((crop_aspect - output_aspect) / output_aspect).abs() <= ASPECT_TOLERANCE {
            return imageops::resize(&cropped, self.output_width, self.output_height, self.filter);
        }

        // Scale to fit, then pad with black rather than distort
        let scale = (self.output_width as f64 / cw as f64).min(self.output_height as f64 / ch as f64);
        let fit_w = ((cw as f64 * scale).round() as u32).clamp(1, self.output_width);
        let fit_h = ((ch as f64 * scale).round() as u32).clamp(1, self.output_height);
        let scaled = imageops::resize(&cropped, fit_w, fit_h, self.filter);

        let mut canvas = RgbImage::new(self.output_width, self.output_height);
        let x = ((self.output_width - fit_w) / 2) as i64;
        let y = ((self.output_height - fit_h) / 2) as i64;
        imageops::overlay(&mut canvas, &scaled, x, y);
        canvas
    }
}
