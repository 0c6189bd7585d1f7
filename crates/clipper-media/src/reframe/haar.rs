//! OpenCV Haar cascade face locator.
//!
//! Uses the stock `haarcascade_frontalface_default.xml` frontal-face model on
//! a grayscale copy of each frame. Requires the `opencv` feature; without it
//! construction fails with [`MediaError::DetectionUnavailable`] so a
//! misconfigured build never silently produces center-only crops.

use std::path::{Path, PathBuf};

use super::config::ReframeConfig;
#[cfg(feature = "opencv")]
use super::detector::FaceLocator;
#[cfg(feature = "opencv")]
use super::models::{BoundingBox, Frame};
use crate::error::{MediaError, MediaResult};

/// File name of the canonical frontal-face cascade.
pub const CASCADE_FILE_NAME: &str = "haarcascade_frontalface_default.xml";

/// Well-known install locations, searched in order.
pub(crate) const CASCADE_SEARCH_PATHS: &[&str] = &[
    "./models/haarcascade_frontalface_default.xml",
    "/usr/share/opencv4/haarcascades/haarcascade_frontalface_default.xml",
    "/usr/share/opencv/haarcascades/haarcascade_frontalface_default.xml",
    "/usr/local/share/opencv4/haarcascades/haarcascade_frontalface_default.xml",
    "/usr/local/share/opencv/haarcascades/haarcascade_frontalface_default.xml",
    "/opt/homebrew/share/opencv4/haarcascades/haarcascade_frontalface_default.xml",
];

/// Resolve the cascade file: the explicit path if given, else the first
/// well-known location that exists.
pub fn find_cascade_path(explicit: Option<&Path>) -> MediaResult<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(MediaError::detection_unavailable(format!(
            "cascade file not found: {}",
            path.display()
        )));
    }

    CASCADE_SEARCH_PATHS
        .iter()
        .map(Path::new)
        .find(|p| p.is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            MediaError::detection_unavailable(format!(
                "{} not found; set REFRAME_CASCADE_PATH or pass --cascade",
                CASCADE_FILE_NAME
            ))
        })
}

/// Whether face detection can be initialized in this build.
pub fn is_detection_available(config: &ReframeConfig) -> bool {
    cfg!(feature = "opencv") && find_cascade_path(config.cascade_path.as_deref()).is_ok()
}

#[cfg(feature = "opencv")]
pub struct HaarCascadeLocator {
    classifier: opencv::objdetect::CascadeClassifier,
    scale_factor: f64,
    min_neighbors: i32,
    min_size: i32,
}

#[cfg(feature = "opencv")]
impl HaarCascadeLocator {
    /// Load the cascade named by the config (or found on disk).
    pub fn new(config: &ReframeConfig) -> MediaResult<Self> {
        use opencv::prelude::CascadeClassifierTraitConst;

        let path = find_cascade_path(config.cascade_path.as_deref())?;
        let path_str = path.to_string_lossy();

        let classifier = opencv::objdetect::CascadeClassifier::new(&path_str).map_err(|e| {
            MediaError::detection_unavailable(format!("failed to load {}: {}", path.display(), e))
        })?;

        let empty = classifier
            .empty()
            .map_err(|e| MediaError::detection_unavailable(e.to_string()))?;
        if empty {
            return Err(MediaError::detection_unavailable(format!(
                "cascade {} loaded but is empty",
                path.display()
            )));
        }

        tracing::info!(
            cascade = %path.display(),
            scale_factor = config.detector_scale_factor,
            min_neighbors = config.detector_min_neighbors,
            "Haar cascade face detector initialized"
        );

        Ok(Self {
            classifier,
            scale_factor: config.detector_scale_factor,
            min_neighbors: config.detector_min_neighbors as i32,
            min_size: config.min_face_size as i32,
        })
    }
}

#[cfg(feature = "opencv")]
impl FaceLocator for HaarCascadeLocator {
    fn detect(&mut self, frame: &Frame) -> MediaResult<Vec<BoundingBox>> {
        use opencv::core::{Mat, Rect, Size, Vector};
        use opencv::prelude::{CascadeClassifierTrait, MatTraitConst};

        let gray = image::imageops::grayscale(&frame.pixels);
        let (width, height) = gray.dimensions();

        let to_err = |e: opencv::Error| MediaError::detection_failed(frame.index, e.to_string());

        let mat = Mat::new_rows_cols_with_data(height as i32, width as i32, gray.as_raw())
            .and_then(|m| m.try_clone())
            .map_err(to_err)?;

        let mut faces = Vector::<Rect>::new();
        self.classifier
            .detect_multi_scale(
                &mat,
                &mut faces,
                self.scale_factor,
                self.min_neighbors,
                0,
                Size::new(self.min_size, self.min_size),
                Size::new(0, 0),
            )
            .map_err(to_err)?;

        Ok(faces
            .iter()
            .map(|r| BoundingBox::new(r.x as f64, r.y as f64, r.width as f64, r.height as f64))
            .collect())
    }

    fn name(&self) -> &'static str {
        "haar"
    }
}

/// Placeholder used when the crate is built without OpenCV.
#[cfg(not(feature = "opencv"))]
pub struct HaarCascadeLocator;

#[cfg(not(feature = "opencv"))]
impl HaarCascadeLocator {
    pub fn new(_config: &ReframeConfig) -> MediaResult<Self> {
        Err(MediaError::detection_unavailable(
            "built without the `opencv` feature",
        ))
    }
}

#[cfg(not(feature = "opencv"))]
impl super::detector::FaceLocator for HaarCascadeLocator {
    fn detect(&mut self, frame: &super::models::Frame) -> MediaResult<Vec<super::models::BoundingBox>> {
        Err(MediaError::detection_failed(
            frame.index,
            "built without the `opencv` feature",
        ))
    }
}
