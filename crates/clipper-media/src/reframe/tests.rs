//! Cross-stage scenario tests for the reframing pipeline.
//!
//! Detection is replaced by scripted locators so tracking and geometry can
//! be checked without decoding real video.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};
use tokio::sync::watch;

use super::*;

/// Locator whose answer is a function of the frame index only.
struct ScriptedLocator<F> {
    script: F,
    calls: Arc<AtomicU64>,
}

impl<F> ScriptedLocator<F>
where
    F: FnMut(u64) -> Vec<BoundingBox> + Send,
{
    fn new(script: F) -> Self {
        Self {
            script,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<F> FaceLocator for ScriptedLocator<F>
where
    F: FnMut(u64) -> Vec<BoundingBox> + Send,
{
    fn detect(&mut self, frame: &Frame) -> MediaResult<Vec<BoundingBox>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.script)(frame.index))
    }
}

/// Locator that reports the bounding box of pure-white pixels, so its answer
/// depends on frame content alone.
struct WhiteBlockLocator;

impl FaceLocator for WhiteBlockLocator {
    fn detect(&mut self, frame: &Frame) -> MediaResult<Vec<BoundingBox>> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, px) in frame.pixels.enumerate_pixels() {
            if px.0 == [255, 255, 255] {
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }
        Ok(bounds
            .map(|(x0, y0, x1, y1)| {
                BoundingBox::new(x0 as f64, y0 as f64, (x1 - x0 + 1) as f64, (y1 - y0 + 1) as f64)
            })
            .into_iter()
            .collect())
    }
}

struct FailingLocator;

impl FaceLocator for FailingLocator {
    fn detect(&mut self, frame: &Frame) -> MediaResult<Vec<BoundingBox>> {
        Err(MediaError::detection_failed(frame.index, "model crashed"))
    }
}

/// Produces `count` copies of a template frame without holding them all.
struct RepeatSource {
    metadata: StreamMetadata,
    template: RgbImage,
    next: u64,
}

impl FrameSource for RepeatSource {
    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.next == self.metadata.frame_count {
            return Ok(None);
        }
        let frame = Frame::new(self.next, self.template.clone());
        self.next += 1;
        Ok(Some(frame))
    }
}

/// Keeps only frame indices and dimensions.
#[derive(Default)]
struct ShapeSink {
    frames: Vec<(u64, (u32, u32))>,
    closed: bool,
}

impl FrameSink for ShapeSink {
    fn write(&mut self, frame: Frame) -> MediaResult<()> {
        self.frames.push((frame.index, frame.pixels.dimensions()));
        Ok(())
    }

    fn close(&mut self) -> MediaResult<()> {
        self.closed = true;
        Ok(())
    }
}

fn face_centered_at(cx: f64) -> BoundingBox {
    BoundingBox::new(cx - 60.0, 400.0, 120.0, 120.0)
}

fn hd_metadata(frames: u64) -> StreamMetadata {
    StreamMetadata::new(1920, 1080, 30.0, frames).unwrap()
}

/// Plan every frame of a run and return `(window, state)` per frame.
fn plan_run<L: FaceLocator>(
    metadata: StreamMetadata,
    config: &ReframeConfig,
    locator: L,
) -> Vec<(CropWindow, TrackerState)> {
    let mut pipeline = FramePipeline::new(&metadata, config, locator);
    let mut frame = Frame::new(0, RgbImage::new(metadata.width, metadata.height));
    (0..metadata.frame_count)
        .map(|index| {
            frame.index = index;
            let window = pipeline.plan(&frame).unwrap();
            (window, pipeline.tracker_state())
        })
        .collect()
}

mod tracking_tests {
    use super::*;

    #[test]
    fn test_centered_face_keeps_window_fixed() {
        let runs = plan_run(
            hd_metadata(300),
            &ReframeConfig::default(),
            ScriptedLocator::new(|_| vec![face_centered_at(960.0)]),
        );

        assert_eq!(runs.len(), 300);
        for (window, _) in &runs {
            assert_eq!(*window, CropWindow { left: 657, right: 1264 });
            assert_eq!(window.width(), 607);
        }
    }

    #[test]
    fn test_converges_monotonically_without_overshoot() {
        let runs = plan_run(
            hd_metadata(300),
            &ReframeConfig::default(),
            ScriptedLocator::new(|_| vec![face_centered_at(1400.0)]),
        );

        let centers: Vec<f64> = runs.iter().map(|(_, s)| s.current_center).collect();
        for pair in centers.windows(2) {
            assert!(pair[1] >= pair[0], "center moved backwards: {:?}", pair);
            assert!(pair[1] <= 1400.0, "overshot target: {}", pair[1]);
        }
        assert!((centers[299] - 1400.0).abs() < 0.01);
    }

    #[test]
    fn test_no_face_stays_centered() {
        let runs = plan_run(hd_metadata(300), &ReframeConfig::default(), ScriptedLocator::new(|_| Vec::new()));

        for (window, state) in &runs {
            assert_eq!(state.current_center, 960.0);
            assert_eq!(state.target_center, 960.0);
            assert_eq!(*window, CropWindow { left: 657, right: 1264 });
        }
        assert_eq!(runs.last().unwrap().1.frames_since_face, 300);
    }

    #[test]
    fn test_face_loss_recenters_smoothly() {
        // Face at x=800 for 2s, then nothing for 4s, at 30 fps
        let runs = plan_run(
            hd_metadata(180),
            &ReframeConfig::default(),
            ScriptedLocator::new(|index| {
                if index < 60 {
                    vec![face_centered_at(800.0)]
                } else {
                    Vec::new()
                }
            }),
        );

        let before_gap = runs[59].1;
        assert_eq!(before_gap.target_center, 800.0);
        assert!((before_gap.current_center - 800.0).abs() < 1.0);

        let end = runs[179].1;
        assert_eq!(end.target_center, 960.0);
        assert!(end.current_center > 940.0 && end.current_center <= 960.0);

        // Target holds until more than 90 frames of loss have been counted
        let first_recentered = runs.iter().position(|(_, s)| s.target_center == 960.0 && s.frames_since_face > 0);
        assert_eq!(first_recentered, Some(154));

        for pair in runs[154..].windows(2) {
            assert!(pair[1].1.current_center >= pair[0].1.current_center);
        }
    }

    #[test]
    fn test_crop_invariant_for_moving_face() {
        let runs = plan_run(
            hd_metadata(600),
            &ReframeConfig::default(),
            ScriptedLocator::new(|index| {
                let cx = 960.0 + 1100.0 * ((index as f64) / 40.0).sin();
                vec![face_centered_at(cx.clamp(60.0, 1860.0))]
            }),
        );

        for (window, _) in &runs {
            assert!(window.left <= window.right);
            assert!(window.right <= 1920);
            assert_eq!(window.right - window.left, 607);
        }
        assert!(runs.iter().any(|(w, _)| w.left == 0));
        assert!(runs.iter().any(|(w, _)| w.right == 1920));
    }

    #[test]
    fn test_narrow_source_uses_full_width() {
        let metadata = StreamMetadata::new(480, 1080, 30.0, 50).unwrap();
        let runs = plan_run(
            metadata,
            &ReframeConfig::default(),
            ScriptedLocator::new(|_| vec![BoundingBox::new(0.0, 0.0, 100.0, 100.0)]),
        );
        for (window, _) in &runs {
            assert_eq!(*window, CropWindow { left: 0, right: 480 });
        }
    }

    #[test]
    fn test_identical_runs_produce_identical_windows() {
        let script = |index: u64| {
            if index % 50 < 30 {
                vec![face_centered_at(300.0 + (index as f64) * 3.0)]
            } else {
                Vec::new()
            }
        };
        let first = plan_run(hd_metadata(400), &ReframeConfig::default(), ScriptedLocator::new(script));
        let second = plan_run(hd_metadata(400), &ReframeConfig::default(), ScriptedLocator::new(script));

        let windows = |runs: &[(CropWindow, TrackerState)]| runs.iter().map(|(w, _)| *w).collect::<Vec<_>>();
        assert_eq!(windows(&first), windows(&second));
    }

    #[test]
    fn test_detector_runs_on_every_fifth_frame() {
        let locator = ScriptedLocator::new(|_| vec![face_centered_at(500.0)]);
        let calls = Arc::clone(&locator.calls);

        let metadata = hd_metadata(300);
        let mut pipeline = FramePipeline::new(&metadata, &ReframeConfig::default(), locator);
        let mut frame = Frame::new(0, RgbImage::new(1920, 1080));
        for index in 0..300 {
            frame.index = index;
            pipeline.plan(&frame).unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 60);
        assert_eq!(pipeline.detections_run(), 60);
        assert_eq!(pipeline.samples_with_face(), 60);
    }

    #[test]
    fn test_small_faces_are_ignored() {
        let runs = plan_run(
            hd_metadata(100),
            &ReframeConfig::default(),
            ScriptedLocator::new(|_| vec![BoundingBox::new(100.0, 100.0, 20.0, 20.0)]),
        );
        assert!(runs.iter().all(|(_, s)| s.target_center == 960.0));
    }

    #[test]
    fn test_largest_face_wins_on_each_sample() {
        let runs = plan_run(
            hd_metadata(10),
            &ReframeConfig::default(),
            ScriptedLocator::new(|_| {
                vec![
                    BoundingBox::new(100.0, 100.0, 60.0, 60.0),
                    BoundingBox::new(1400.0, 100.0, 200.0, 200.0),
                ]
            }),
        );
        assert_eq!(runs[4].1.target_center, 1500.0);
    }
}

mod frame_loop_tests {
    use super::*;

    fn small_metadata(frames: u64) -> StreamMetadata {
        StreamMetadata::new(192, 108, 30.0, frames).unwrap()
    }

    fn small_config() -> ReframeConfig {
        ReframeConfig {
            output_width: 54,
            output_height: 96,
            min_face_size: 4,
            ..Default::default()
        }
    }

    /// Black frame with a white 10x10 block whose left edge is at `x`.
    fn frame_with_block(x: u32) -> RgbImage {
        let mut img = RgbImage::new(192, 108);
        for dy in 0..10 {
            for dx in 0..10 {
                img.put_pixel(x + dx, 50 + dy, Rgb([255, 255, 255]));
            }
        }
        img
    }

    #[test]
    fn test_full_loop_writes_every_frame_in_order() {
        let frames: Vec<RgbImage> = (0..60).map(|i| frame_with_block(20 + i * 2)).collect();
        let mut source = VecFrameSource::new(small_metadata(60), frames);
        let mut pipeline = FramePipeline::new(&small_metadata(60), &small_config(), WhiteBlockLocator);
        let mut sink = RecordingSink::default();

        let stats = run_frame_loop(&mut source, &mut pipeline, &mut sink, None, None, 10).unwrap();

        assert_eq!(stats.frames_written, 60);
        assert_eq!(stats.detections_run, 12);
        assert_eq!(stats.samples_with_face, 12);
        assert!(!stats.truncated);
        assert!(sink.closed);
        assert_eq!(sink.frames.len(), 60);
        for (expected, frame) in sink.frames.iter().enumerate() {
            assert_eq!(frame.index, expected as u64);
            assert_eq!(frame.pixels.dimensions(), (54, 96));
        }
        // The block ends right of center and the tracker followed it
        assert!(pipeline.tracker_state().target_center > 140.0);
        assert!(pipeline.tracker_state().current_center > 96.0);
    }

    #[test]
    fn test_full_hd_output_resolution() {
        let metadata = hd_metadata(300);
        let mut source = RepeatSource {
            metadata,
            template: RgbImage::new(1920, 1080),
            next: 0,
        };
        let mut pipeline = FramePipeline::new(
            &metadata,
            &ReframeConfig::default(),
            ScriptedLocator::new(|_| vec![face_centered_at(960.0)]),
        );
        let mut sink = ShapeSink::default();

        let stats = run_frame_loop(&mut source, &mut pipeline, &mut sink, None, None, 100).unwrap();

        assert_eq!(stats.frames_written, 300);
        assert_eq!(sink.frames.len(), 300);
        assert!(sink.frames.iter().all(|(_, dims)| *dims == (1080, 1920)));
        assert!(sink.closed);
    }

    #[test]
    fn test_progress_reports_every_frame() {
        let reports = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink_reports = Arc::clone(&reports);
        let callback: ReframeProgressCallback = Box::new(move |p| sink_reports.lock().unwrap().push(p));

        let mut source = VecFrameSource::new(small_metadata(5), vec![RgbImage::new(192, 108); 5]);
        let mut pipeline = FramePipeline::new(&small_metadata(5), &small_config(), WhiteBlockLocator);
        let mut sink = RecordingSink::default();
        run_frame_loop(&mut source, &mut pipeline, &mut sink, None, Some(&callback), 0).unwrap();

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 5);
        assert_eq!(reports[4], ReframeProgress::new(5, 5));
    }

    #[test]
    fn test_cancel_before_start() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let mut source = VecFrameSource::new(small_metadata(5), vec![RgbImage::new(192, 108); 5]);
        let mut pipeline = FramePipeline::new(&small_metadata(5), &small_config(), WhiteBlockLocator);
        let mut sink = RecordingSink::default();

        let err = run_frame_loop(&mut source, &mut pipeline, &mut sink, Some(&rx), None, 0).unwrap_err();
        assert!(err.is_cancelled());
        assert!(sink.frames.is_empty());
        assert!(!sink.closed);
    }

    #[test]
    fn test_cancel_mid_run_stops_promptly() {
        let (tx, rx) = watch::channel(false);
        let callback: ReframeProgressCallback = Box::new(move |p| {
            if p.frames_processed == 10 {
                let _ = tx.send(true);
            }
        });

        let mut source = VecFrameSource::new(small_metadata(30), vec![RgbImage::new(192, 108); 30]);
        let mut pipeline = FramePipeline::new(&small_metadata(30), &small_config(), WhiteBlockLocator);
        let mut sink = RecordingSink::default();

        let err = run_frame_loop(&mut source, &mut pipeline, &mut sink, Some(&rx), Some(&callback), 0).unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));
        assert_eq!(sink.frames.len(), 10);
        assert!(!sink.closed);
    }

    #[test]
    fn test_decode_error_after_frames_truncates() {
        let mut source = VecFrameSource::with_results(
            small_metadata(4),
            vec![
                Ok(RgbImage::new(192, 108)),
                Ok(RgbImage::new(192, 108)),
                Err(MediaError::decode(2, "truncated frame")),
                Ok(RgbImage::new(192, 108)),
            ],
        );
        let mut pipeline = FramePipeline::new(&small_metadata(4), &small_config(), WhiteBlockLocator);
        let mut sink = RecordingSink::default();

        let stats = run_frame_loop(&mut source, &mut pipeline, &mut sink, None, None, 0).unwrap();
        assert_eq!(stats.frames_written, 2);
        assert!(stats.truncated);
        assert!(sink.closed);
    }

    #[test]
    fn test_decode_error_before_any_frame_fails() {
        let mut source = VecFrameSource::with_results(small_metadata(1), vec![Err(MediaError::decode(0, "bad header"))]);
        let mut pipeline = FramePipeline::new(&small_metadata(1), &small_config(), WhiteBlockLocator);
        let mut sink = RecordingSink::default();

        let err = run_frame_loop(&mut source, &mut pipeline, &mut sink, None, None, 0).unwrap_err();
        assert!(matches!(err, MediaError::DecodeError { frame: 0, .. }));
        assert!(!sink.closed);
    }

    #[test]
    fn test_empty_source_fails() {
        let mut source = VecFrameSource::new(small_metadata(0), Vec::new());
        let mut pipeline = FramePipeline::new(&small_metadata(0), &small_config(), WhiteBlockLocator);
        let mut sink = RecordingSink::default();

        let err = run_frame_loop(&mut source, &mut pipeline, &mut sink, None, None, 0).unwrap_err();
        assert_eq!(err.stage(), "decode");
    }

    #[test]
    fn test_detection_error_propagates_with_frame() {
        let mut source = VecFrameSource::new(small_metadata(10), vec![RgbImage::new(192, 108); 10]);
        let mut pipeline = FramePipeline::new(&small_metadata(10), &small_config(), FailingLocator);
        let mut sink = RecordingSink::default();

        let err = run_frame_loop(&mut source, &mut pipeline, &mut sink, None, None, 0).unwrap_err();
        assert!(matches!(err, MediaError::DetectionFailed { frame: 4, .. }));
        assert_eq!(sink.frames.len(), 4);
        assert!(!sink.closed);
    }
}

mod reframer_tests {
    use super::*;
    use std::path::Path;

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with('.'))
            .collect()
    }

    #[tokio::test]
    async fn test_missing_input_leaves_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("portrait.mp4");

        let reframer = Reframer::with_locator(ReframeConfig::default(), WhiteBlockLocator);
        let err = reframer.run(dir.path().join("missing.mp4"), &output).await.unwrap_err();

        assert!(matches!(err, MediaError::SourceUnreadable { .. }));
        assert!(!output.exists());
        assert!(leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_up_front() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ReframeConfig {
            detection_interval_frames: 0,
            ..Default::default()
        };
        let err = Reframer::with_locator(config, WhiteBlockLocator)
            .run(dir.path().join("in.mp4"), dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidConfig(_)));
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_default_detector_requires_opencv() {
        let err = Reframer::new(ReframeConfig::default()).err().unwrap();
        assert!(matches!(err, MediaError::DetectionUnavailable(_)));
    }

    #[ignore = "requires ffmpeg"]
    #[tokio::test]
    async fn test_end_to_end_with_audio() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("landscape.mp4");
        let status = tokio::process::Command::new("ffmpeg")
            .args(["-y", "-v", "error"])
            .args(["-f", "lavfi", "-i", "testsrc=duration=2:size=320x180:rate=15"])
            .args(["-f", "lavfi", "-i", "sine=frequency=440:duration=2"])
            .args(["-pix_fmt", "yuv420p", "-c:a", "aac", "-shortest"])
            .arg(&input)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let output = dir.path().join("out").join("portrait.mp4");
        let config = ReframeConfig {
            output_width: 108,
            output_height: 192,
            ..Default::default()
        };
        let progress_seen = Arc::new(AtomicU64::new(0));
        let progress_counter = Arc::clone(&progress_seen);

        let outcome = Reframer::with_locator(config, ScriptedLocator::new(|_| vec![BoundingBox::new(130.0, 40.0, 60.0, 60.0)]))
            .with_progress(move |p| progress_counter.store(p.frames_processed, Ordering::SeqCst))
            .run(&input, &output)
            .await
            .unwrap();

        assert_eq!(outcome.frames_written, 30);
        assert_eq!(outcome.detections_run, 6);
        assert!(outcome.has_audio);
        assert!(!outcome.truncated);
        assert_eq!(progress_seen.load(Ordering::SeqCst), 30);

        let info = probe_video(&output).await.unwrap();
        assert_eq!((info.width, info.height), (108, 192));
        assert!(info.has_audio);
        assert!((info.duration - 2.0).abs() < 0.3, "duration was {}", info.duration);
        assert!(leftovers(output.parent().unwrap()).is_empty());
    }

    #[ignore = "requires ffmpeg"]
    #[tokio::test]
    async fn test_cancelled_run_leaves_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("landscape.mp4");
        let status = tokio::process::Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-f", "lavfi", "-i", "testsrc=duration=2:size=320x180:rate=15"])
            .args(["-pix_fmt", "yuv420p"])
            .arg(&input)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let output = dir.path().join("portrait.mp4");
        let (tx, rx) = watch::channel(false);
        let config = ReframeConfig {
            output_width: 108,
            output_height: 192,
            ..Default::default()
        };

        let err = Reframer::with_locator(config, WhiteBlockLocator)
            .with_cancel(rx)
            .with_progress(move |p| {
                if p.frames_processed == 3 {
                    let _ = tx.send(true);
                }
            })
            .run(&input, &output)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!output.exists());
        assert!(leftovers(dir.path()).is_empty());
    }
}
