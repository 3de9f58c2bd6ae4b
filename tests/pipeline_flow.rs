use camola_vbg::error::UploadError;
use camola_vbg::frame::{FrameBuffer, I420Buffer, PixelImage, Rotation, VideoFrame};
use camola_vbg::output::FrameSink;
use camola_vbg::pipeline::{
    FrameUploader, I420Uploader, PipelineSettings, PipelineState, VideoProcessor, VirtualBackground,
};
use camola_vbg::segmentation::{
    RequestId, SegmentationListener, SegmentationMask, Segmenter, ERROR_INFERENCE,
};
use camola_vbg::PipelineError;
use crossbeam::channel::{self, Receiver, Sender};
use image::{Rgb, RgbImage, Rgba};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MS: i64 = 1_000_000;

/// Records submissions so a test decides when and how each one completes
#[derive(Default)]
struct ManualSegmenter {
    pending: Mutex<Vec<(RequestId, PixelImage, Arc<dyn SegmentationListener>)>>,
    resets: AtomicUsize,
}

impl ManualSegmenter {
    fn submitted(&self) -> usize {
        self.pending.lock().len()
    }

    fn input_size(&self, index: usize) -> (u32, u32) {
        self.pending.lock()[index].1.dimensions()
    }

    fn complete(&self, index: usize, confidence: f32) {
        let (key, image, listener) = self.take(index);
        let (width, height) = image.dimensions();
        listener.on_result(key, SegmentationMask::filled(width, height, confidence));
    }

    fn fail(&self, index: usize) {
        let (key, _, listener) = self.take(index);
        listener.on_error(key, "model exploded", ERROR_INFERENCE);
    }

    fn take(&self, index: usize) -> (RequestId, PixelImage, Arc<dyn SegmentationListener>) {
        let pending = self.pending.lock();
        let (key, image, listener) = &pending[index];
        (*key, image.clone(), listener.clone())
    }
}

impl Segmenter for ManualSegmenter {
    fn submit(&self, key: RequestId, image: PixelImage, listener: Arc<dyn SegmentationListener>) {
        self.pending.lock().push((key, image, listener));
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

struct ChannelSink(Sender<VideoFrame>);

impl FrameSink for ChannelSink {
    fn on_frame(&self, frame: VideoFrame) {
        let _ = self.0.send(frame);
    }
}

struct FailingUploader;

impl FrameUploader for FailingUploader {
    fn upload(&mut self, _image: &PixelImage) -> Result<FrameBuffer, UploadError> {
        Err(UploadError::Backend("surface lost".to_string()))
    }
}

struct Harness {
    pipeline: VirtualBackground,
    segmenter: Arc<ManualSegmenter>,
    frames: Receiver<VideoFrame>,
}

impl Harness {
    fn new(settings: PipelineSettings) -> Self {
        Self::with_uploader(settings, Box::new(I420Uploader))
    }

    fn with_uploader(settings: PipelineSettings, uploader: Box<dyn FrameUploader>) -> Self {
        let segmenter = Arc::new(ManualSegmenter::default());
        let pipeline = VirtualBackground::new(settings, segmenter.clone(), uploader).unwrap();
        let (tx, frames) = channel::unbounded();
        pipeline.set_sink(Some(Arc::new(ChannelSink(tx))));
        Self {
            pipeline,
            segmenter,
            frames,
        }
    }

    /// Configured with a background and ready for frames
    fn ready(settings: PipelineSettings) -> Self {
        let harness = Self::new(settings);
        harness.pipeline.configure(background(), 0.7).unwrap();
        harness.pipeline.initialize().unwrap();
        harness
    }

    fn next_frame(&self) -> VideoFrame {
        self.frames
            .recv_timeout(Duration::from_secs(5))
            .expect("expected a frame at the sink")
    }

    fn assert_silent(&self) {
        assert!(self.frames.recv_timeout(Duration::from_millis(200)).is_err());
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        target_fps: 10.0,
        max_dimension: 50,
        ..PipelineSettings::default()
    }
}

fn background() -> PixelImage {
    PixelImage::from_pixel(10, 10, Rgba([0, 0, 255, 255]))
}

const PERSON: [u8; 3] = [200, 40, 40];
const BLUE: [u8; 3] = [0, 0, 255];
const GREEN: [u8; 3] = [0, 255, 0];

/// Decoded color at the center of an emitted frame
fn center_color(frame: &VideoFrame) -> [u8; 3] {
    let image = frame.buffer.to_rgba().unwrap();
    let (width, height) = image.dimensions();
    let pixel = image.get_pixel(width / 2, height / 2);
    [pixel[0], pixel[1], pixel[2]]
}

fn assert_color_near(actual: [u8; 3], expected: [u8; 3]) {
    let close = actual
        .iter()
        .zip(expected.iter())
        .all(|(a, e)| (*a as i32 - *e as i32).abs() <= 6);
    assert!(close, "expected about {:?}, got {:?}", expected, actual);
}

fn camera_frame(timestamp_ns: i64, rotation: Rotation) -> VideoFrame {
    VideoFrame::new(
        FrameBuffer::Rgb(RgbImage::from_pixel(200, 100, Rgb(PERSON))),
        rotation,
        timestamp_ns,
    )
}

#[test]
fn frames_pass_through_without_background() {
    let harness = Harness::new(settings());
    harness.pipeline.initialize().unwrap();

    let frame = camera_frame(0, Rotation::Deg0);
    harness.pipeline.on_frame_captured(frame.clone());

    assert_eq!(harness.next_frame(), frame);
    assert_eq!(harness.segmenter.submitted(), 0);
}

#[test]
fn frames_pass_through_before_initialize() {
    let harness = Harness::new(settings());
    harness.pipeline.configure(background(), 0.5).unwrap();

    let frame = camera_frame(0, Rotation::Deg0);
    harness.pipeline.on_frame_captured(frame.clone());

    assert_eq!(harness.next_frame(), frame);
    assert_eq!(harness.segmenter.submitted(), 0);
}

#[test]
fn segmented_frame_keeps_capture_metadata() {
    let harness = Harness::ready(settings());

    harness.pipeline.on_frame_captured(camera_frame(5 * MS, Rotation::Deg90));
    assert_eq!(harness.segmenter.submitted(), 1);
    assert_eq!(harness.segmenter.input_size(0), (50, 25));
    assert_eq!(harness.pipeline.in_flight(), 1);

    harness.segmenter.complete(0, 1.0);

    let emitted = harness.next_frame();
    assert_eq!(emitted.timestamp_ns, 5 * MS);
    assert_eq!(emitted.rotation, Rotation::Deg90);
    assert_eq!(emitted.dimensions(), (50, 25));
    assert!(matches!(emitted.buffer, FrameBuffer::I420(_)));
    assert_eq!(harness.pipeline.in_flight(), 0);
}

#[test]
fn confident_pixels_keep_the_camera_image() {
    let harness = Harness::ready(settings());

    harness.pipeline.on_frame_captured(camera_frame(0, Rotation::Deg0));
    harness.segmenter.complete(0, 0.9);

    assert_color_near(center_color(&harness.next_frame()), PERSON);
}

#[test]
fn low_confidence_pixels_show_the_background() {
    let harness = Harness::ready(settings());

    harness.pipeline.on_frame_captured(camera_frame(0, Rotation::Deg0));
    harness.segmenter.complete(0, 0.5);

    assert_color_near(center_color(&harness.next_frame()), BLUE);
}

#[test]
fn threshold_change_applies_to_pending_results() {
    let harness = Harness::ready(settings());

    harness.pipeline.on_frame_captured(camera_frame(0, Rotation::Deg0));
    harness.pipeline.on_frame_captured(camera_frame(100 * MS, Rotation::Deg0));
    assert_eq!(harness.segmenter.submitted(), 2);

    harness.segmenter.complete(0, 0.5);
    assert_color_near(center_color(&harness.next_frame()), BLUE);

    harness.pipeline.set_confidence_threshold(0.4).unwrap();
    harness.segmenter.complete(1, 0.5);
    assert_color_near(center_color(&harness.next_frame()), PERSON);
}

#[test]
fn replaced_background_is_used_for_later_results() {
    let harness = Harness::ready(settings());

    harness.pipeline.on_frame_captured(camera_frame(0, Rotation::Deg0));
    harness.pipeline.on_frame_captured(camera_frame(100 * MS, Rotation::Deg90));

    harness.segmenter.complete(0, 0.0);
    assert_color_near(center_color(&harness.next_frame()), BLUE);

    let green = PixelImage::from_pixel(30, 10, Rgba([GREEN[0], GREEN[1], GREEN[2], 255]));
    harness.pipeline.set_background(green).unwrap();
    harness.segmenter.complete(1, 0.0);

    let emitted = harness.next_frame();
    assert_eq!(emitted.rotation, Rotation::Deg90);
    assert_eq!(emitted.dimensions(), (50, 25));
    assert_color_near(center_color(&emitted), GREEN);
}

#[test]
fn throttled_frames_are_forwarded_untouched() {
    let harness = Harness::ready(settings());

    harness.pipeline.on_frame_captured(camera_frame(0, Rotation::Deg0));
    let skipped = camera_frame(50 * MS, Rotation::Deg0);
    harness.pipeline.on_frame_captured(skipped.clone());

    assert_eq!(harness.next_frame(), skipped);
    assert_eq!(harness.segmenter.submitted(), 1);

    harness.pipeline.on_frame_captured(camera_frame(100 * MS, Rotation::Deg0));
    assert_eq!(harness.segmenter.submitted(), 2);
}

#[test]
fn results_after_clear_background_are_dropped() {
    let harness = Harness::ready(settings());

    harness.pipeline.on_frame_captured(camera_frame(0, Rotation::Deg0));
    harness.pipeline.clear_background();
    harness.segmenter.complete(0, 1.0);

    harness.assert_silent();
    assert_eq!(harness.pipeline.in_flight(), 0);
}

#[test]
fn dispose_abandons_in_flight_frames() {
    let harness = Harness::ready(settings());

    harness.pipeline.on_frame_captured(camera_frame(0, Rotation::Deg0));
    assert_eq!(harness.pipeline.in_flight(), 1);

    harness.pipeline.dispose();
    assert_eq!(harness.pipeline.state(), PipelineState::Disposed);
    assert_eq!(harness.pipeline.in_flight(), 0);
    assert!(!harness.pipeline.has_background());

    harness.segmenter.complete(0, 1.0);
    harness.pipeline.on_frame_captured(camera_frame(200 * MS, Rotation::Deg0));
    harness.assert_silent();

    // Second dispose is a no-op
    harness.pipeline.dispose();
}

#[test]
fn segmentation_errors_emit_nothing() {
    let harness = Harness::ready(settings());

    harness.pipeline.on_frame_captured(camera_frame(0, Rotation::Deg0));
    harness.segmenter.fail(0);

    harness.assert_silent();
    assert_eq!(harness.pipeline.in_flight(), 0);
}

#[test]
fn undecodable_frames_pass_through() {
    let harness = Harness::ready(settings());

    let broken = VideoFrame::new(
        FrameBuffer::I420(I420Buffer {
            width: 4,
            height: 4,
            y: vec![0; 3],
            u: Vec::new(),
            v: Vec::new(),
            stride_y: 4,
            stride_u: 2,
            stride_v: 2,
        }),
        Rotation::Deg0,
        0,
    );
    harness.pipeline.on_frame_captured(broken.clone());

    assert_eq!(harness.next_frame(), broken);
    assert_eq!(harness.segmenter.submitted(), 0);
}

#[test]
fn upload_failure_emits_captured_frame() {
    let harness = Harness::with_uploader(settings(), Box::new(FailingUploader));
    harness.pipeline.configure(background(), 0.7).unwrap();
    harness.pipeline.initialize().unwrap();

    let frame = camera_frame(0, Rotation::Deg180);
    harness.pipeline.on_frame_captured(frame.clone());
    harness.segmenter.complete(0, 1.0);

    assert_eq!(harness.next_frame(), frame);
}

#[test]
fn stale_requests_are_evicted_on_submit() {
    let harness = Harness::ready(PipelineSettings {
        stale_after: Duration::from_millis(100),
        ..settings()
    });

    harness.pipeline.on_frame_captured(camera_frame(0, Rotation::Deg0));
    harness.pipeline.on_frame_captured(camera_frame(500 * MS, Rotation::Deg0));
    assert_eq!(harness.segmenter.submitted(), 2);
    assert_eq!(harness.pipeline.in_flight(), 1);

    harness.segmenter.complete(0, 1.0);
    harness.assert_silent();

    harness.segmenter.complete(1, 1.0);
    assert_eq!(harness.next_frame().timestamp_ns, 500 * MS);
}

#[test]
fn frames_without_sink_are_dropped() {
    let harness = Harness::ready(settings());
    harness.pipeline.set_sink(None);

    harness.pipeline.on_frame_captured(camera_frame(0, Rotation::Deg0));

    harness.assert_silent();
    assert_eq!(harness.segmenter.submitted(), 0);
}

#[test]
fn lifecycle_misuse_is_rejected() {
    let harness = Harness::new(settings());
    harness.pipeline.initialize().unwrap();
    assert_eq!(harness.segmenter.resets.load(Ordering::SeqCst), 1);

    assert!(matches!(
        harness.pipeline.initialize(),
        Err(PipelineError::InvalidState { .. })
    ));
    assert!(matches!(
        harness.pipeline.set_confidence_threshold(1.5),
        Err(PipelineError::InvalidThreshold(_))
    ));
    assert!(matches!(
        harness.pipeline.set_background(PixelImage::new(0, 0)),
        Err(PipelineError::EmptyBackground)
    ));

    harness.pipeline.dispose();
    assert!(matches!(
        harness.pipeline.configure(background(), 0.5),
        Err(PipelineError::InvalidState { .. })
    ));
}
