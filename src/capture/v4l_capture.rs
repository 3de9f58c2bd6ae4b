use super::CaptureSource;
use crate::frame::{FrameBuffer, Rotation, VideoFrame};
use anyhow::{Context, Result};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use std::time::Instant;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
    rotation: Rotation,
    started: Instant,
    last_timestamp_ns: i64,
}

impl WebcamCapture {
    /// Open a webcam; `rotation` is the sensor orientation stamped on every frame
    pub fn new(device_index: u32, width: u32, height: u32, rotation: Rotation) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {}x{}",
            device_index,
            width,
            height
        );

        let index = CameraIndex::Index(device_index);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::HighestResolution(
            Resolution::new(width, height),
        ));

        let mut camera = Camera::new(index, requested)
            .context("Failed to open camera")?;

        camera.open_stream()
            .context("Failed to open camera stream")?;

        let negotiated = camera.resolution();
        if (negotiated.width(), negotiated.height()) != (width, height) {
            tracing::warn!(
                "Camera negotiated {}x{} instead of {}x{}",
                negotiated.width(),
                negotiated.height(),
                width,
                height
            );
        }

        tracing::info!("Webcam initialized successfully");

        Ok(Self {
            camera,
            width: negotiated.width(),
            height: negotiated.height(),
            rotation,
            started: Instant::now(),
            last_timestamp_ns: -1,
        })
    }

    /// Monotonic, strictly increasing capture time
    fn next_timestamp(&mut self) -> i64 {
        let elapsed = self.started.elapsed().as_nanos() as i64;
        self.last_timestamp_ns = elapsed.max(self.last_timestamp_ns + 1);
        self.last_timestamp_ns
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<VideoFrame> {
        let frame = self
            .camera
            .frame()
            .context("Failed to capture frame")?;
        let timestamp_ns = self.next_timestamp();

        let decoded = frame.decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        Ok(VideoFrame::new(FrameBuffer::Rgb(decoded), self.rotation, timestamp_ns))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
