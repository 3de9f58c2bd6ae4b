mod loopback;

pub use loopback::V4L2Output;

use crate::frame::VideoFrame;
use anyhow::Result;
use parking_lot::Mutex;

/// Trait for output destinations
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);
}

/// Downstream consumer of pipeline frames
///
/// Called from the capture thread for pass-through frames and from the
/// render thread for composited ones.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: VideoFrame);
}

/// Shares a single-writer `OutputSink` between the pipeline's threads
pub struct SharedOutput<O> {
    inner: Mutex<O>,
}

impl<O: OutputSink> SharedOutput<O> {
    pub fn new(output: O) -> Self {
        Self {
            inner: Mutex::new(output),
        }
    }
}

impl<O: OutputSink + Send> FrameSink for SharedOutput<O> {
    fn on_frame(&self, frame: VideoFrame) {
        if let Err(e) = self.inner.lock().write_frame(&frame) {
            tracing::warn!("Failed to write frame {}: {:#}", frame.timestamp_ns, e);
        }
    }
}
