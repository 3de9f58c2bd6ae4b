mod cache;
mod render;
mod resize;
mod settings;
mod throttle;
mod virtual_background;

pub use cache::{CacheEntry, InFlightCache};
pub use render::{FrameUploader, I420Uploader, RenderJob, RenderThread};
pub use resize::resize_to_fit;
pub use settings::{PipelineSettings, DEFAULT_CONFIDENCE_THRESHOLD};
pub use throttle::FrameThrottle;
pub use virtual_background::{PipelineState, VirtualBackground};

use crate::frame::VideoFrame;
use crate::output::FrameSink;
use std::sync::Arc;

/// Hook installed between a capture source and its output stream
pub trait VideoProcessor: Send + Sync {
    /// Handle one captured frame; must not block on downstream work
    fn on_frame_captured(&self, frame: VideoFrame);

    /// Bind or unbind the stream that receives processed frames
    fn set_sink(&self, sink: Option<Arc<dyn FrameSink>>);
}
