//! Real-time virtual background for live camera streams.
//!
//! Captured frames are segmented by an asynchronous model, the foreground is
//! cut out with a confidence mask and composited over a still background,
//! and the result is reinjected into the stream with the captured frame's
//! timing metadata.

pub mod capture;
pub mod compose;
pub mod error;
pub mod frame;
pub mod output;
pub mod pipeline;
pub mod segmentation;

pub use error::{FrameError, MaskError, PipelineError, UploadError};
pub use frame::{FrameBuffer, I420Buffer, PixelImage, Rotation, VideoFrame};
pub use pipeline::{PipelineSettings, VideoProcessor, VirtualBackground};
