use crate::error::MaskError;
use crate::frame::PixelImage;
use anyhow::Result;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-pixel foreground confidence: 0.0 = background, 1.0 = foreground
///
/// Dimensions are those of the model output and may differ from the
/// image that was segmented.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    confidences: Vec<f32>,
}

impl SegmentationMask {
    /// Wrap a row-major confidence buffer, checking it matches `width * height`
    pub fn new(width: u32, height: u32, confidences: Vec<f32>) -> Result<Self, MaskError> {
        if confidences.len() != width as usize * height as usize {
            return Err(MaskError::SizeMismatch {
                width,
                height,
                actual: confidences.len(),
            });
        }

        Ok(Self {
            width,
            height,
            confidences,
        })
    }

    /// Mask of the given size filled with one confidence value
    pub fn filled(width: u32, height: u32, confidence: f32) -> Self {
        Self {
            width,
            height,
            confidences: vec![confidence; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn confidences(&self) -> &[f32] {
        &self.confidences
    }

    /// Confidence at a mask cell; caller guarantees the coordinate is in bounds
    pub fn at(&self, x: u32, y: u32) -> f32 {
        self.confidences[y as usize * self.width as usize + x as usize]
    }
}

/// Correlation key tying an asynchronous segmentation result to its request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// Hands out strictly increasing request ids
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    next: AtomicU64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> RequestId {
        RequestId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Trait for segmentation models
/// Allows swapping between different backends (RVM, MODNet, MediaPipe, etc.)
pub trait SegmentationModel {
    /// Process a frame and return a foreground confidence mask
    ///
    /// The mask is returned at the model's output resolution; callers
    /// resample it onto the frame.
    fn segment(&mut self, frame: &PixelImage) -> Result<SegmentationMask>;

    /// Reset internal state (for models with temporal/recurrent components)
    ///
    /// Call this when:
    /// - Switching cameras
    /// - Scene cuts detected
    /// - Starting a new video session
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless models
    }

    /// Get the model's preferred input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}

/// Error code reported when a request cannot be queued
pub const ERROR_SHUTDOWN: i32 = 1;
/// Error code reported when the model fails on a frame
pub const ERROR_INFERENCE: i32 = 2;

/// Receives the outcome of asynchronous segmentation requests
///
/// Called from arbitrary worker threads, at most once per request id and in
/// no particular order.
pub trait SegmentationListener: Send + Sync {
    fn on_result(&self, key: RequestId, mask: SegmentationMask);

    fn on_error(&self, key: RequestId, message: &str, code: i32);
}

/// Asynchronous, fire-and-forget segmentation service
pub trait Segmenter: Send + Sync {
    /// Queue `image` for segmentation; must not block the caller
    fn submit(&self, key: RequestId, image: PixelImage, listener: Arc<dyn SegmentationListener>);

    /// Forget temporal state before the next request, e.g. for a new session
    fn reset(&self) {}
}
