use crate::compose::AlphaMode;
use std::time::Duration;

/// Confidence threshold used until the caller configures one
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Static tuning of the background pipeline, fixed at construction
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Segmentation submissions per second
    pub target_fps: f32,
    /// Longer side of the image handed to the segmenter, in pixels
    pub max_dimension: u32,
    pub alpha_mode: AlphaMode,
    /// In-flight requests older than this are abandoned
    pub stale_after: Duration,
    /// Box-mean kernel applied to the composited frame, if any
    pub smoothing_kernel: Option<u32>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            target_fps: 24.0,
            max_dimension: 225,
            alpha_mode: AlphaMode::Hard,
            stale_after: Duration::from_secs(2),
            smoothing_kernel: None,
        }
    }
}
