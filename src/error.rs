use thiserror::Error;

/// Problems with a captured buffer or a color-space conversion.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame has zero area ({width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("{plane} plane too small: need {needed} bytes, got {actual}")]
    PlaneTooSmall {
        plane: &'static str,
        needed: usize,
        actual: usize,
    },

    #[error("{plane} stride {stride} is narrower than row width {width}")]
    StrideTooSmall {
        plane: &'static str,
        stride: usize,
        width: usize,
    },

    #[error("{plane} plane size overflows with stride {stride} over {rows} rows")]
    PlaneOverflow {
        plane: &'static str,
        stride: usize,
        rows: usize,
    },

    #[error("unsupported rotation {0} degrees (expected 0, 90, 180 or 270)")]
    InvalidRotation(i32),
}

/// A segmentation mask whose buffer does not match its declared geometry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MaskError {
    #[error("mask is {width}x{height} but holds {actual} values")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual: usize,
    },
}

/// Misuse of the pipeline's lifecycle or configuration surface.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("pipeline is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("confidence threshold {0} is outside [0, 1]")]
    InvalidThreshold(f32),

    #[error("background image has zero area")]
    EmptyBackground,
}

/// Failure to turn a composited image into an output frame buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("cannot upload an empty image")]
    EmptyImage,

    #[error("upload failed: {0}")]
    Backend(String),
}
