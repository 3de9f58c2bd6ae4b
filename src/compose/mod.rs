//! GPU-free compositing math: mask cut-out, background layer, smoothing.

mod background;
mod filter;
mod mask;

pub use background::{composite, overlay_foreground, prepare_background, CoverFit};
pub use filter::mean_filter;
pub use mask::{apply_mask, AlphaMode};
