mod preprocess;
mod rvm;
pub mod types;
mod worker;

pub use preprocess::Preprocessor;
pub use rvm::RobustVideoMatting;
pub use types::{
    RequestId, RequestIdGenerator, SegmentationListener, SegmentationMask, SegmentationModel,
    Segmenter, ERROR_INFERENCE, ERROR_SHUTDOWN,
};
pub use worker::ThreadedSegmenter;

use anyhow::Result;
use std::path::Path;

/// Create a default segmentation model (RVM)
pub fn create_default_model(
    model_path: &Path,
    input_size: u32,
) -> Result<Box<dyn SegmentationModel + Send>> {
    let model = RobustVideoMatting::new(model_path, input_size)?;
    Ok(Box::new(model))
}
